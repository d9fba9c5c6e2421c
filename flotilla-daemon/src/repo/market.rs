// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::db::{Pool, RepoError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;

/// Market payloads are opaque to the daemon; per-player isolation is the
/// only semantics imposed here.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MarketRecord {
    pub player_id: String,
    pub waypoint_symbol: String,
    pub system: String,
    pub data: String,
    pub observed_at: DateTime<Utc>,
}

#[async_trait]
pub trait MarketRepo: Send + Sync {
    async fn upsert(&self, market: &MarketRecord) -> Result<(), RepoError>;

    async fn get(
        &self,
        player_id: &str,
        waypoint_symbol: &str,
    ) -> Result<Option<MarketRecord>, RepoError>;

    async fn list_by_system(
        &self,
        player_id: &str,
        system: &str,
    ) -> Result<Vec<MarketRecord>, RepoError>;
}

pub struct DbMarketRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbMarketRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl MarketRepo for DbMarketRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, market: &MarketRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("market_data", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO market_data
                        (player_id, waypoint_symbol, system, data, observed_at)
                      VALUES
                        ($1, $2, $3, $4, $5)
                      ON CONFLICT (player_id, waypoint_symbol) DO UPDATE
                      SET data = $4,
                          observed_at = $5
                    "#,
                )
                .bind(&market.player_id)
                .bind(&market.waypoint_symbol)
                .bind(&market.system)
                .bind(&market.data)
                .bind(market.observed_at)
            })
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        player_id: &str,
        waypoint_symbol: &str,
    ) -> Result<Option<MarketRecord>, RepoError> {
        self.db_pool
            .with_ro("market_data", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, MarketRecord>(
                    "SELECT * FROM market_data WHERE player_id = $1 AND waypoint_symbol = $2",
                )
                .bind(player_id)
                .bind(waypoint_symbol)
            })
            .await
    }

    async fn list_by_system(
        &self,
        player_id: &str,
        system: &str,
    ) -> Result<Vec<MarketRecord>, RepoError> {
        self.db_pool
            .with_ro("market_data", "list_by_system")
            .fetch_all_as(|| {
                sqlx::query_as::<_, MarketRecord>(
                    r#"
                      SELECT * FROM market_data
                      WHERE player_id = $1 AND system = $2
                      ORDER BY waypoint_symbol
                    "#,
                )
                .bind(player_id)
                .bind(system)
            })
            .await
    }
}
