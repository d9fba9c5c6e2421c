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
use flotilla_common::model::waypoint::Waypoint;
use flotilla_common::model::{SystemSymbol, WaypointSymbol};
use std::collections::BTreeSet;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct WaypointRecord {
    pub symbol: String,
    pub system: String,
    pub x: f64,
    pub y: f64,
    pub waypoint_type: String,
    /// JSON array of trait symbols.
    pub traits: String,
    pub has_fuel: bool,
    pub synced_at: DateTime<Utc>,
}

impl TryFrom<WaypointRecord> for Waypoint {
    type Error = String;

    fn try_from(value: WaypointRecord) -> Result<Self, Self::Error> {
        let traits: BTreeSet<String> =
            serde_json::from_str(&value.traits).map_err(|err| err.to_string())?;
        Ok(Waypoint {
            symbol: WaypointSymbol(value.symbol),
            system: SystemSymbol(value.system),
            x: value.x,
            y: value.y,
            waypoint_type: value.waypoint_type,
            traits,
            has_fuel: value.has_fuel,
            synced_at: value.synced_at,
        })
    }
}

impl From<&Waypoint> for WaypointRecord {
    fn from(value: &Waypoint) -> Self {
        Self {
            symbol: value.symbol.0.clone(),
            system: value.system.0.clone(),
            x: value.x,
            y: value.y,
            waypoint_type: value.waypoint_type.clone(),
            traits: serde_json::to_string(&value.traits).expect("traits serialize"),
            has_fuel: value.has_fuel,
            synced_at: value.synced_at,
        }
    }
}

#[async_trait]
pub trait WaypointRepo: Send + Sync {
    /// Authoritative upsert keyed by symbol; traits and coordinates are
    /// overwritten, never merged.
    async fn upsert(&self, waypoint: &WaypointRecord) -> Result<(), RepoError>;

    async fn upsert_all(&self, waypoints: &[WaypointRecord]) -> Result<(), RepoError>;

    async fn get(&self, symbol: &str) -> Result<Option<WaypointRecord>, RepoError>;

    async fn list_by_system(&self, system: &str) -> Result<Vec<WaypointRecord>, RepoError>;

    async fn list_by_system_with_trait(
        &self,
        system: &str,
        trait_symbol: &str,
    ) -> Result<Vec<WaypointRecord>, RepoError>;
}

pub struct DbWaypointRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbWaypointRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl WaypointRepo for DbWaypointRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, waypoint: &WaypointRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("waypoints", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO waypoints
                        (symbol, system, x, y, waypoint_type, traits, has_fuel, synced_at)
                      VALUES
                        ($1, $2, $3, $4, $5, $6, $7, $8)
                      ON CONFLICT (symbol) DO UPDATE
                      SET system = $2,
                          x = $3,
                          y = $4,
                          waypoint_type = $5,
                          traits = $6,
                          has_fuel = $7,
                          synced_at = $8
                    "#,
                )
                .bind(&waypoint.symbol)
                .bind(&waypoint.system)
                .bind(waypoint.x)
                .bind(waypoint.y)
                .bind(&waypoint.waypoint_type)
                .bind(&waypoint.traits)
                .bind(waypoint.has_fuel)
                .bind(waypoint.synced_at)
            })
            .await?;
        Ok(())
    }

    async fn upsert_all(&self, waypoints: &[WaypointRecord]) -> Result<(), RepoError> {
        for waypoint in waypoints {
            self.upsert(waypoint).await?;
        }
        Ok(())
    }

    async fn get(&self, symbol: &str) -> Result<Option<WaypointRecord>, RepoError> {
        self.db_pool
            .with_ro("waypoints", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, WaypointRecord>("SELECT * FROM waypoints WHERE symbol = $1")
                    .bind(symbol)
            })
            .await
    }

    async fn list_by_system(&self, system: &str) -> Result<Vec<WaypointRecord>, RepoError> {
        self.db_pool
            .with_ro("waypoints", "list_by_system")
            .fetch_all_as(|| {
                sqlx::query_as::<_, WaypointRecord>(
                    "SELECT * FROM waypoints WHERE system = $1 ORDER BY symbol",
                )
                .bind(system)
            })
            .await
    }

    async fn list_by_system_with_trait(
        &self,
        system: &str,
        trait_symbol: &str,
    ) -> Result<Vec<WaypointRecord>, RepoError> {
        let pattern = format!("%\"{trait_symbol}\"%");
        self.db_pool
            .with_ro("waypoints", "list_by_system_with_trait")
            .fetch_all_as(|| {
                sqlx::query_as::<_, WaypointRecord>(
                    "SELECT * FROM waypoints WHERE system = $1 AND traits LIKE $2 ORDER BY symbol",
                )
                .bind(system)
                .bind(&pattern)
            })
            .await
    }
}
