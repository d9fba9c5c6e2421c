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
use flotilla_common::model::{Player, PlayerId, PlayerToken};
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PlayerRecord {
    pub id: String,
    pub agent_symbol: String,
    pub token: String,
    pub credits: i64,
    pub metadata: String,
    pub last_active: DateTime<Utc>,
}

impl TryFrom<PlayerRecord> for Player {
    type Error = String;

    fn try_from(value: PlayerRecord) -> Result<Self, Self::Error> {
        let id = PlayerId::from_str(&value.id).map_err(|err| err.to_string())?;
        let metadata =
            serde_json::from_str(&value.metadata).map_err(|err| err.to_string())?;
        Ok(Player {
            id,
            agent_symbol: value.agent_symbol,
            token: PlayerToken(value.token),
            credits: value.credits,
            metadata,
            last_active: value.last_active,
        })
    }
}

impl From<&Player> for PlayerRecord {
    fn from(value: &Player) -> Self {
        Self {
            id: value.id.to_string(),
            agent_symbol: value.agent_symbol.clone(),
            token: value.token.secret().to_string(),
            credits: value.credits,
            metadata: value.metadata.to_string(),
            last_active: value.last_active,
        }
    }
}

#[async_trait]
pub trait PlayerRepo: Send + Sync {
    async fn upsert(&self, player: &PlayerRecord) -> Result<(), RepoError>;

    async fn get(&self, id: &str) -> Result<Option<PlayerRecord>, RepoError>;

    async fn get_by_agent_symbol(
        &self,
        agent_symbol: &str,
    ) -> Result<Option<PlayerRecord>, RepoError>;

    async fn list(&self) -> Result<Vec<PlayerRecord>, RepoError>;

    async fn update_credits(&self, id: &str, credits: i64) -> Result<(), RepoError>;

    async fn touch_last_active(&self, id: &str, at: &DateTime<Utc>) -> Result<(), RepoError>;
}

pub struct DbPlayerRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbPlayerRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl PlayerRepo for DbPlayerRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, player: &PlayerRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("players", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO players
                        (id, agent_symbol, token, credits, metadata, last_active)
                      VALUES
                        ($1, $2, $3, $4, $5, $6)
                      ON CONFLICT (id) DO UPDATE
                      SET credits = $4,
                          metadata = $5,
                          last_active = $6
                    "#,
                )
                .bind(&player.id)
                .bind(&player.agent_symbol)
                .bind(&player.token)
                .bind(player.credits)
                .bind(&player.metadata)
                .bind(player.last_active)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PlayerRecord>, RepoError> {
        self.db_pool
            .with_ro("players", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, PlayerRecord>("SELECT * FROM players WHERE id = $1").bind(id)
            })
            .await
    }

    async fn get_by_agent_symbol(
        &self,
        agent_symbol: &str,
    ) -> Result<Option<PlayerRecord>, RepoError> {
        self.db_pool
            .with_ro("players", "get_by_agent_symbol")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, PlayerRecord>(
                    "SELECT * FROM players WHERE agent_symbol = $1",
                )
                .bind(agent_symbol)
            })
            .await
    }

    async fn list(&self) -> Result<Vec<PlayerRecord>, RepoError> {
        self.db_pool
            .with_ro("players", "list")
            .fetch_all_as(|| {
                sqlx::query_as::<_, PlayerRecord>("SELECT * FROM players ORDER BY agent_symbol")
            })
            .await
    }

    async fn update_credits(&self, id: &str, credits: i64) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("players", "update_credits")
            .execute(|| {
                sqlx::query("UPDATE players SET credits = $2 WHERE id = $1")
                    .bind(id)
                    .bind(credits)
            })
            .await?;
        Ok(())
    }

    async fn touch_last_active(&self, id: &str, at: &DateTime<Utc>) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("players", "touch_last_active")
            .execute(|| {
                sqlx::query("UPDATE players SET last_active = $2 WHERE id = $1")
                    .bind(id)
                    .bind(at)
            })
            .await?;
        Ok(())
    }
}
