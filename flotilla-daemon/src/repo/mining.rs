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

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MiningOperationRecord {
    pub id: String,
    pub player_id: String,
    pub system: String,
    pub data: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait MiningRepo: Send + Sync {
    async fn upsert(&self, operation: &MiningOperationRecord) -> Result<(), RepoError>;

    async fn get(&self, player_id: &str, id: &str)
        -> Result<Option<MiningOperationRecord>, RepoError>;

    async fn list(&self, player_id: &str) -> Result<Vec<MiningOperationRecord>, RepoError>;
}

pub struct DbMiningRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbMiningRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl MiningRepo for DbMiningRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, operation: &MiningOperationRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("mining_operations", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO mining_operations
                        (id, player_id, system, data, updated_at)
                      VALUES
                        ($1, $2, $3, $4, $5)
                      ON CONFLICT (id) DO UPDATE
                      SET data = $4,
                          updated_at = $5
                    "#,
                )
                .bind(&operation.id)
                .bind(&operation.player_id)
                .bind(&operation.system)
                .bind(&operation.data)
                .bind(operation.updated_at)
            })
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        player_id: &str,
        id: &str,
    ) -> Result<Option<MiningOperationRecord>, RepoError> {
        self.db_pool
            .with_ro("mining_operations", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, MiningOperationRecord>(
                    "SELECT * FROM mining_operations WHERE player_id = $1 AND id = $2",
                )
                .bind(player_id)
                .bind(id)
            })
            .await
    }

    async fn list(&self, player_id: &str) -> Result<Vec<MiningOperationRecord>, RepoError> {
        self.db_pool
            .with_ro("mining_operations", "list")
            .fetch_all_as(|| {
                sqlx::query_as::<_, MiningOperationRecord>(
                    "SELECT * FROM mining_operations WHERE player_id = $1 ORDER BY updated_at DESC",
                )
                .bind(player_id)
            })
            .await
    }
}
