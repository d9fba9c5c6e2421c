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
pub struct ContractRecord {
    pub player_id: String,
    pub id: String,
    pub data: String,
    pub accepted: bool,
    pub fulfilled: bool,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContractRepo: Send + Sync {
    async fn upsert(&self, contract: &ContractRecord) -> Result<(), RepoError>;

    async fn get(&self, player_id: &str, id: &str) -> Result<Option<ContractRecord>, RepoError>;

    async fn list(&self, player_id: &str) -> Result<Vec<ContractRecord>, RepoError>;

    async fn list_unfulfilled(&self, player_id: &str) -> Result<Vec<ContractRecord>, RepoError>;
}

pub struct DbContractRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbContractRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl ContractRepo for DbContractRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, contract: &ContractRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("contracts", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO contracts
                        (player_id, id, data, accepted, fulfilled, updated_at)
                      VALUES
                        ($1, $2, $3, $4, $5, $6)
                      ON CONFLICT (player_id, id) DO UPDATE
                      SET data = $3,
                          accepted = $4,
                          fulfilled = $5,
                          updated_at = $6
                    "#,
                )
                .bind(&contract.player_id)
                .bind(&contract.id)
                .bind(&contract.data)
                .bind(contract.accepted)
                .bind(contract.fulfilled)
                .bind(contract.updated_at)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, player_id: &str, id: &str) -> Result<Option<ContractRecord>, RepoError> {
        self.db_pool
            .with_ro("contracts", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, ContractRecord>(
                    "SELECT * FROM contracts WHERE player_id = $1 AND id = $2",
                )
                .bind(player_id)
                .bind(id)
            })
            .await
    }

    async fn list(&self, player_id: &str) -> Result<Vec<ContractRecord>, RepoError> {
        self.db_pool
            .with_ro("contracts", "list")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContractRecord>(
                    "SELECT * FROM contracts WHERE player_id = $1 ORDER BY updated_at DESC",
                )
                .bind(player_id)
            })
            .await
    }

    async fn list_unfulfilled(&self, player_id: &str) -> Result<Vec<ContractRecord>, RepoError> {
        self.db_pool
            .with_ro("contracts", "list_unfulfilled")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContractRecord>(
                    r#"
                      SELECT * FROM contracts
                      WHERE player_id = $1 AND fulfilled = FALSE
                      ORDER BY updated_at DESC
                    "#,
                )
                .bind(player_id)
            })
            .await
    }
}
