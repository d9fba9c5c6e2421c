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
pub struct GoodsFactoryRecord {
    pub id: String,
    pub player_id: String,
    pub data: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait GoodsFactoryRepo: Send + Sync {
    async fn upsert(&self, factory: &GoodsFactoryRecord) -> Result<(), RepoError>;

    async fn get(&self, player_id: &str, id: &str)
        -> Result<Option<GoodsFactoryRecord>, RepoError>;

    async fn list(&self, player_id: &str) -> Result<Vec<GoodsFactoryRecord>, RepoError>;
}

pub struct DbGoodsFactoryRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbGoodsFactoryRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl GoodsFactoryRepo for DbGoodsFactoryRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, factory: &GoodsFactoryRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("goods_factories", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO goods_factories
                        (id, player_id, data, updated_at)
                      VALUES
                        ($1, $2, $3, $4)
                      ON CONFLICT (id) DO UPDATE
                      SET data = $3,
                          updated_at = $4
                    "#,
                )
                .bind(&factory.id)
                .bind(&factory.player_id)
                .bind(&factory.data)
                .bind(factory.updated_at)
            })
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        player_id: &str,
        id: &str,
    ) -> Result<Option<GoodsFactoryRecord>, RepoError> {
        self.db_pool
            .with_ro("goods_factories", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, GoodsFactoryRecord>(
                    "SELECT * FROM goods_factories WHERE player_id = $1 AND id = $2",
                )
                .bind(player_id)
                .bind(id)
            })
            .await
    }

    async fn list(&self, player_id: &str) -> Result<Vec<GoodsFactoryRecord>, RepoError> {
        self.db_pool
            .with_ro("goods_factories", "list")
            .fetch_all_as(|| {
                sqlx::query_as::<_, GoodsFactoryRecord>(
                    "SELECT * FROM goods_factories WHERE player_id = $1 ORDER BY id",
                )
                .bind(player_id)
            })
            .await
    }
}
