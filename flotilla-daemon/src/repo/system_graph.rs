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
use flotilla_common::model::graph::SystemGraph;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SystemGraphRecord {
    pub system: String,
    /// Serialized `SystemGraph`.
    pub graph: String,
    pub built_at: DateTime<Utc>,
}

impl TryFrom<SystemGraphRecord> for SystemGraph {
    type Error = String;

    fn try_from(value: SystemGraphRecord) -> Result<Self, Self::Error> {
        serde_json::from_str(&value.graph).map_err(|err| err.to_string())
    }
}

impl From<&SystemGraph> for SystemGraphRecord {
    fn from(value: &SystemGraph) -> Self {
        Self {
            system: value.system.0.clone(),
            graph: serde_json::to_string(value).expect("graph serialize"),
            built_at: value.built_at,
        }
    }
}

#[async_trait]
pub trait SystemGraphRepo: Send + Sync {
    /// Exactly one row per system.
    async fn upsert(&self, graph: &SystemGraphRecord) -> Result<(), RepoError>;

    async fn get(&self, system: &str) -> Result<Option<SystemGraphRecord>, RepoError>;
}

pub struct DbSystemGraphRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbSystemGraphRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl SystemGraphRepo for DbSystemGraphRepo<crate::db::postgres::PostgresPool> {
    async fn upsert(&self, graph: &SystemGraphRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("system_graphs", "upsert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO system_graphs (system, graph, built_at)
                      VALUES ($1, $2, $3)
                      ON CONFLICT (system) DO UPDATE
                      SET graph = $2,
                          built_at = $3
                    "#,
                )
                .bind(&graph.system)
                .bind(&graph.graph)
                .bind(graph.built_at)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, system: &str) -> Result<Option<SystemGraphRecord>, RepoError> {
        self.db_pool
            .with_ro("system_graphs", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, SystemGraphRecord>(
                    "SELECT * FROM system_graphs WHERE system = $1",
                )
                .bind(system)
            })
            .await
    }
}
