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
use flotilla_common::model::log::{ContainerLogEntry, LogLevel};
use flotilla_common::model::{ContainerId, PlayerId};
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ContainerLogRecord {
    pub container_id: String,
    pub player_id: String,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<ContainerLogRecord> for ContainerLogEntry {
    type Error = String;

    fn try_from(value: ContainerLogRecord) -> Result<Self, Self::Error> {
        Ok(ContainerLogEntry {
            container_id: ContainerId(value.container_id),
            player_id: PlayerId::from_str(&value.player_id).map_err(|err| err.to_string())?,
            level: LogLevel::from_str(&value.level)?,
            message: value.message,
            timestamp: value.timestamp,
        })
    }
}

impl From<&ContainerLogEntry> for ContainerLogRecord {
    fn from(value: &ContainerLogEntry) -> Self {
        Self {
            container_id: value.container_id.0.clone(),
            player_id: value.player_id.to_string(),
            level: value.level.as_str().to_string(),
            message: value.message.clone(),
            timestamp: value.timestamp,
        }
    }
}

#[async_trait]
pub trait ContainerLogRepo: Send + Sync {
    async fn append(&self, entry: &ContainerLogRecord) -> Result<(), RepoError>;

    async fn last_for_container(
        &self,
        container_id: &str,
    ) -> Result<Option<ContainerLogRecord>, RepoError>;

    async fn query(
        &self,
        container_id: &str,
        level: Option<&str>,
        since: Option<&DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContainerLogRecord>, RepoError>;
}

pub struct DbContainerLogRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbContainerLogRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl ContainerLogRepo for DbContainerLogRepo<crate::db::postgres::PostgresPool> {
    async fn append(&self, entry: &ContainerLogRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("container_logs", "append")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO container_logs
                        (container_id, player_id, level, message, timestamp)
                      VALUES
                        ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(&entry.container_id)
                .bind(&entry.player_id)
                .bind(&entry.level)
                .bind(&entry.message)
                .bind(entry.timestamp)
            })
            .await?;
        Ok(())
    }

    async fn last_for_container(
        &self,
        container_id: &str,
    ) -> Result<Option<ContainerLogRecord>, RepoError> {
        self.db_pool
            .with_ro("container_logs", "last_for_container")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, ContainerLogRecord>(
                    r#"
                      SELECT container_id, player_id, level, message, timestamp
                      FROM container_logs
                      WHERE container_id = $1
                      ORDER BY id DESC
                      LIMIT 1
                    "#,
                )
                .bind(container_id)
            })
            .await
    }

    async fn query(
        &self,
        container_id: &str,
        level: Option<&str>,
        since: Option<&DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContainerLogRecord>, RepoError> {
        self.db_pool
            .with_ro("container_logs", "query")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContainerLogRecord>(
                    r#"
                      SELECT container_id, player_id, level, message, timestamp
                      FROM container_logs
                      WHERE container_id = $1
                        AND level = coalesce($2, level)
                        AND timestamp >= coalesce($3, timestamp)
                      ORDER BY id
                      LIMIT $4 OFFSET $5
                    "#,
                )
                .bind(container_id)
                .bind(level)
                .bind(since)
                .bind(limit)
                .bind(offset)
            })
            .await
    }
}
