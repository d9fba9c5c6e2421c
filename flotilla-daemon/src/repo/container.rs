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
use flotilla_common::model::container::{Container, ContainerStatus, ContainerType};
use flotilla_common::model::{ContainerId, PlayerId};
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub container_type: String,
    pub player_id: String,
    pub status: String,
    pub current_iteration: i64,
    pub max_iterations: i64,
    pub restart_count: i64,
    pub max_restarts: i64,
    pub last_error: Option<String>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TryFrom<ContainerRecord> for Container {
    type Error = String;

    fn try_from(value: ContainerRecord) -> Result<Self, Self::Error> {
        Ok(Container {
            id: ContainerId(value.id),
            container_type: ContainerType::from_str(&value.container_type)?,
            player_id: PlayerId::from_str(&value.player_id).map_err(|err| err.to_string())?,
            status: ContainerStatus::from_str(&value.status)?,
            current_iteration: value.current_iteration,
            max_iterations: value.max_iterations,
            restart_count: value.restart_count as u32,
            max_restarts: value.max_restarts as u32,
            last_error: value.last_error,
            metadata: serde_json::from_str(&value.metadata).map_err(|err| err.to_string())?,
            created_at: value.created_at,
            started_at: value.started_at,
            stopped_at: value.stopped_at,
        })
    }
}

impl From<&Container> for ContainerRecord {
    fn from(value: &Container) -> Self {
        Self {
            id: value.id.0.clone(),
            container_type: value.container_type.as_str().to_string(),
            player_id: value.player_id.to_string(),
            status: value.status.as_str().to_string(),
            current_iteration: value.current_iteration,
            max_iterations: value.max_iterations,
            restart_count: value.restart_count as i64,
            max_restarts: value.max_restarts as i64,
            last_error: value.last_error.clone(),
            metadata: value.metadata.to_string(),
            created_at: value.created_at,
            started_at: value.started_at,
            stopped_at: value.stopped_at,
        }
    }
}

#[async_trait]
pub trait ContainerRepo: Send + Sync {
    async fn insert(&self, container: &ContainerRecord) -> Result<(), RepoError>;

    /// Write-through of the full row; every status change goes through here.
    async fn update(&self, container: &ContainerRecord) -> Result<(), RepoError>;

    async fn get(&self, id: &str) -> Result<Option<ContainerRecord>, RepoError>;

    async fn list(
        &self,
        player_id: Option<&str>,
        container_type: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<ContainerRecord>, RepoError>;

    async fn find_running_by_type(
        &self,
        player_id: &str,
        container_type: &str,
    ) -> Result<Vec<ContainerRecord>, RepoError>;

    async fn find_non_terminal(&self) -> Result<Vec<ContainerRecord>, RepoError>;
}

pub struct DbContainerRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbContainerRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl ContainerRepo for DbContainerRepo<crate::db::postgres::PostgresPool> {
    async fn insert(&self, container: &ContainerRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("containers", "insert")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO containers
                        (id, container_type, player_id, status, current_iteration,
                         max_iterations, restart_count, max_restarts, last_error,
                         metadata, created_at, started_at, stopped_at)
                      VALUES
                        ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    "#,
                )
                .bind(&container.id)
                .bind(&container.container_type)
                .bind(&container.player_id)
                .bind(&container.status)
                .bind(container.current_iteration)
                .bind(container.max_iterations)
                .bind(container.restart_count)
                .bind(container.max_restarts)
                .bind(&container.last_error)
                .bind(&container.metadata)
                .bind(container.created_at)
                .bind(container.started_at)
                .bind(container.stopped_at)
            })
            .await?;
        Ok(())
    }

    async fn update(&self, container: &ContainerRecord) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("containers", "update")
            .execute(|| {
                sqlx::query(
                    r#"
                      UPDATE containers
                      SET status = $2,
                          current_iteration = $3,
                          restart_count = $4,
                          last_error = $5,
                          metadata = $6,
                          started_at = $7,
                          stopped_at = $8
                      WHERE id = $1
                    "#,
                )
                .bind(&container.id)
                .bind(&container.status)
                .bind(container.current_iteration)
                .bind(container.restart_count)
                .bind(&container.last_error)
                .bind(&container.metadata)
                .bind(container.started_at)
                .bind(container.stopped_at)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ContainerRecord>, RepoError> {
        self.db_pool
            .with_ro("containers", "get")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, ContainerRecord>("SELECT * FROM containers WHERE id = $1")
                    .bind(id)
            })
            .await
    }

    async fn list(
        &self,
        player_id: Option<&str>,
        container_type: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<ContainerRecord>, RepoError> {
        self.db_pool
            .with_ro("containers", "list")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContainerRecord>(
                    r#"
                      SELECT * FROM containers
                      WHERE player_id = coalesce($1, player_id)
                        AND container_type = coalesce($2, container_type)
                        AND status = coalesce($3, status)
                      ORDER BY created_at, id
                    "#,
                )
                .bind(player_id)
                .bind(container_type)
                .bind(status)
            })
            .await
    }

    async fn find_running_by_type(
        &self,
        player_id: &str,
        container_type: &str,
    ) -> Result<Vec<ContainerRecord>, RepoError> {
        self.db_pool
            .with_ro("containers", "find_running_by_type")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContainerRecord>(
                    r#"
                      SELECT * FROM containers
                      WHERE player_id = $1 AND container_type = $2 AND status = 'RUNNING'
                      ORDER BY created_at, id
                    "#,
                )
                .bind(player_id)
                .bind(container_type)
            })
            .await
    }

    async fn find_non_terminal(&self) -> Result<Vec<ContainerRecord>, RepoError> {
        self.db_pool
            .with_ro("containers", "find_non_terminal")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ContainerRecord>(
                    r#"
                      SELECT * FROM containers
                      WHERE status NOT IN ('STOPPED', 'COMPLETED', 'FAILED')
                      ORDER BY created_at, id
                    "#,
                )
            })
            .await
    }
}
