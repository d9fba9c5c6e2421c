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
use flotilla_common::model::assignment::ShipAssignment;
use flotilla_common::model::{ContainerId, PlayerId, ShipSymbol};
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ShipAssignmentRecord {
    pub ship_symbol: String,
    pub player_id: String,
    pub container_id: String,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub release_reason: Option<String>,
}

impl TryFrom<ShipAssignmentRecord> for ShipAssignment {
    type Error = String;

    fn try_from(value: ShipAssignmentRecord) -> Result<Self, Self::Error> {
        Ok(ShipAssignment {
            ship_symbol: ShipSymbol(value.ship_symbol),
            player_id: PlayerId::from_str(&value.player_id).map_err(|err| err.to_string())?,
            container_id: ContainerId(value.container_id),
            assigned_at: value.assigned_at,
            released_at: value.released_at,
            release_reason: value.release_reason,
        })
    }
}

#[async_trait]
pub trait ShipAssignmentRepo: Send + Sync {
    /// Inserts a new active assignment. The partial unique index on
    /// `(ship_symbol) WHERE released_at IS NULL` resolves concurrent
    /// attempts; a conflict surfaces as `RepoError::UniqueViolation`.
    async fn insert_active(
        &self,
        ship_symbol: &str,
        player_id: &str,
        container_id: &str,
        assigned_at: &DateTime<Utc>,
    ) -> Result<(), RepoError>;

    async fn find_active_by_ship(
        &self,
        ship_symbol: &str,
    ) -> Result<Option<ShipAssignmentRecord>, RepoError>;

    /// Assignment history for a ship, newest first.
    async fn find_by_ship(
        &self,
        ship_symbol: &str,
    ) -> Result<Vec<ShipAssignmentRecord>, RepoError>;

    async fn list_active(&self) -> Result<Vec<ShipAssignmentRecord>, RepoError>;

    /// Releases the active assignment of a ship; returns the number of rows
    /// released (0 or 1).
    async fn release(
        &self,
        ship_symbol: &str,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError>;

    async fn release_by_container(
        &self,
        container_id: &str,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError>;

    async fn release_all_active(
        &self,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError>;

    /// Releases active assignments whose `assigned_at` is at or before the
    /// cutoff.
    async fn release_assigned_before(
        &self,
        cutoff: &DateTime<Utc>,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError>;
}

pub struct DbShipAssignmentRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbShipAssignmentRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(crate::db::postgres::PostgresPool -> crate::db::postgres::PostgresPool, crate::db::sqlite::SqlitePool)]
#[async_trait]
impl ShipAssignmentRepo for DbShipAssignmentRepo<crate::db::postgres::PostgresPool> {
    async fn insert_active(
        &self,
        ship_symbol: &str,
        player_id: &str,
        container_id: &str,
        assigned_at: &DateTime<Utc>,
    ) -> Result<(), RepoError> {
        self.db_pool
            .with_rw("ship_assignments", "insert_active")
            .execute(|| {
                sqlx::query(
                    r#"
                      INSERT INTO ship_assignments
                        (ship_symbol, player_id, container_id, assigned_at)
                      VALUES
                        ($1, $2, $3, $4)
                    "#,
                )
                .bind(ship_symbol)
                .bind(player_id)
                .bind(container_id)
                .bind(assigned_at)
            })
            .await?;
        Ok(())
    }

    async fn find_active_by_ship(
        &self,
        ship_symbol: &str,
    ) -> Result<Option<ShipAssignmentRecord>, RepoError> {
        self.db_pool
            .with_ro("ship_assignments", "find_active_by_ship")
            .fetch_optional_as(|| {
                sqlx::query_as::<_, ShipAssignmentRecord>(
                    r#"
                      SELECT ship_symbol, player_id, container_id, assigned_at,
                             released_at, release_reason
                      FROM ship_assignments
                      WHERE ship_symbol = $1 AND released_at IS NULL
                    "#,
                )
                .bind(ship_symbol)
            })
            .await
    }

    async fn find_by_ship(
        &self,
        ship_symbol: &str,
    ) -> Result<Vec<ShipAssignmentRecord>, RepoError> {
        self.db_pool
            .with_ro("ship_assignments", "find_by_ship")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ShipAssignmentRecord>(
                    r#"
                      SELECT ship_symbol, player_id, container_id, assigned_at,
                             released_at, release_reason
                      FROM ship_assignments
                      WHERE ship_symbol = $1
                      ORDER BY assigned_at DESC, id DESC
                    "#,
                )
                .bind(ship_symbol)
            })
            .await
    }

    async fn list_active(&self) -> Result<Vec<ShipAssignmentRecord>, RepoError> {
        self.db_pool
            .with_ro("ship_assignments", "list_active")
            .fetch_all_as(|| {
                sqlx::query_as::<_, ShipAssignmentRecord>(
                    r#"
                      SELECT ship_symbol, player_id, container_id, assigned_at,
                             released_at, release_reason
                      FROM ship_assignments
                      WHERE released_at IS NULL
                      ORDER BY assigned_at, id
                    "#,
                )
            })
            .await
    }

    async fn release(
        &self,
        ship_symbol: &str,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        self.db_pool
            .with_rw("ship_assignments", "release")
            .execute(|| {
                sqlx::query(
                    r#"
                      UPDATE ship_assignments
                      SET released_at = $3, release_reason = $2
                      WHERE ship_symbol = $1 AND released_at IS NULL
                    "#,
                )
                .bind(ship_symbol)
                .bind(reason)
                .bind(released_at)
            })
            .await
    }

    async fn release_by_container(
        &self,
        container_id: &str,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        self.db_pool
            .with_rw("ship_assignments", "release_by_container")
            .execute(|| {
                sqlx::query(
                    r#"
                      UPDATE ship_assignments
                      SET released_at = $3, release_reason = $2
                      WHERE container_id = $1 AND released_at IS NULL
                    "#,
                )
                .bind(container_id)
                .bind(reason)
                .bind(released_at)
            })
            .await
    }

    async fn release_all_active(
        &self,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        self.db_pool
            .with_rw("ship_assignments", "release_all_active")
            .execute(|| {
                sqlx::query(
                    r#"
                      UPDATE ship_assignments
                      SET released_at = $2, release_reason = $1
                      WHERE released_at IS NULL
                    "#,
                )
                .bind(reason)
                .bind(released_at)
            })
            .await
    }

    async fn release_assigned_before(
        &self,
        cutoff: &DateTime<Utc>,
        reason: &str,
        released_at: &DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        self.db_pool
            .with_rw("ship_assignments", "release_assigned_before")
            .execute(|| {
                sqlx::query(
                    r#"
                      UPDATE ship_assignments
                      SET released_at = $3, release_reason = $2
                      WHERE released_at IS NULL AND assigned_at <= $1
                    "#,
                )
                .bind(cutoff)
                .bind(reason)
                .bind(released_at)
            })
            .await
    }
}
