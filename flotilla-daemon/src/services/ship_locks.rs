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

use crate::db::RepoError;
use crate::repo::ship_assignment::ShipAssignmentRepo;
use async_trait::async_trait;
use chrono::TimeDelta;
use flotilla_common::clock::Clock;
use flotilla_common::model::assignment::ShipAssignment;
use flotilla_common::model::{ContainerId, PlayerId, ShipSymbol};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("ship {0} is already assigned to a container")]
    AlreadyAssigned(ShipSymbol),
    #[error("ship {0} has no active assignment")]
    NotAssigned(ShipSymbol),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("corrupt assignment row: {0}")]
    Corrupt(String),
}

/// Mutual exclusion of ships across containers. The active-assignment
/// uniqueness is enforced by the database's partial unique index, so
/// concurrent acquires are resolved there.
#[async_trait]
pub trait ShipLockService: Send + Sync {
    async fn acquire(
        &self,
        ship_symbol: &ShipSymbol,
        player_id: PlayerId,
        container_id: &ContainerId,
    ) -> Result<ShipAssignment, LockError>;

    /// Fails with `NotAssigned` when the ship holds no active assignment.
    async fn release(&self, ship_symbol: &ShipSymbol, reason: &str) -> Result<(), LockError>;

    /// Like `release` but a no-op when nothing is assigned.
    async fn force_release(&self, ship_symbol: &ShipSymbol, reason: &str)
        -> Result<(), LockError>;

    /// Releases every active assignment held by the container; returns how
    /// many were released.
    async fn release_by_container(
        &self,
        container_id: &ContainerId,
        reason: &str,
    ) -> Result<u64, LockError>;

    /// Startup sweep dropping anything left over from a previous run.
    async fn release_all_active(&self, reason: &str) -> Result<u64, LockError>;

    /// Releases active assignments whose container is not in `existing`.
    async fn clean_orphans(
        &self,
        existing: &HashSet<ContainerId>,
        reason: &str,
    ) -> Result<u64, LockError>;

    /// Releases active assignments older than `timeout`.
    async fn clean_stale(&self, timeout: Duration, reason: &str) -> Result<u64, LockError>;

    async fn find_active(
        &self,
        ship_symbol: &ShipSymbol,
    ) -> Result<Option<ShipAssignment>, LockError>;

    async fn list_active(&self) -> Result<Vec<ShipAssignment>, LockError>;
}

pub struct ShipLockServiceDefault {
    repo: Arc<dyn ShipAssignmentRepo>,
    clock: Arc<dyn Clock>,
}

impl ShipLockServiceDefault {
    pub fn new(repo: Arc<dyn ShipAssignmentRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }
}

#[async_trait]
impl ShipLockService for ShipLockServiceDefault {
    async fn acquire(
        &self,
        ship_symbol: &ShipSymbol,
        player_id: PlayerId,
        container_id: &ContainerId,
    ) -> Result<ShipAssignment, LockError> {
        let assigned_at = self.clock.now();
        let result = self
            .repo
            .insert_active(
                &ship_symbol.0,
                &player_id.to_string(),
                &container_id.0,
                &assigned_at,
            )
            .await;
        match result {
            Ok(()) => {
                debug!(ship = %ship_symbol, container = %container_id, "ship assigned");
                Ok(ShipAssignment {
                    ship_symbol: ship_symbol.clone(),
                    player_id,
                    container_id: container_id.clone(),
                    assigned_at,
                    released_at: None,
                    release_reason: None,
                })
            }
            Err(RepoError::UniqueViolation(_)) => {
                Err(LockError::AlreadyAssigned(ship_symbol.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn release(&self, ship_symbol: &ShipSymbol, reason: &str) -> Result<(), LockError> {
        let released = self
            .repo
            .release(&ship_symbol.0, reason, &self.clock.now())
            .await?;
        if released == 0 {
            Err(LockError::NotAssigned(ship_symbol.clone()))
        } else {
            debug!(ship = %ship_symbol, reason, "ship released");
            Ok(())
        }
    }

    async fn force_release(
        &self,
        ship_symbol: &ShipSymbol,
        reason: &str,
    ) -> Result<(), LockError> {
        self.repo
            .release(&ship_symbol.0, reason, &self.clock.now())
            .await?;
        Ok(())
    }

    async fn release_by_container(
        &self,
        container_id: &ContainerId,
        reason: &str,
    ) -> Result<u64, LockError> {
        let released = self
            .repo
            .release_by_container(&container_id.0, reason, &self.clock.now())
            .await?;
        if released > 0 {
            debug!(container = %container_id, released, reason, "container assignments released");
        }
        Ok(released)
    }

    async fn release_all_active(&self, reason: &str) -> Result<u64, LockError> {
        let released = self.repo.release_all_active(reason, &self.clock.now()).await?;
        if released > 0 {
            info!(released, reason, "released all active ship assignments");
        }
        Ok(released)
    }

    async fn clean_orphans(
        &self,
        existing: &HashSet<ContainerId>,
        reason: &str,
    ) -> Result<u64, LockError> {
        let active = self.list_active().await?;
        let mut released = 0;
        for assignment in active {
            if !existing.contains(&assignment.container_id) {
                warn!(
                    ship = %assignment.ship_symbol,
                    container = %assignment.container_id,
                    "releasing orphaned assignment"
                );
                self.repo
                    .release(&assignment.ship_symbol.0, reason, &self.clock.now())
                    .await?;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn clean_stale(&self, timeout: Duration, reason: &str) -> Result<u64, LockError> {
        let cutoff =
            self.clock.now() - TimeDelta::from_std(timeout).expect("timeout out of range");
        let released = self
            .repo
            .release_assigned_before(&cutoff, reason, &self.clock.now())
            .await?;
        if released > 0 {
            warn!(released, ?timeout, "released stale ship assignments");
        }
        Ok(released)
    }

    async fn find_active(
        &self,
        ship_symbol: &ShipSymbol,
    ) -> Result<Option<ShipAssignment>, LockError> {
        let record = self.repo.find_active_by_ship(&ship_symbol.0).await?;
        record
            .map(|r| ShipAssignment::try_from(r).map_err(LockError::Corrupt))
            .transpose()
    }

    async fn list_active(&self) -> Result<Vec<ShipAssignment>, LockError> {
        let records = self.repo.list_active().await?;
        records
            .into_iter()
            .map(|r| ShipAssignment::try_from(r).map_err(LockError::Corrupt))
            .collect()
    }
}
