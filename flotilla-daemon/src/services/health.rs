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

use crate::config::HealthConfig;
use crate::db::RepoError;
use crate::repo::player::PlayerRepo;
use crate::services::container_log::ContainerLogService;
use crate::services::ship_locks::{LockError, ShipLockService};
use crate::supervisor::{ContainerSupervisor, SupervisorError};
use chrono::{DateTime, TimeDelta, Utc};
use flotilla_client::{ApiClient, ApiError};
use flotilla_common::clock::Clock;
use flotilla_common::eventual::{await_condition, AwaitError, PollSchedule};
use flotilla_common::model::assignment::ShipAssignment;
use flotilla_common::model::container::ContainerStatus;
use flotilla_common::model::log::LogLevel;
use flotilla_common::model::ship::{NavStatus, ShipSnapshot};
use flotilla_common::model::{Player, ShipSymbol, WaypointSymbol};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RECOVERY_AWAIT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("recovery timed out: {0}")]
    Timeout(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<AwaitError<ApiError>> for HealthError {
    fn from(err: AwaitError<ApiError>) -> Self {
        match err {
            AwaitError::Timeout { what, .. } => HealthError::Timeout(what.to_string()),
            AwaitError::Fetch { source, .. } => HealthError::Api(source),
        }
    }
}

struct ShipObservation {
    location: WaypointSymbol,
    nav_status: NavStatus,
    since: DateTime<Utc>,
    recovery_attempts: u32,
    last_recovery: Option<DateTime<Utc>>,
}

/// Periodic recovery loop: finds ships that should have moved but have not,
/// nudges them back to a safe state, and abandons their container when
/// nudging stops helping. Also sweeps orphaned and stale assignments on
/// every pass.
pub struct HealthMonitor {
    config: HealthConfig,
    lock_stale_timeout: Duration,
    clock: Arc<dyn Clock>,
    api: Arc<ApiClient>,
    players: Arc<dyn PlayerRepo>,
    locks: Arc<dyn ShipLockService>,
    supervisor: Arc<ContainerSupervisor>,
    logs: Arc<ContainerLogService>,
    observations: tokio::sync::Mutex<HashMap<ShipSymbol, ShipObservation>>,
}

impl HealthMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: HealthConfig,
        lock_stale_timeout: Duration,
        clock: Arc<dyn Clock>,
        api: Arc<ApiClient>,
        players: Arc<dyn PlayerRepo>,
        locks: Arc<dyn ShipLockService>,
        supervisor: Arc<ContainerSupervisor>,
        logs: Arc<ContainerLogService>,
    ) -> Self {
        Self {
            config,
            lock_stale_timeout,
            clock,
            api,
            players,
            locks,
            supervisor,
            logs,
            observations: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.config.interval, "health monitor running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(self.config.interval) => {}
            }
            if let Err(err) = self.pass().await {
                warn!(error = %err, "health pass failed");
            }
        }
        info!("health monitor stopped");
    }

    /// One scan over all active assignments.
    pub async fn pass(&self) -> Result<(), HealthError> {
        let existing = self.supervisor.known_ids();
        self.locks
            .clean_orphans(&existing, "orphaned-assignment")
            .await?;
        self.locks
            .clean_stale(self.lock_stale_timeout, "stale-assignment")
            .await?;

        for assignment in self.locks.list_active().await? {
            if let Err(err) = self.check_ship(&assignment).await {
                warn!(ship = %assignment.ship_symbol, error = %err, "ship health check failed");
            }
        }
        Ok(())
    }

    async fn player_for(&self, assignment: &ShipAssignment) -> Result<Player, HealthError> {
        let record = self
            .players
            .get(&assignment.player_id.to_string())
            .await?
            .ok_or_else(|| {
                HealthError::Corrupt(format!("player {} missing", assignment.player_id))
            })?;
        Player::try_from(record).map_err(HealthError::Corrupt)
    }

    async fn check_ship(&self, assignment: &ShipAssignment) -> Result<(), HealthError> {
        let player = self.player_for(assignment).await?;
        let ship = self
            .api
            .get_ship(player.id, &player.token, &assignment.ship_symbol)
            .await?
            .to_snapshot();
        let now = self.clock.now();

        let mut observations = self.observations.lock().await;
        let observation = observations
            .entry(ship.symbol.clone())
            .or_insert_with(|| ShipObservation {
                location: ship.location.clone(),
                nav_status: ship.nav_status,
                since: now,
                recovery_attempts: 0,
                last_recovery: None,
            });

        if observation.location != ship.location || observation.nav_status != ship.nav_status {
            if observation.recovery_attempts > 0 {
                debug!(ship = %ship.symbol, "ship healthy again, clearing recovery counter");
            }
            *observation = ShipObservation {
                location: ship.location.clone(),
                nav_status: ship.nav_status,
                since: now,
                recovery_attempts: 0,
                last_recovery: None,
            };
            return Ok(());
        }

        let grace = TimeDelta::from_std(self.config.transit_grace).expect("grace out of range");
        let overdue_transit = ship.nav_status == NavStatus::InTransit
            && ship
                .arrival_at
                .map(|arrival| arrival + grace <= now)
                .unwrap_or(false);

        let idle = TimeDelta::from_std(self.config.idle_threshold).expect("threshold");
        let container_running = self
            .supervisor
            .get(&assignment.container_id)
            .await
            .map(|c| c.status == ContainerStatus::Running)
            .unwrap_or(false);
        let idle_too_long = container_running && now - observation.since >= idle;

        if !(overdue_transit || idle_too_long) {
            return Ok(());
        }

        let cooldown =
            TimeDelta::from_std(self.config.recovery_cooldown).expect("cooldown out of range");
        if let Some(last) = observation.last_recovery {
            if now - last < cooldown {
                return Ok(());
            }
        }

        observation.recovery_attempts += 1;
        observation.last_recovery = Some(now);
        let attempts = observation.recovery_attempts;
        drop(observations);

        warn!(
            ship = %ship.symbol,
            attempts,
            overdue_transit,
            idle_too_long,
            "ship flagged as stuck"
        );

        if attempts > self.config.max_recovery_attempts {
            self.abandon(assignment).await
        } else {
            self.recover(&player, assignment, &ship).await
        }
    }

    /// Recovery is idempotent: waiting for a ship that already arrived
    /// returns immediately, and docking a docked ship is skipped.
    async fn recover(
        &self,
        player: &Player,
        assignment: &ShipAssignment,
        _flagged: &ShipSnapshot,
    ) -> Result<(), HealthError> {
        let ship_symbol = &assignment.ship_symbol;
        let arrived = await_condition(
            self.clock.as_ref(),
            "transit arrival",
            RECOVERY_AWAIT_TIMEOUT,
            &PollSchedule::default(),
            || async {
                Ok::<_, ApiError>(
                    self.api
                        .get_ship(player.id, &player.token, ship_symbol)
                        .await?
                        .to_snapshot(),
                )
            },
            |ship| !ship.is_in_transit(),
        )
        .await?;

        if !arrived.is_docked() {
            match self.api.dock_ship(player.id, &player.token, ship_symbol).await {
                Ok(_) => {}
                Err(ApiError::Conflict(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.logs.append(
            &assignment.container_id,
            assignment.player_id,
            LogLevel::Info,
            format!("recovered {ship_symbol}: awaited arrival and docked"),
        );
        info!(ship = %ship_symbol, "ship recovered");
        Ok(())
    }

    async fn abandon(&self, assignment: &ShipAssignment) -> Result<(), HealthError> {
        warn!(
            ship = %assignment.ship_symbol,
            container = %assignment.container_id,
            "recovery attempts exhausted, abandoning container"
        );
        self.logs.append(
            &assignment.container_id,
            assignment.player_id,
            LogLevel::Error,
            format!(
                "abandoning after repeated failed recoveries of {}",
                assignment.ship_symbol
            ),
        );
        match self
            .supervisor
            .fail_container(&assignment.container_id, "health-abandoned")
            .await
        {
            Ok(()) => {}
            Err(SupervisorError::NotFound(_)) | Err(SupervisorError::InvalidTransition(_)) => {
                // container already gone; just make sure the ship is free
                self.locks
                    .force_release(&assignment.ship_symbol, "health-abandoned")
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}
