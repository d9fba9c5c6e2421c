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
use crate::metrics;
use crate::repo::container::{ContainerRecord, ContainerRepo};
use crate::services::container_log::{ContainerLogService, ContainerLogger};
use crate::services::ship_locks::{LockError, ShipLockService};
use crate::workflows::WorkflowError;
use chrono::{DateTime, Utc};
use flotilla_common::clock::Clock;
use flotilla_common::model::container::{
    Container, ContainerStatus, ContainerType, InvalidTransition, StopOutcome,
};
use flotilla_common::model::{ContainerId, PlayerId};
use flotilla_common::retries::RetryConfig;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type RunnerFuture = Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send>>;

/// Everything a runner gets from the supervisor besides the shared services:
/// its cancellation signal, its container log handle and a way back into the
/// supervisor (coordinators register their workers through it).
#[derive(Clone)]
pub struct RunnerContext {
    pub cancel: CancellationToken,
    pub logger: ContainerLogger,
    pub supervisor: Arc<ContainerSupervisor>,
}

/// The closed type-to-factory table, bound at build time. Implemented by the
/// workflow registry.
pub trait ContainerRuntime: Send + Sync {
    /// Produces the runner for a container from its typed metadata.
    fn build(&self, container: &Container, ctx: RunnerContext)
        -> Result<RunnerFuture, WorkflowError>;

    /// Whether a failed container of this type is restarted automatically.
    fn auto_restart(&self, container_type: ContainerType) -> bool;

    /// Whether containers of this type are rebuilt and restarted after a
    /// daemon restart instead of being failed as orphaned.
    fn resumable(&self, container_type: ContainerType) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("container {0} not found")]
    NotFound(ContainerId),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("failed to build runner: {0}")]
    Runner(String),
    #[error("corrupt container row: {0}")]
    Corrupt(String),
}

#[derive(Clone)]
struct ManagedContainer {
    container: Arc<tokio::sync::Mutex<Container>>,
    cancel: CancellationToken,
    runner_abort: Option<AbortHandle>,
}

enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Owns the set of live containers: state machine transitions (persisted
/// write-through), the per-type restart policy, startup recovery and
/// graceful shutdown. Containers run as isolated tasks; a panic in one is
/// converted into a FAILED transition and cannot affect the others.
pub struct ContainerSupervisor {
    self_ref: Weak<ContainerSupervisor>,
    repo: Arc<dyn ContainerRepo>,
    locks: Arc<dyn ShipLockService>,
    logs: Arc<ContainerLogService>,
    clock: Arc<dyn Clock>,
    runtime: Arc<dyn ContainerRuntime>,
    default_max_restarts: u32,
    restart_backoff: RetryConfig,
    registry: Mutex<HashMap<ContainerId, ManagedContainer>>,
    watchers: Mutex<HashMap<ContainerId, JoinHandle<()>>>,
}

impl ContainerSupervisor {
    pub fn new(
        repo: Arc<dyn ContainerRepo>,
        locks: Arc<dyn ShipLockService>,
        logs: Arc<ContainerLogService>,
        clock: Arc<dyn Clock>,
        runtime: Arc<dyn ContainerRuntime>,
        default_max_restarts: u32,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            repo,
            locks,
            logs,
            clock,
            runtime,
            default_max_restarts,
            restart_backoff: RetryConfig::container_restart(),
            registry: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
        })
    }

    fn strong(&self) -> Arc<ContainerSupervisor> {
        self.self_ref.upgrade().expect("supervisor dropped")
    }

    fn managed(&self, id: &ContainerId) -> Result<ManagedContainer, SupervisorError> {
        self.registry
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.clone()))
    }

    fn adopt(&self, container: Container) -> ManagedContainer {
        let managed = ManagedContainer {
            container: Arc::new(tokio::sync::Mutex::new(container.clone())),
            cancel: CancellationToken::new(),
            runner_abort: None,
        };
        self.registry
            .lock()
            .unwrap()
            .insert(container.id.clone(), managed.clone());
        managed
    }

    /// Applies a state-machine transition under the container's mutex and
    /// writes the row through before releasing it, which makes status
    /// changes linearizable per container.
    async fn apply<T>(
        &self,
        id: &ContainerId,
        f: impl FnOnce(&mut Container, DateTime<Utc>) -> Result<T, InvalidTransition>,
    ) -> Result<(Container, T), SupervisorError> {
        let managed = self.managed(id)?;
        let mut guard = managed.container.lock().await;
        let value = f(&mut guard, self.clock.now())?;
        let snapshot = guard.clone();
        self.repo.update(&ContainerRecord::from(&snapshot)).await?;
        drop(guard);
        metrics::record_container_status(snapshot.container_type, snapshot.status);
        Ok((snapshot, value))
    }

    /// Creates a new PENDING container and registers it; does not start it.
    pub async fn register(
        &self,
        container_type: ContainerType,
        player_id: PlayerId,
        metadata: serde_json::Value,
        max_iterations: i64,
    ) -> Result<Container, SupervisorError> {
        let id = ContainerId::generate(container_type);
        let mut container = Container::new(
            id,
            container_type,
            player_id,
            metadata,
            max_iterations,
            self.clock.now(),
        );
        container.max_restarts = self.default_max_restarts;
        self.repo.insert(&ContainerRecord::from(&container)).await?;
        self.adopt(container.clone());
        info!(container = %container.id, container_type = %container_type, "container registered");
        Ok(container)
    }

    pub fn start<'a>(
        &'a self,
        id: &'a ContainerId,
    ) -> Pin<Box<dyn Future<Output = Result<(), SupervisorError>> + Send + 'a>> {
        Box::pin(async move {
            let (snapshot, _) = self.apply(id, |c, now| c.start(now)).await?;

            let ctx = RunnerContext {
                cancel: self.managed(id)?.cancel.clone(),
                logger: self.logs.logger(id.clone(), snapshot.player_id),
                supervisor: self.strong(),
            };

            let runner = match self.runtime.build(&snapshot, ctx) {
                Ok(runner) => runner,
                Err(err) => {
                    let message = format!("failed to build runner: {err}");
                    let _ = self.apply(id, |c, now| c.fail(&message, now)).await;
                    self.locks.release_by_container(id, "runner-build-failed").await?;
                    return Err(SupervisorError::Runner(err.to_string()));
                }
            };

            let runner_handle = tokio::spawn(runner);
            {
                let mut registry = self.registry.lock().unwrap();
                if let Some(managed) = registry.get_mut(id) {
                    managed.runner_abort = Some(runner_handle.abort_handle());
                }
            }

            let supervisor = self.strong();
            let watched_id = id.clone();
            let watcher = tokio::spawn(async move {
                supervisor.watch(watched_id, runner_handle).await;
            });
            self.watchers.lock().unwrap().insert(id.clone(), watcher);

            info!(container = %id, "container started");
            Ok(())
        })
    }

    async fn watch(self: Arc<Self>, id: ContainerId, handle: JoinHandle<Result<(), WorkflowError>>) {
        let outcome = match handle.await {
            Ok(Ok(())) => RunOutcome::Completed,
            Ok(Err(WorkflowError::Cancelled)) => RunOutcome::Cancelled,
            Ok(Err(err)) => RunOutcome::Failed(err.to_string()),
            Err(join_err) if join_err.is_panic() => {
                RunOutcome::Failed(format!("runner panicked: {join_err}"))
            }
            Err(_) => RunOutcome::Cancelled,
        };
        self.finish(&id, outcome).await;
    }

    /// Final transition once the runner task has returned. The runner having
    /// returned is what makes a terminal status legal, so this is the only
    /// place COMPLETED/STOPPED are entered from RUNNING/STOPPING.
    async fn finish(&self, id: &ContainerId, outcome: RunOutcome) {
        let result = match outcome {
            RunOutcome::Completed => {
                self.apply(id, |c, now| c.complete(now))
                    .await
                    .map(|(c, _)| (c, "completed"))
            }
            RunOutcome::Cancelled => self
                .apply(id, |c, now| match c.status {
                    ContainerStatus::Stopping => c.mark_stopped(now),
                    _ => c.fail("cancelled", now),
                })
                .await
                .map(|(c, _)| (c, "stopped")),
            RunOutcome::Failed(ref message) => self
                .apply(id, |c, now| c.fail(message.clone(), now))
                .await
                .map(|(c, _)| (c, "failed")),
        };

        let container = match result {
            Ok((container, reason)) => {
                info!(container = %id, status = %container.status, "container finished");
                if let Err(err) = self.locks.release_by_container(id, reason).await {
                    error!(container = %id, error = %err, "failed to release assignments");
                }
                container
            }
            Err(SupervisorError::InvalidTransition(err)) => {
                // already driven terminal elsewhere (health monitor, shutdown)
                debug!(container = %id, %err, "runner returned after terminal transition");
                return;
            }
            Err(err) => {
                error!(container = %id, error = %err, "failed to record container outcome");
                return;
            }
        };

        if container.status == ContainerStatus::Failed
            && self.runtime.auto_restart(container.container_type)
            && container.can_restart()
        {
            let delay = self
                .restart_backoff
                .jittered_delay_for_attempt(container.restart_count);
            info!(container = %id, ?delay, "scheduling container restart");
            let supervisor = self.strong();
            let restart_id = id.clone();
            tokio::spawn(async move {
                supervisor.clock.sleep(delay).await;
                if let Err(err) = supervisor.restart(&restart_id).await {
                    warn!(container = %restart_id, error = %err, "container restart failed");
                }
            });
        }
    }

    /// FAILED -> PENDING -> RUNNING with a fresh cancellation token.
    pub async fn restart(&self, id: &ContainerId) -> Result<(), SupervisorError> {
        self.apply(id, |c, _| c.reset_for_restart()).await?;
        {
            let mut registry = self.registry.lock().unwrap();
            if let Some(managed) = registry.get_mut(id) {
                managed.cancel = CancellationToken::new();
                managed.runner_abort = None;
            }
        }
        self.start(id).await
    }

    /// Requests a stop: PENDING and FAILED containers stop directly, RUNNING
    /// ones are cancelled and stop once the runner returns.
    pub async fn stop(&self, id: &ContainerId) -> Result<StopOutcome, SupervisorError> {
        let (_, outcome) = self.apply(id, |c, now| c.stop(now)).await?;
        match outcome {
            StopOutcome::Stopping => {
                self.managed(id)?.cancel.cancel();
            }
            StopOutcome::Stopped => {
                self.locks.release_by_container(id, "stopped").await?;
            }
        }
        Ok(outcome)
    }

    /// Forcibly fails a container (health monitor, shutdown timeout): signal
    /// cancellation, record the failure, release its ships.
    pub async fn fail_container(
        &self,
        id: &ContainerId,
        reason: &str,
    ) -> Result<(), SupervisorError> {
        let managed = self.managed(id)?;
        managed.cancel.cancel();
        self.apply(id, |c, now| c.fail(reason, now)).await?;
        if let Some(abort) = &managed.runner_abort {
            abort.abort();
        }
        self.locks.release_by_container(id, reason).await?;
        Ok(())
    }

    pub async fn get(&self, id: &ContainerId) -> Result<Container, SupervisorError> {
        if let Ok(managed) = self.managed(id) {
            return Ok(managed.container.lock().await.clone());
        }
        let record = self
            .repo
            .get(&id.0)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.clone()))?;
        Container::try_from(record).map_err(SupervisorError::Corrupt)
    }

    pub async fn list(
        &self,
        player_id: Option<PlayerId>,
        container_type: Option<ContainerType>,
        status: Option<ContainerStatus>,
    ) -> Result<Vec<Container>, SupervisorError> {
        let player = player_id.map(|p| p.to_string());
        let records = self
            .repo
            .list(
                player.as_deref(),
                container_type.map(|t| t.as_str()),
                status.map(|s| s.as_str()),
            )
            .await?;
        records
            .into_iter()
            .map(|r| Container::try_from(r).map_err(SupervisorError::Corrupt))
            .collect()
    }

    pub async fn active_count(&self) -> Result<usize, SupervisorError> {
        Ok(self
            .repo
            .list(None, None, Some(ContainerStatus::Running.as_str()))
            .await?
            .len())
    }

    pub fn known_ids(&self) -> HashSet<ContainerId> {
        self.registry.lock().unwrap().keys().cloned().collect()
    }

    /// Cooperative iteration bookkeeping for runners.
    pub async fn increment_iteration(&self, id: &ContainerId) -> Result<i64, SupervisorError> {
        let (_, iteration) = self.apply(id, |c, _| c.increment_iteration()).await?;
        Ok(iteration)
    }

    pub async fn should_continue(&self, id: &ContainerId) -> Result<bool, SupervisorError> {
        let managed = self.managed(id)?;
        let guard = managed.container.lock().await;
        Ok(guard.should_continue())
    }

    /// Startup recovery: every non-terminal row in the database belongs to a
    /// previous daemon run. Resumable types get their runner rebuilt through
    /// the factory table; everything else is failed as orphaned. Either way
    /// the old run's ship assignments are released.
    pub async fn recover_at_startup(&self) -> Result<(), SupervisorError> {
        let records = self.repo.find_non_terminal().await?;
        let recovered = records.len();
        for record in records {
            let mut container = match Container::try_from(record) {
                Ok(container) => container,
                Err(err) => {
                    error!(error = %err, "skipping corrupt container row");
                    continue;
                }
            };
            let id = container.id.clone();

            if let Err(err) = container.fail("orphaned-at-startup", self.clock.now()) {
                warn!(container = %id, %err, "unexpected status during recovery");
                continue;
            }
            self.repo.update(&ContainerRecord::from(&container)).await?;
            self.locks
                .release_by_container(&id, "orphaned-at-startup")
                .await?;

            let resumable = self.runtime.resumable(container.container_type);
            if resumable && container.can_restart() {
                container.reset_for_restart()?;
                self.repo.update(&ContainerRecord::from(&container)).await?;
                self.adopt(container);
                if let Err(err) = self.start(&id).await {
                    warn!(container = %id, error = %err, "failed to resume container");
                }
            } else {
                info!(container = %id, "container failed as orphaned-at-startup");
            }
        }
        if recovered > 0 {
            info!(count = recovered, "startup recovery finished");
        }

        let existing = self.known_ids();
        self.locks
            .clean_orphans(&existing, "orphaned-at-startup")
            .await?;
        Ok(())
    }

    /// Graceful shutdown: cancel every live container, give them the
    /// deadline to stop, force-fail the rest.
    pub async fn shutdown(&self, deadline: Duration) {
        let ids: Vec<ContainerId> = self.known_ids().into_iter().collect();
        for id in &ids {
            match self.stop(id).await {
                Ok(_) => {}
                Err(SupervisorError::InvalidTransition(_)) => {}
                Err(err) => warn!(container = %id, error = %err, "stop failed during shutdown"),
            }
        }

        let waited_from = self.clock.now();
        let deadline_at =
            waited_from + chrono::TimeDelta::from_std(deadline).expect("deadline out of range");
        loop {
            let mut all_terminal = true;
            for id in &ids {
                if let Ok(managed) = self.managed(id) {
                    let status = managed.container.lock().await.status;
                    if !status.is_terminal() {
                        all_terminal = false;
                        break;
                    }
                }
            }
            if all_terminal {
                break;
            }
            if self.clock.now() >= deadline_at {
                for id in &ids {
                    if let Ok(managed) = self.managed(id) {
                        let status = managed.container.lock().await.status;
                        if !status.is_terminal() {
                            warn!(container = %id, "container did not stop in time");
                            if let Err(err) = self.fail_container(id, "shutdown-timeout").await {
                                error!(container = %id, error = %err, "failed to force-fail container");
                            }
                        }
                    }
                }
                break;
            }
            self.clock.sleep(Duration::from_millis(250)).await;
        }
        info!("container supervisor drained");
    }
}
