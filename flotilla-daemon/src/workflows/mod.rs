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

pub mod arbitrage;
pub mod contract;
pub mod manufacturing;
pub mod mining;
pub mod navigate;
pub mod purchase;
pub mod registry;
pub mod scout;
pub mod ship;
pub mod ship_ops;

use crate::db::RepoError;
use crate::repo::contract::ContractRepo;
use crate::repo::goods_factory::GoodsFactoryRepo;
use crate::repo::market::MarketRepo;
use crate::repo::mining::MiningRepo;
use crate::repo::player::PlayerRepo;
use crate::services::ship_locks::{LockError, ShipLockService};
use crate::services::system_graph::SystemGraphCache;
use crate::services::waypoint_cache::{CacheError, WaypointCache};
use crate::supervisor::{RunnerContext, SupervisorError};
use flotilla_client::{ApiClient, ApiError};
use flotilla_common::clock::Clock;
use flotilla_common::eventual::AwaitError;
use flotilla_common::model::container::{Container, ContainerType};
use flotilla_common::model::{Player, PlayerId, ShipSymbol, SystemSymbol, WaypointSymbol};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("cancelled")]
    Cancelled,
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("invalid container metadata: {0}")]
    InvalidMetadata(String),
    #[error("no route from {from} to {to}")]
    NoRoute {
        from: WaypointSymbol,
        to: WaypointSymbol,
    },
    #[error(transparent)]
    Supervisor(Box<SupervisorError>),
}

impl From<SupervisorError> for WorkflowError {
    fn from(err: SupervisorError) -> Self {
        WorkflowError::Supervisor(Box::new(err))
    }
}

impl From<AwaitError<ApiError>> for WorkflowError {
    fn from(err: AwaitError<ApiError>) -> Self {
        match err {
            AwaitError::Timeout { what, .. } => WorkflowError::Timeout(what.to_string()),
            AwaitError::Fetch { source, .. } => WorkflowError::Api(source),
        }
    }
}

impl From<AwaitError<WorkflowError>> for WorkflowError {
    fn from(err: AwaitError<WorkflowError>) -> Self {
        match err {
            AwaitError::Timeout { what, .. } => WorkflowError::Timeout(what.to_string()),
            AwaitError::Fetch { source, .. } => source,
        }
    }
}

/// Typed container metadata; one variant per container type. Serialized into
/// the container's metadata column, so a resumable container can be rebuilt
/// from its row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerSpec {
    Navigate {
        ship_symbol: ShipSymbol,
        destination: WaypointSymbol,
    },
    Dock {
        ship_symbol: ShipSymbol,
    },
    Orbit {
        ship_symbol: ShipSymbol,
    },
    Refuel {
        ship_symbol: ShipSymbol,
    },
    ContractWorkflow {
        ship_symbol: ShipSymbol,
    },
    ContractFleetCoordinator {
        ship_symbols: Vec<ShipSymbol>,
    },
    ArbitrageCoordinator {
        system: SystemSymbol,
        ship_symbols: Vec<ShipSymbol>,
    },
    ArbitrageWorker {
        ship_symbol: ShipSymbol,
        system: SystemSymbol,
    },
    MiningCoordinator {
        system: SystemSymbol,
        asteroid: Option<WaypointSymbol>,
        miners: Vec<ShipSymbol>,
        transports: Vec<ShipSymbol>,
    },
    MiningWorker {
        ship_symbol: ShipSymbol,
        asteroid: WaypointSymbol,
        transports: Vec<ShipSymbol>,
    },
    TransportWorker {
        ship_symbol: ShipSymbol,
        pickup: WaypointSymbol,
        delivery: WaypointSymbol,
    },
    ManufacturingCoordinator {
        system: SystemSymbol,
        ship_symbols: Vec<ShipSymbol>,
    },
    ManufacturingWorker {
        ship_symbol: ShipSymbol,
        factory: WaypointSymbol,
    },
    GoodsFactory {
        factory_id: String,
        waypoint: WaypointSymbol,
    },
    ScoutTour {
        ship_symbol: ShipSymbol,
        system: SystemSymbol,
    },
    ScoutMarkets {
        ship_symbol: ShipSymbol,
        system: SystemSymbol,
    },
    PurchaseShip {
        ship_type: String,
        shipyard: WaypointSymbol,
    },
    BatchPurchaseShips {
        ship_type: String,
        shipyard: WaypointSymbol,
        count: u32,
    },
}

impl ContainerSpec {
    pub fn container_type(&self) -> ContainerType {
        match self {
            ContainerSpec::Navigate { .. } => ContainerType::Navigate,
            ContainerSpec::Dock { .. } => ContainerType::Dock,
            ContainerSpec::Orbit { .. } => ContainerType::Orbit,
            ContainerSpec::Refuel { .. } => ContainerType::Refuel,
            ContainerSpec::ContractWorkflow { .. } => ContainerType::ContractWorkflow,
            ContainerSpec::ContractFleetCoordinator { .. } => {
                ContainerType::ContractFleetCoordinator
            }
            ContainerSpec::ArbitrageCoordinator { .. } => ContainerType::ArbitrageCoordinator,
            ContainerSpec::ArbitrageWorker { .. } => ContainerType::ArbitrageWorker,
            ContainerSpec::MiningCoordinator { .. } => ContainerType::MiningCoordinator,
            ContainerSpec::MiningWorker { .. } => ContainerType::MiningWorker,
            ContainerSpec::TransportWorker { .. } => ContainerType::TransportWorker,
            ContainerSpec::ManufacturingCoordinator { .. } => {
                ContainerType::ManufacturingCoordinator
            }
            ContainerSpec::ManufacturingWorker { .. } => ContainerType::ManufacturingWorker,
            ContainerSpec::GoodsFactory { .. } => ContainerType::GoodsFactory,
            ContainerSpec::ScoutTour { .. } => ContainerType::ScoutTour,
            ContainerSpec::ScoutMarkets { .. } => ContainerType::ScoutMarkets,
            ContainerSpec::PurchaseShip { .. } => ContainerType::PurchaseShip,
            ContainerSpec::BatchPurchaseShips { .. } => ContainerType::BatchPurchaseShips,
        }
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("container spec serializes")
    }

    pub fn from_container(container: &Container) -> Result<Self, WorkflowError> {
        let spec: ContainerSpec = serde_json::from_value(container.metadata.clone())
            .map_err(|err| WorkflowError::InvalidMetadata(err.to_string()))?;
        if spec.container_type() != container.container_type {
            return Err(WorkflowError::InvalidMetadata(format!(
                "metadata kind {} does not match container type {}",
                spec.container_type(),
                container.container_type
            )));
        }
        Ok(spec)
    }

    /// Structural validation before dispatch; anything failing here is a
    /// BadRequest, never a started container.
    pub fn validate(&self) -> Result<(), String> {
        fn non_empty(what: &str, value: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("{what} must not be empty"))
            } else {
                Ok(())
            }
        }

        match self {
            ContainerSpec::Navigate {
                ship_symbol,
                destination,
            } => {
                non_empty("ship symbol", &ship_symbol.0)?;
                non_empty("destination", &destination.0)
            }
            ContainerSpec::Dock { ship_symbol }
            | ContainerSpec::Orbit { ship_symbol }
            | ContainerSpec::Refuel { ship_symbol }
            | ContainerSpec::ContractWorkflow { ship_symbol } => {
                non_empty("ship symbol", &ship_symbol.0)
            }
            ContainerSpec::ContractFleetCoordinator { ship_symbols }
            | ContainerSpec::ArbitrageCoordinator { ship_symbols, .. }
            | ContainerSpec::ManufacturingCoordinator { ship_symbols, .. } => {
                if ship_symbols.is_empty() {
                    return Err("at least one ship is required".to_string());
                }
                for ship in ship_symbols {
                    non_empty("ship symbol", &ship.0)?;
                }
                Ok(())
            }
            ContainerSpec::ArbitrageWorker { ship_symbol, .. }
            | ContainerSpec::ManufacturingWorker { ship_symbol, .. }
            | ContainerSpec::ScoutTour { ship_symbol, .. }
            | ContainerSpec::ScoutMarkets { ship_symbol, .. } => {
                non_empty("ship symbol", &ship_symbol.0)
            }
            ContainerSpec::MiningCoordinator { miners, .. } => {
                if miners.is_empty() {
                    return Err("at least one mining ship is required".to_string());
                }
                Ok(())
            }
            ContainerSpec::MiningWorker {
                ship_symbol,
                asteroid,
                ..
            } => {
                non_empty("ship symbol", &ship_symbol.0)?;
                non_empty("asteroid", &asteroid.0)
            }
            ContainerSpec::TransportWorker {
                ship_symbol,
                pickup,
                delivery,
            } => {
                non_empty("ship symbol", &ship_symbol.0)?;
                non_empty("pickup", &pickup.0)?;
                non_empty("delivery", &delivery.0)
            }
            ContainerSpec::GoodsFactory {
                factory_id,
                waypoint,
            } => {
                non_empty("factory id", factory_id)?;
                non_empty("waypoint", &waypoint.0)
            }
            ContainerSpec::PurchaseShip { ship_type, shipyard } => {
                non_empty("ship type", ship_type)?;
                non_empty("shipyard", &shipyard.0)
            }
            ContainerSpec::BatchPurchaseShips {
                ship_type,
                shipyard,
                count,
            } => {
                non_empty("ship type", ship_type)?;
                non_empty("shipyard", &shipyard.0)?;
                if *count == 0 {
                    return Err("count must be at least 1".to_string());
                }
                Ok(())
            }
        }
    }
}

/// The shared collaborators handed to every workflow.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub clock: Arc<dyn Clock>,
    pub api: Arc<ApiClient>,
    pub players: Arc<dyn PlayerRepo>,
    pub waypoints: Arc<dyn WaypointCache>,
    pub graphs: Arc<dyn SystemGraphCache>,
    pub locks: Arc<dyn ShipLockService>,
    pub markets: Arc<dyn MarketRepo>,
    pub contracts: Arc<dyn ContractRepo>,
    pub mining: Arc<dyn MiningRepo>,
    pub goods: Arc<dyn GoodsFactoryRepo>,
}

impl WorkflowDeps {
    pub async fn player(&self, id: PlayerId) -> Result<Player, WorkflowError> {
        let record = self
            .players
            .get(&id.to_string())
            .await?
            .ok_or(WorkflowError::PlayerNotFound(id))?;
        Player::try_from(record).map_err(WorkflowError::InvalidMetadata)
    }
}

/// Races a workflow step against the container's cancellation signal; every
/// suspension point in a runner goes through here.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, WorkflowError>>,
) -> Result<T, WorkflowError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        result = fut => result,
    }
}

/// Cancellation-aware sleep.
pub async fn sleep_cancellable(
    cancel: &CancellationToken,
    clock: &Arc<dyn Clock>,
    duration: std::time::Duration,
) -> Result<(), WorkflowError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        _ = clock.sleep(duration) => Ok(()),
    }
}

/// Cooperative iteration control: returns false once the container's
/// iteration budget is spent or it is no longer running.
pub async fn next_iteration(ctx: &RunnerContext) -> Result<bool, WorkflowError> {
    let id = ctx.logger.container_id().clone();
    if !ctx.supervisor.should_continue(&id).await? {
        return Ok(false);
    }
    match ctx.supervisor.increment_iteration(&id).await {
        Ok(_) => Ok(true),
        Err(SupervisorError::InvalidTransition(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Acquires the ship for the container, runs the body, releases with a
/// reason matching the outcome. The supervisor releases by container id as
/// well once the runner returns, so a missed release here cannot leak.
pub async fn with_ship_lock<F, Fut>(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player_id: PlayerId,
    ship_symbol: &ShipSymbol,
    body: F,
) -> Result<(), WorkflowError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), WorkflowError>>,
{
    deps.locks
        .acquire(ship_symbol, player_id, ctx.logger.container_id())
        .await?;
    let result = body().await;
    let reason = match &result {
        Ok(()) => "completed",
        Err(WorkflowError::Cancelled) => "cancelled",
        Err(_) => "failed",
    };
    if let Err(err) = deps.locks.force_release(ship_symbol, reason).await {
        warn!(ship = %ship_symbol, error = %err, "failed to release ship lock");
    }
    result
}
