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

use crate::model::{ContainerId, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const UNBOUNDED_ITERATIONS: i64 = -1;
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Closed set of supervised task types. Each is bound to a factory at build
/// time; adding a type is a code change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Navigate,
    Dock,
    Orbit,
    Refuel,
    ContractWorkflow,
    ContractFleetCoordinator,
    ArbitrageCoordinator,
    ArbitrageWorker,
    MiningCoordinator,
    MiningWorker,
    TransportWorker,
    ManufacturingCoordinator,
    ManufacturingWorker,
    GoodsFactory,
    ScoutTour,
    ScoutMarkets,
    PurchaseShip,
    BatchPurchaseShips,
}

impl ContainerType {
    pub const ALL: [ContainerType; 18] = [
        ContainerType::Navigate,
        ContainerType::Dock,
        ContainerType::Orbit,
        ContainerType::Refuel,
        ContainerType::ContractWorkflow,
        ContainerType::ContractFleetCoordinator,
        ContainerType::ArbitrageCoordinator,
        ContainerType::ArbitrageWorker,
        ContainerType::MiningCoordinator,
        ContainerType::MiningWorker,
        ContainerType::TransportWorker,
        ContainerType::ManufacturingCoordinator,
        ContainerType::ManufacturingWorker,
        ContainerType::GoodsFactory,
        ContainerType::ScoutTour,
        ContainerType::ScoutMarkets,
        ContainerType::PurchaseShip,
        ContainerType::BatchPurchaseShips,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Navigate => "NAVIGATE",
            ContainerType::Dock => "DOCK",
            ContainerType::Orbit => "ORBIT",
            ContainerType::Refuel => "REFUEL",
            ContainerType::ContractWorkflow => "CONTRACT_WORKFLOW",
            ContainerType::ContractFleetCoordinator => "CONTRACT_FLEET_COORDINATOR",
            ContainerType::ArbitrageCoordinator => "ARBITRAGE_COORDINATOR",
            ContainerType::ArbitrageWorker => "ARBITRAGE_WORKER",
            ContainerType::MiningCoordinator => "MINING_COORDINATOR",
            ContainerType::MiningWorker => "MINING_WORKER",
            ContainerType::TransportWorker => "TRANSPORT_WORKER",
            ContainerType::ManufacturingCoordinator => "MANUFACTURING_COORDINATOR",
            ContainerType::ManufacturingWorker => "MANUFACTURING_WORKER",
            ContainerType::GoodsFactory => "GOODS_FACTORY",
            ContainerType::ScoutTour => "SCOUT_TOUR",
            ContainerType::ScoutMarkets => "SCOUT_MARKETS",
            ContainerType::PurchaseShip => "PURCHASE_SHIP",
            ContainerType::BatchPurchaseShips => "BATCH_PURCHASE_SHIPS",
        }
    }

    pub fn kebab_name(&self) -> String {
        self.as_str().to_lowercase().replace('_', "-")
    }
}

impl Display for ContainerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContainerType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown container type: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl ContainerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContainerStatus::Stopped | ContainerStatus::Completed | ContainerStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Pending => "PENDING",
            ContainerStatus::Running => "RUNNING",
            ContainerStatus::Stopping => "STOPPING",
            ContainerStatus::Stopped => "STOPPED",
            ContainerStatus::Completed => "COMPLETED",
            ContainerStatus::Failed => "FAILED",
        }
    }
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ContainerStatus::Pending),
            "RUNNING" => Ok(ContainerStatus::Running),
            "STOPPING" => Ok(ContainerStatus::Stopping),
            "STOPPED" => Ok(ContainerStatus::Stopped),
            "COMPLETED" => Ok(ContainerStatus::Completed),
            "FAILED" => Ok(ContainerStatus::Failed),
            other => Err(format!("Unknown container status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("illegal container transition: {trigger} while {from}")]
pub struct InvalidTransition {
    pub from: ContainerStatus,
    pub trigger: &'static str,
}

/// Result of a `stop` request: `PENDING`/`FAILED` containers stop directly,
/// `RUNNING` ones enter graceful shutdown first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    Stopping,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub container_type: ContainerType,
    pub player_id: PlayerId,
    pub status: ContainerStatus,
    pub current_iteration: i64,
    /// `-1` means unbounded.
    pub max_iterations: i64,
    pub restart_count: u32,
    pub max_restarts: u32,
    pub last_error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Container {
    pub fn new(
        id: ContainerId,
        container_type: ContainerType,
        player_id: PlayerId,
        metadata: serde_json::Value,
        max_iterations: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            container_type,
            player_id,
            status: ContainerStatus::Pending,
            current_iteration: 0,
            max_iterations,
            restart_count: 0,
            max_restarts: DEFAULT_MAX_RESTARTS,
            last_error: None,
            metadata,
            created_at,
            started_at: None,
            stopped_at: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.status {
            ContainerStatus::Pending | ContainerStatus::Stopped => {
                self.status = ContainerStatus::Running;
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
                Ok(())
            }
            from => Err(InvalidTransition {
                from,
                trigger: "start",
            }),
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.status {
            ContainerStatus::Running => {
                self.status = ContainerStatus::Completed;
                self.stopped_at = Some(now);
                Ok(())
            }
            from => Err(InvalidTransition {
                from,
                trigger: "complete",
            }),
        }
    }

    pub fn fail(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        match self.status {
            ContainerStatus::Pending | ContainerStatus::Running | ContainerStatus::Stopping => {
                self.status = ContainerStatus::Failed;
                self.last_error = Some(error.into());
                self.stopped_at = Some(now);
                Ok(())
            }
            from => Err(InvalidTransition {
                from,
                trigger: "fail",
            }),
        }
    }

    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<StopOutcome, InvalidTransition> {
        match self.status {
            ContainerStatus::Pending | ContainerStatus::Failed => {
                self.status = ContainerStatus::Stopped;
                self.stopped_at = Some(now);
                Ok(StopOutcome::Stopped)
            }
            ContainerStatus::Running => {
                self.status = ContainerStatus::Stopping;
                Ok(StopOutcome::Stopping)
            }
            from => Err(InvalidTransition {
                from,
                trigger: "stop",
            }),
        }
    }

    pub fn mark_stopped(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.status {
            ContainerStatus::Stopping => {
                self.status = ContainerStatus::Stopped;
                self.stopped_at = Some(now);
                Ok(())
            }
            from => Err(InvalidTransition {
                from,
                trigger: "mark_stopped",
            }),
        }
    }

    /// FAILED -> PENDING, keeping the id and bumping `restart_count`.
    pub fn reset_for_restart(&mut self) -> Result<(), InvalidTransition> {
        if self.status != ContainerStatus::Failed || !self.can_restart() {
            return Err(InvalidTransition {
                from: self.status,
                trigger: "reset_for_restart",
            });
        }
        self.status = ContainerStatus::Pending;
        self.restart_count += 1;
        self.last_error = None;
        self.stopped_at = None;
        Ok(())
    }

    pub fn can_restart(&self) -> bool {
        self.restart_count < self.max_restarts
    }

    pub fn should_continue(&self) -> bool {
        self.max_iterations == UNBOUNDED_ITERATIONS
            || self.current_iteration < self.max_iterations
    }

    pub fn increment_iteration(&mut self) -> Result<i64, InvalidTransition> {
        if self.status != ContainerStatus::Running || !self.should_continue() {
            return Err(InvalidTransition {
                from: self.status,
                trigger: "increment_iteration",
            });
        }
        self.current_iteration += 1;
        Ok(self.current_iteration)
    }
}
