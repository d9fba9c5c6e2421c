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

use crate::supervisor::{ContainerRuntime, RunnerContext, RunnerFuture};
use crate::workflows::{
    arbitrage, contract, manufacturing, mining, navigate, purchase, scout, ship_ops,
    ContainerSpec, WorkflowDeps, WorkflowError,
};
use flotilla_common::model::container::{Container, ContainerType};

/// The build-time type-to-factory table. Each arm parses the container's
/// typed metadata and produces its runner; the daemon's closed set of
/// workflows lives here and nowhere else.
pub struct WorkflowRegistry {
    deps: WorkflowDeps,
}

impl WorkflowRegistry {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

impl ContainerRuntime for WorkflowRegistry {
    fn build(
        &self,
        container: &Container,
        ctx: RunnerContext,
    ) -> Result<RunnerFuture, WorkflowError> {
        let spec = ContainerSpec::from_container(container)?;
        let deps = self.deps.clone();
        let player_id = container.player_id;

        Ok(match spec {
            ContainerSpec::Navigate {
                ship_symbol,
                destination,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                navigate::run(deps, ctx, player, ship_symbol, destination).await
            }),
            ContainerSpec::Dock { ship_symbol } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                ship_ops::run_dock(deps, ctx, player, ship_symbol).await
            }),
            ContainerSpec::Orbit { ship_symbol } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                ship_ops::run_orbit(deps, ctx, player, ship_symbol).await
            }),
            ContainerSpec::Refuel { ship_symbol } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                ship_ops::run_refuel(deps, ctx, player, ship_symbol).await
            }),
            ContainerSpec::ContractWorkflow { ship_symbol } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                contract::run_workflow(deps, ctx, player, ship_symbol).await
            }),
            ContainerSpec::ContractFleetCoordinator { ship_symbols } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                contract::run_fleet_coordinator(deps, ctx, player, ship_symbols).await
            }),
            ContainerSpec::ArbitrageCoordinator {
                system,
                ship_symbols,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                arbitrage::run_coordinator(deps, ctx, player, system, ship_symbols).await
            }),
            ContainerSpec::ArbitrageWorker {
                ship_symbol,
                system,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                arbitrage::run_worker(deps, ctx, player, ship_symbol, system).await
            }),
            ContainerSpec::MiningCoordinator {
                system,
                asteroid,
                miners,
                transports,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                mining::run_coordinator(deps, ctx, player, system, asteroid, miners, transports)
                    .await
            }),
            ContainerSpec::MiningWorker {
                ship_symbol,
                asteroid,
                transports,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                mining::run_worker(deps, ctx, player, ship_symbol, asteroid, transports).await
            }),
            ContainerSpec::TransportWorker {
                ship_symbol,
                pickup,
                delivery,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                mining::run_transport(deps, ctx, player, ship_symbol, pickup, delivery).await
            }),
            ContainerSpec::ManufacturingCoordinator {
                system,
                ship_symbols,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                manufacturing::run_coordinator(deps, ctx, player, system, ship_symbols).await
            }),
            ContainerSpec::ManufacturingWorker {
                ship_symbol,
                factory,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                manufacturing::run_worker(deps, ctx, player, ship_symbol, factory).await
            }),
            ContainerSpec::GoodsFactory {
                factory_id,
                waypoint,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                manufacturing::run_goods_factory(deps, ctx, player, factory_id, waypoint).await
            }),
            ContainerSpec::ScoutTour {
                ship_symbol,
                system,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                scout::run_tour(deps, ctx, player, ship_symbol, system).await
            }),
            ContainerSpec::ScoutMarkets {
                ship_symbol,
                system,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                scout::run_markets(deps, ctx, player, ship_symbol, system).await
            }),
            ContainerSpec::PurchaseShip {
                ship_type,
                shipyard,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                purchase::run_purchase(deps, ctx, player, ship_type, shipyard).await
            }),
            ContainerSpec::BatchPurchaseShips {
                ship_type,
                shipyard,
                count,
            } => Box::pin(async move {
                let player = deps.player(player_id).await?;
                purchase::run_batch_purchase(deps, ctx, player, ship_type, shipyard, count).await
            }),
        })
    }

    fn auto_restart(&self, container_type: ContainerType) -> bool {
        match container_type {
            ContainerType::ContractWorkflow
            | ContainerType::ContractFleetCoordinator
            | ContainerType::ArbitrageCoordinator
            | ContainerType::ArbitrageWorker
            | ContainerType::MiningCoordinator
            | ContainerType::MiningWorker
            | ContainerType::TransportWorker
            | ContainerType::ManufacturingCoordinator
            | ContainerType::ManufacturingWorker
            | ContainerType::GoodsFactory
            | ContainerType::ScoutTour
            | ContainerType::ScoutMarkets => true,
            ContainerType::Navigate
            | ContainerType::Dock
            | ContainerType::Orbit
            | ContainerType::Refuel
            | ContainerType::PurchaseShip
            | ContainerType::BatchPurchaseShips => false,
        }
    }

    // resumable at startup is the same set that auto-restarts
    fn resumable(&self, container_type: ContainerType) -> bool {
        self.auto_restart(container_type)
    }
}
