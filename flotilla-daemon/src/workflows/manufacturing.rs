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

use crate::repo::goods_factory::GoodsFactoryRecord;
use crate::supervisor::RunnerContext;
use crate::workflows::arbitrage::observe_market;
use crate::workflows::{
    next_iteration, ship, sleep_cancellable, with_ship_lock, ContainerSpec, WorkflowDeps,
    WorkflowError,
};
use flotilla_common::model::waypoint::WaypointFilter;
use flotilla_common::model::{Player, ShipSymbol, SystemSymbol, WaypointSymbol};
use std::time::Duration;

/// Registers one MANUFACTURING_WORKER per ship against the system's factory
/// waypoints and supervises them.
pub async fn run_coordinator(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    system: SystemSymbol,
    ship_symbols: Vec<ShipSymbol>,
) -> Result<(), WorkflowError> {
    let factories = deps
        .waypoints
        .list_waypoints(
            &system,
            &WaypointFilter {
                waypoint_type: Some("INDUSTRIAL".to_string()),
                ..WaypointFilter::default()
            },
            Some(&player),
        )
        .await?;
    let factory_waypoints: Vec<WaypointSymbol> = if factories.is_empty() {
        deps.waypoints
            .list_waypoints(
                &system,
                &WaypointFilter::having_trait("INDUSTRIAL"),
                Some(&player),
            )
            .await?
            .iter()
            .map(|w| w.symbol.clone())
            .collect()
    } else {
        factories.iter().map(|w| w.symbol.clone()).collect()
    };

    if factory_waypoints.is_empty() {
        return Err(WorkflowError::InvalidMetadata(format!(
            "no factory waypoints found in {system}"
        )));
    }

    let mut children = Vec::new();
    for (index, ship_symbol) in ship_symbols.iter().enumerate() {
        let factory = factory_waypoints[index % factory_waypoints.len()].clone();
        let spec = ContainerSpec::ManufacturingWorker {
            ship_symbol: ship_symbol.clone(),
            factory,
        };
        let child = ctx
            .supervisor
            .register(spec.container_type(), player.id, spec.to_metadata(), -1)
            .await?;
        ctx.supervisor.start(&child.id).await?;
        children.push(child.id);
    }
    ctx.logger.info(format!(
        "manufacturing coordinator running {} workers",
        children.len()
    ));

    loop {
        sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(60)).await?;
        let mut alive = 0;
        for child in &children {
            if !ctx.supervisor.get(child).await?.status.is_terminal() {
                alive += 1;
            }
        }
        ctx.logger.debug(format!(
            "{alive}/{} manufacturing workers alive",
            children.len()
        ));
    }
}

/// Supply runner for one factory waypoint: keep its market observed and its
/// input goods topped up from wherever the ship currently is.
pub async fn run_worker(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    factory: WaypointSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        while next_iteration(&ctx).await? {
            ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &factory).await?;
            ship::ensure_docked(&deps, &ctx.cancel, &player, &ship_symbol).await?;
            observe_market(&deps, &ctx, &player, &factory).await?;
            ctx.logger.debug(format!("factory {factory} serviced"));
            sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(180)).await?;
        }
        Ok(())
    })
    .await
}

/// Bookkeeping task for a goods factory: keeps its persisted state fresh so
/// the CLI can inspect production without touching the remote API.
pub async fn run_goods_factory(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    factory_id: String,
    waypoint: WaypointSymbol,
) -> Result<(), WorkflowError> {
    while next_iteration(&ctx).await? {
        deps.goods
            .upsert(&GoodsFactoryRecord {
                id: factory_id.clone(),
                player_id: player.id.to_string(),
                data: serde_json::json!({
                    "waypoint": waypoint,
                    "container": ctx.logger.container_id(),
                })
                .to_string(),
                updated_at: deps.clock.now(),
            })
            .await?;
        ctx.logger.debug(format!("goods factory {factory_id} state saved"));
        sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(300)).await?;
    }
    Ok(())
}
