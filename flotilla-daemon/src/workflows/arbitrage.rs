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

use crate::repo::market::MarketRecord;
use crate::supervisor::RunnerContext;
use crate::workflows::{
    cancellable, next_iteration, ship, sleep_cancellable, with_ship_lock, ContainerSpec,
    WorkflowDeps, WorkflowError,
};
use flotilla_common::model::waypoint::{WaypointFilter, TRAIT_MARKETPLACE};
use flotilla_common::model::{Player, ShipSymbol, SystemSymbol, WaypointSymbol};
use std::time::Duration;

/// Registers one ARBITRAGE_WORKER per ship and keeps an eye on them.
pub async fn run_coordinator(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    system: SystemSymbol,
    ship_symbols: Vec<ShipSymbol>,
) -> Result<(), WorkflowError> {
    let mut children = Vec::new();
    for ship_symbol in &ship_symbols {
        let spec = ContainerSpec::ArbitrageWorker {
            ship_symbol: ship_symbol.clone(),
            system: system.clone(),
        };
        let child = ctx
            .supervisor
            .register(spec.container_type(), player.id, spec.to_metadata(), -1)
            .await?;
        ctx.supervisor.start(&child.id).await?;
        children.push(child.id);
    }
    ctx.logger.info(format!(
        "arbitrage coordinator running {} workers in {system}",
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
        ctx.logger
            .debug(format!("{alive}/{} arbitrage workers alive", children.len()));
    }
}

/// Tours the system's marketplaces, persisting each market snapshot. The
/// trade-scoring itself is not the substrate's business; this worker keeps
/// the market data fresh that scoring would read.
pub async fn run_worker(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    system: SystemSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        while next_iteration(&ctx).await? {
            let marketplaces = deps
                .waypoints
                .list_waypoints(
                    &system,
                    &WaypointFilter::having_trait(TRAIT_MARKETPLACE),
                    Some(&player),
                )
                .await?;
            if marketplaces.is_empty() {
                ctx.logger.warn(format!("no marketplaces known in {system}"));
                sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(300)).await?;
                continue;
            }

            for marketplace in &marketplaces {
                ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &marketplace.symbol)
                    .await?;
                observe_market(&deps, &ctx, &player, &marketplace.symbol).await?;
            }
        }
        Ok(())
    })
    .await
}

pub async fn observe_market(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player: &Player,
    waypoint: &WaypointSymbol,
) -> Result<(), WorkflowError> {
    let market = cancellable(&ctx.cancel, async {
        Ok(deps.api.get_market(player.id, &player.token, waypoint).await?)
    })
    .await?;
    deps.markets
        .upsert(&MarketRecord {
            player_id: player.id.to_string(),
            waypoint_symbol: market.symbol.clone(),
            system: waypoint.system_symbol().0,
            data: serde_json::to_string(&market.rest).unwrap_or_default(),
            observed_at: deps.clock.now(),
        })
        .await?;
    ctx.logger.debug(format!("market snapshot saved for {waypoint}"));
    Ok(())
}
