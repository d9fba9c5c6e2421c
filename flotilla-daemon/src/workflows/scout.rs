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

use crate::supervisor::RunnerContext;
use crate::workflows::arbitrage::observe_market;
use crate::workflows::{
    next_iteration, ship, sleep_cancellable, with_ship_lock, WorkflowDeps, WorkflowError,
};
use flotilla_common::model::waypoint::{WaypointFilter, TRAIT_MARKETPLACE};
use flotilla_common::model::{Player, ShipSymbol, SystemSymbol};
use std::time::Duration;

/// One full tour of every marketplace in the system, then done.
pub async fn run_tour(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    system: SystemSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        let marketplaces = deps
            .waypoints
            .list_waypoints(
                &system,
                &WaypointFilter::having_trait(TRAIT_MARKETPLACE),
                Some(&player),
            )
            .await?;
        ctx.logger.info(format!(
            "touring {} marketplaces in {system}",
            marketplaces.len()
        ));

        for marketplace in &marketplaces {
            ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &marketplace.symbol)
                .await?;
            observe_market(&deps, &ctx, &player, &marketplace.symbol).await?;
        }

        ctx.logger.info("scout tour complete");
        Ok(())
    })
    .await
}

/// Stationary market watcher: refreshes the market at the ship's current
/// waypoint on every iteration. Suited to probes parked on a marketplace.
pub async fn run_markets(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    system: SystemSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        while next_iteration(&ctx).await? {
            let current = ship::await_arrival(&deps, &ctx.cancel, &player, &ship_symbol).await?;
            if current.location.system_symbol() != system {
                ctx.logger.warn(format!(
                    "ship is in {}, not {system}; watching local market anyway",
                    current.location.system_symbol()
                ));
            }
            observe_market(&deps, &ctx, &player, &current.location).await?;
            sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(300)).await?;
        }
        Ok(())
    })
    .await
}
