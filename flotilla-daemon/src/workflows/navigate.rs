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
use crate::workflows::{ship, with_ship_lock, WorkflowDeps, WorkflowError};
use flotilla_common::model::{Player, ShipSymbol, WaypointSymbol};

/// Drives a ship to a destination waypoint inside its system, hopping
/// through fuel stations when the tank cannot cover a direct leg.
pub async fn run(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    destination: WaypointSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        navigate(&deps, &ctx, &player, &ship_symbol, &destination).await
    })
    .await
}

async fn navigate(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player: &Player,
    ship_symbol: &ShipSymbol,
    destination: &WaypointSymbol,
) -> Result<(), WorkflowError> {
    let current = ship::await_arrival(deps, &ctx.cancel, player, ship_symbol).await?;
    if &current.location == destination {
        ctx.logger
            .info(format!("already at {destination}, nothing to do"));
        return Ok(());
    }

    let system = current.location.system_symbol();
    let graph = deps.graphs.get_graph(&system, false, Some(player)).await?;

    // a full tank bounds the distance of a single leg
    let max_leg = if current.fuel.capacity > 0 {
        Some(current.fuel.capacity as f64)
    } else {
        None
    };
    let route = graph
        .route(&current.location, destination, max_leg)
        .or_else(|| graph.route(&current.location, destination, None))
        .ok_or_else(|| WorkflowError::NoRoute {
            from: current.location.clone(),
            to: destination.clone(),
        })?;

    ctx.logger.info(format!(
        "routing {} -> {} in {} hops",
        current.location,
        destination,
        route.len()
    ));

    for hop in &route {
        let before = ship::snapshot(deps, player, ship_symbol).await?;
        let needs_fuel = before.fuel.fraction() < 0.5;
        if needs_fuel {
            if let Some(here) = graph.node(&before.location) {
                if here.has_fuel {
                    ctx.logger.info(format!("refueling at {}", before.location));
                    ship::refuel(deps, &ctx.cancel, player, ship_symbol).await?;
                }
            }
        }

        let arrived = ship::navigate_leg(deps, &ctx.cancel, player, ship_symbol, hop).await?;
        ctx.logger.info(format!(
            "arrived at {} (fuel {}/{})",
            arrived.location, arrived.fuel.current, arrived.fuel.capacity
        ));
    }

    ctx.logger.info(format!("navigation to {destination} complete"));
    Ok(())
}
