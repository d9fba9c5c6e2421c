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

use crate::repo::mining::MiningOperationRecord;
use crate::supervisor::RunnerContext;
use crate::workflows::{
    cancellable, next_iteration, ship, sleep_cancellable, with_ship_lock, ContainerSpec,
    WorkflowDeps, WorkflowError,
};
use flotilla_common::model::waypoint::WaypointFilter;
use flotilla_common::model::{Player, ShipSymbol, SystemSymbol, WaypointSymbol};
use std::time::Duration;

const DEFAULT_EXTRACT_COOLDOWN: Duration = Duration::from_secs(70);

/// Picks an asteroid (unless one was given), registers one MINING_WORKER per
/// miner and watches the operation, persisting its state per pass.
pub async fn run_coordinator(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    system: SystemSymbol,
    asteroid: Option<WaypointSymbol>,
    miners: Vec<ShipSymbol>,
    transports: Vec<ShipSymbol>,
) -> Result<(), WorkflowError> {
    let asteroid = match asteroid {
        Some(asteroid) => asteroid,
        None => {
            let candidates = deps
                .waypoints
                .list_waypoints(
                    &system,
                    &WaypointFilter {
                        waypoint_type: Some("ENGINEERED_ASTEROID".to_string()),
                        ..WaypointFilter::default()
                    },
                    Some(&player),
                )
                .await?;
            let fallback = || async {
                deps.waypoints
                    .list_waypoints(
                        &system,
                        &WaypointFilter {
                            waypoint_type: Some("ASTEROID".to_string()),
                            ..WaypointFilter::default()
                        },
                        Some(&player),
                    )
                    .await
            };
            let candidates = if candidates.is_empty() {
                fallback().await?
            } else {
                candidates
            };
            candidates
                .first()
                .map(|w| w.symbol.clone())
                .ok_or_else(|| {
                    WorkflowError::InvalidMetadata(format!("no asteroid found in {system}"))
                })?
        }
    };
    ctx.logger
        .info(format!("mining operation targeting {asteroid}"));

    let mut children = Vec::new();
    for miner in &miners {
        let spec = ContainerSpec::MiningWorker {
            ship_symbol: miner.clone(),
            asteroid: asteroid.clone(),
            transports: transports.clone(),
        };
        let child = ctx
            .supervisor
            .register(spec.container_type(), player.id, spec.to_metadata(), -1)
            .await?;
        ctx.supervisor.start(&child.id).await?;
        children.push(child.id);
    }

    let operation_id = ctx.logger.container_id().0.clone();
    loop {
        sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(60)).await?;
        let mut alive = 0;
        for child in &children {
            if !ctx.supervisor.get(child).await?.status.is_terminal() {
                alive += 1;
            }
        }
        deps.mining
            .upsert(&MiningOperationRecord {
                id: operation_id.clone(),
                player_id: player.id.to_string(),
                system: system.0.clone(),
                data: serde_json::json!({
                    "asteroid": asteroid,
                    "miners": miners,
                    "transports": transports,
                    "workersAlive": alive,
                })
                .to_string(),
                updated_at: deps.clock.now(),
            })
            .await?;
        ctx.logger
            .debug(format!("{alive}/{} mining workers alive", children.len()));
    }
}

/// Extraction loop bound to one asteroid: extract, hand off or shed cargo
/// when full, honor the extraction cooldown.
pub async fn run_worker(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    asteroid: WaypointSymbol,
    transports: Vec<ShipSymbol>,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &asteroid).await?;

        while next_iteration(&ctx).await? {
            let current = ship::ensure_orbit(&deps, &ctx.cancel, &player, &ship_symbol).await?;

            if current.cargo.is_full() {
                shed_cargo(&deps, &ctx, &player, &ship_symbol, &transports).await?;
                continue;
            }

            let extraction = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .extract_resources(player.id, &player.token, &ship_symbol)
                    .await)
            })
            .await?;

            match extraction {
                Ok(result) => {
                    ctx.logger.info(format!(
                        "extracted {} {} ({}/{} cargo)",
                        result.extraction.extracted.units,
                        result.extraction.extracted.symbol,
                        result.cargo.units,
                        result.cargo.capacity
                    ));
                    let cooldown = result
                        .cooldown
                        .map(|c| Duration::from_secs(c.remaining_seconds as u64))
                        .unwrap_or(DEFAULT_EXTRACT_COOLDOWN);
                    sleep_cancellable(&ctx.cancel, &deps.clock, cooldown).await?;
                }
                Err(err) => {
                    ctx.logger.warn(format!("extraction failed: {err}"));
                    sleep_cancellable(&ctx.cancel, &deps.clock, DEFAULT_EXTRACT_COOLDOWN).await?;
                }
            }
        }
        ctx.logger.info("mining worker finished its iterations");
        Ok(())
    })
    .await
}

/// Full hold: transfer to a transport at the same waypoint, or jettison the
/// largest stack when no transport can take it.
async fn shed_cargo(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player: &Player,
    ship_symbol: &ShipSymbol,
    transports: &[ShipSymbol],
) -> Result<(), WorkflowError> {
    let current = ship::snapshot(deps, player, ship_symbol).await?;
    let Some(biggest) = current
        .cargo
        .inventory
        .iter()
        .max_by_key(|item| item.units)
        .cloned()
    else {
        return Ok(());
    };

    for transport in transports {
        let other = ship::snapshot(deps, player, transport).await?;
        if other.location == current.location && !other.cargo.is_full() {
            let units = biggest.units.min(other.cargo.space_left());
            let transferred = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .transfer_cargo(
                        player.id,
                        &player.token,
                        ship_symbol,
                        transport,
                        &biggest.symbol,
                        units,
                    )
                    .await)
            })
            .await?;
            if transferred.is_ok() {
                ctx.logger
                    .info(format!("transferred {units} {} to {transport}", biggest.symbol));
                return Ok(());
            }
        }
    }

    cancellable(&ctx.cancel, async {
        Ok(deps
            .api
            .jettison_cargo(
                player.id,
                &player.token,
                ship_symbol,
                &biggest.symbol,
                biggest.units,
            )
            .await?)
    })
    .await?;
    ctx.logger
        .warn(format!("jettisoned {} {}", biggest.units, biggest.symbol));
    Ok(())
}

/// Shuttles between a pickup and a delivery waypoint, selling whatever it is
/// carrying at the delivery market.
pub async fn run_transport(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
    pickup: WaypointSymbol,
    delivery: WaypointSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        while next_iteration(&ctx).await? {
            ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &pickup).await?;
            ship::ensure_orbit(&deps, &ctx.cancel, &player, &ship_symbol).await?;
            ctx.logger.info(format!("waiting for cargo at {pickup}"));
            sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(120)).await?;

            let loaded = ship::snapshot(&deps, &player, &ship_symbol).await?;
            if loaded.cargo.units == 0 {
                continue;
            }

            ship::navigate_leg(&deps, &ctx.cancel, &player, &ship_symbol, &delivery).await?;
            ship::ensure_docked(&deps, &ctx.cancel, &player, &ship_symbol).await?;
            for item in &loaded.cargo.inventory {
                let sold = cancellable(&ctx.cancel, async {
                    Ok(deps
                        .api
                        .sell_cargo(player.id, &player.token, &ship_symbol, &item.symbol, item.units)
                        .await)
                })
                .await?;
                match sold {
                    Ok(_) => ctx
                        .logger
                        .info(format!("sold {} {} at {delivery}", item.units, item.symbol)),
                    Err(err) => ctx
                        .logger
                        .warn(format!("could not sell {}: {err}", item.symbol)),
                }
            }
        }
        Ok(())
    })
    .await
}
