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

//! The one-shot ship verbs: dock, orbit, refuel. All of them subsume the
//! wait-for-eventual-state pattern via the shared ship helpers, so a verb
//! issued against a ship in transit waits for arrival first.

use crate::supervisor::RunnerContext;
use crate::workflows::{ship, with_ship_lock, WorkflowDeps, WorkflowError};
use flotilla_common::model::{Player, ShipSymbol};

pub async fn run_dock(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        let ship = ship::ensure_docked(&deps, &ctx.cancel, &player, &ship_symbol).await?;
        ctx.logger.info(format!("docked at {}", ship.location));
        Ok(())
    })
    .await
}

pub async fn run_orbit(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        let ship = ship::ensure_orbit(&deps, &ctx.cancel, &player, &ship_symbol).await?;
        ctx.logger.info(format!("in orbit above {}", ship.location));
        Ok(())
    })
    .await
}

pub async fn run_refuel(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        let before = ship::snapshot(&deps, &player, &ship_symbol).await?;
        if before.fuel.is_full() {
            ctx.logger.info("tank already full, skipping refuel");
            return Ok(());
        }
        let after = ship::refuel(&deps, &ctx.cancel, &player, &ship_symbol).await?;
        ctx.logger.info(format!(
            "refueled {} -> {}/{}",
            before.fuel.current, after.fuel.current, after.fuel.capacity
        ));
        Ok(())
    })
    .await
}
