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

//! Ship-level building blocks shared by every workflow. All "wait for
//! eventual state" behavior funnels through `await_condition`; there are no
//! ad-hoc sleep-and-check loops in the workflow modules.

use crate::workflows::{cancellable, WorkflowDeps, WorkflowError};
use flotilla_common::eventual::{await_condition, PollSchedule};
use flotilla_common::model::ship::ShipSnapshot;
use flotilla_common::model::{Player, ShipSymbol, WaypointSymbol};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on any single nav-state wait; in-system transits are minutes,
/// so hitting this means the ship is stuck and the health monitor's problem.
const NAV_TIMEOUT: Duration = Duration::from_secs(30 * 60);

fn nav_schedule() -> PollSchedule {
    PollSchedule {
        initial: Duration::from_secs(1),
        multiplier: 2.0,
        max: Duration::from_secs(15),
    }
}

pub async fn snapshot(
    deps: &WorkflowDeps,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    let dto = deps
        .api
        .get_ship(player.id, &player.token, ship_symbol)
        .await?;
    Ok(dto.to_snapshot())
}

/// Waits until the ship is no longer in transit.
pub async fn await_arrival(
    deps: &WorkflowDeps,
    cancel: &CancellationToken,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    cancellable(cancel, async {
        await_condition(
            deps.clock.as_ref(),
            "transit arrival",
            NAV_TIMEOUT,
            &nav_schedule(),
            || snapshot(deps, player, ship_symbol),
            |ship| !ship.is_in_transit(),
        )
        .await
        .map_err(WorkflowError::from)
    })
    .await
}

/// Idempotent: a ship already in orbit is returned as-is; a ship in transit
/// is awaited first.
pub async fn ensure_orbit(
    deps: &WorkflowDeps,
    cancel: &CancellationToken,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    let ship = await_arrival(deps, cancel, player, ship_symbol).await?;
    if ship.is_in_orbit() {
        return Ok(ship);
    }
    cancellable(cancel, async {
        deps.api
            .orbit_ship(player.id, &player.token, ship_symbol)
            .await?;
        await_condition(
            deps.clock.as_ref(),
            "orbit",
            NAV_TIMEOUT,
            &nav_schedule(),
            || snapshot(deps, player, ship_symbol),
            |ship| ship.is_in_orbit(),
        )
        .await
        .map_err(WorkflowError::from)
    })
    .await
}

/// Idempotent: a docked ship is returned as-is.
pub async fn ensure_docked(
    deps: &WorkflowDeps,
    cancel: &CancellationToken,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    let ship = await_arrival(deps, cancel, player, ship_symbol).await?;
    if ship.is_docked() {
        return Ok(ship);
    }
    cancellable(cancel, async {
        deps.api
            .dock_ship(player.id, &player.token, ship_symbol)
            .await?;
        await_condition(
            deps.clock.as_ref(),
            "dock",
            NAV_TIMEOUT,
            &nav_schedule(),
            || snapshot(deps, player, ship_symbol),
            |ship| ship.is_docked(),
        )
        .await
        .map_err(WorkflowError::from)
    })
    .await
}

/// Docks and refuels; skipped when the tank is already full.
pub async fn refuel(
    deps: &WorkflowDeps,
    cancel: &CancellationToken,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    let ship = ensure_docked(deps, cancel, player, ship_symbol).await?;
    if ship.fuel.is_full() {
        return Ok(ship);
    }
    cancellable(cancel, async {
        deps.api
            .refuel_ship(player.id, &player.token, ship_symbol)
            .await?;
        Ok(())
    })
    .await?;
    snapshot(deps, player, ship_symbol).await
}

/// One navigation leg: orbit, issue the navigate call, wait out the transit.
pub async fn navigate_leg(
    deps: &WorkflowDeps,
    cancel: &CancellationToken,
    player: &Player,
    ship_symbol: &ShipSymbol,
    to: &WaypointSymbol,
) -> Result<ShipSnapshot, WorkflowError> {
    let ship = ensure_orbit(deps, cancel, player, ship_symbol).await?;
    if &ship.location == to {
        return Ok(ship);
    }
    cancellable(cancel, async {
        deps.api
            .navigate_ship(player.id, &player.token, ship_symbol, to)
            .await?;
        Ok(())
    })
    .await?;
    await_arrival(deps, cancel, player, ship_symbol).await
}
