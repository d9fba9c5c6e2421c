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

use crate::repo::contract::ContractRecord;
use crate::supervisor::RunnerContext;
use crate::workflows::{
    cancellable, next_iteration, ship, sleep_cancellable, with_ship_lock, ContainerSpec,
    WorkflowDeps, WorkflowError,
};
use flotilla_client::model::ContractDto;
use flotilla_common::model::{Player, ShipSymbol, WaypointSymbol};
use std::time::Duration;

/// How long the worker idles when it can make no progress on the current
/// contract (no goods to buy here, nothing to deliver).
const STALL_BACKOFF: Duration = Duration::from_secs(120);

struct DeliveryTerm {
    trade_symbol: String,
    destination: WaypointSymbol,
    units_required: i64,
    units_fulfilled: i64,
}

fn delivery_terms(contract: &ContractDto) -> Vec<DeliveryTerm> {
    contract
        .rest
        .get("terms")
        .and_then(|terms| terms.get("deliver"))
        .and_then(|deliver| deliver.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(DeliveryTerm {
                        trade_symbol: item.get("tradeSymbol")?.as_str()?.to_string(),
                        destination: WaypointSymbol(
                            item.get("destinationSymbol")?.as_str()?.to_string(),
                        ),
                        units_required: item.get("unitsRequired")?.as_i64()?,
                        units_fulfilled: item.get("unitsFulfilled").and_then(|v| v.as_i64())?,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn persist(
    deps: &WorkflowDeps,
    player: &Player,
    contract: &ContractDto,
) -> Result<(), WorkflowError> {
    deps.contracts
        .upsert(&ContractRecord {
            player_id: player.id.to_string(),
            id: contract.id.clone(),
            data: serde_json::to_string(&contract.rest).unwrap_or_default(),
            accepted: contract.accepted,
            fulfilled: contract.fulfilled,
            updated_at: deps.clock.now(),
        })
        .await?;
    Ok(())
}

/// Single-ship contract loop: hold a contract, procure what it asks for,
/// deliver, fulfill, repeat.
pub async fn run_workflow(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbol: ShipSymbol,
) -> Result<(), WorkflowError> {
    with_ship_lock(&deps, &ctx, player.id, &ship_symbol, || async {
        while next_iteration(&ctx).await? {
            work_one_contract(&deps, &ctx, &player, &ship_symbol).await?;
        }
        ctx.logger.info("contract workflow finished its iterations");
        Ok(())
    })
    .await
}

async fn work_one_contract(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player: &Player,
    ship_symbol: &ShipSymbol,
) -> Result<(), WorkflowError> {
    let contracts = cancellable(&ctx.cancel, async {
        Ok(deps.api.list_contracts(player.id, &player.token).await?)
    })
    .await?;

    let contract = match contracts.into_iter().find(|c| !c.fulfilled) {
        Some(contract) if contract.accepted => contract,
        Some(contract) => {
            let accepted = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .accept_contract(player.id, &player.token, &contract.id)
                    .await?
                    .contract)
            })
            .await?;
            ctx.logger.info(format!("accepted contract {}", accepted.id));
            accepted
        }
        None => {
            ship::ensure_docked(deps, &ctx.cancel, player, ship_symbol).await?;
            let negotiated = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .negotiate_contract(player.id, &player.token, ship_symbol)
                    .await?
                    .contract)
            })
            .await?;
            let accepted = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .accept_contract(player.id, &player.token, &negotiated.id)
                    .await?
                    .contract)
            })
            .await?;
            ctx.logger
                .info(format!("negotiated and accepted contract {}", accepted.id));
            accepted
        }
    };
    persist(deps, player, &contract).await?;

    let terms = delivery_terms(&contract);
    if terms.is_empty() {
        ctx.logger
            .warn(format!("contract {} has no delivery terms", contract.id));
        return sleep_cancellable(&ctx.cancel, &deps.clock, STALL_BACKOFF).await;
    }

    let mut outstanding = false;
    for term in terms {
        if term.units_fulfilled >= term.units_required {
            continue;
        }
        outstanding = true;

        let ship = ship::snapshot(deps, player, ship_symbol).await?;
        let on_board = ship.cargo.units_of(&term.trade_symbol) as i64;
        let missing = term.units_required - term.units_fulfilled;

        if on_board > 0 {
            ship::navigate_leg(deps, &ctx.cancel, player, ship_symbol, &term.destination).await?;
            ship::ensure_docked(deps, &ctx.cancel, player, ship_symbol).await?;
            let units = on_board.min(missing) as u32;
            let delivered = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .deliver_contract(
                        player.id,
                        &player.token,
                        &contract.id,
                        ship_symbol,
                        &term.trade_symbol,
                        units,
                    )
                    .await?)
            })
            .await?;
            ctx.logger.info(format!(
                "delivered {units} {} for contract {}",
                term.trade_symbol, contract.id
            ));
            persist(deps, player, &delivered.contract).await?;
        } else {
            // procure at the current waypoint if its market sells the good
            ship::ensure_docked(deps, &ctx.cancel, player, ship_symbol).await?;
            let want = (missing.min(ship.cargo.space_left() as i64)).max(0) as u32;
            if want == 0 {
                ctx.logger.warn("cargo hold is full of other goods");
                return sleep_cancellable(&ctx.cancel, &deps.clock, STALL_BACKOFF).await;
            }
            let purchase = cancellable(&ctx.cancel, async {
                Ok(deps
                    .api
                    .purchase_cargo(player.id, &player.token, ship_symbol, &term.trade_symbol, want)
                    .await)
            })
            .await?;
            match purchase {
                Ok(_) => ctx
                    .logger
                    .info(format!("bought {want} {}", term.trade_symbol)),
                Err(err) => {
                    ctx.logger.warn(format!(
                        "cannot procure {} here: {err}",
                        term.trade_symbol
                    ));
                    return sleep_cancellable(&ctx.cancel, &deps.clock, STALL_BACKOFF).await;
                }
            }
        }
    }

    if !outstanding {
        let fulfilled = cancellable(&ctx.cancel, async {
            Ok(deps
                .api
                .fulfill_contract(player.id, &player.token, &contract.id)
                .await?
                .contract)
        })
        .await?;
        ctx.logger.info(format!("fulfilled contract {}", contract.id));
        persist(deps, player, &fulfilled).await?;
    }
    Ok(())
}

/// Fans one CONTRACT_WORKFLOW container out per ship and watches over them.
pub async fn run_fleet_coordinator(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_symbols: Vec<ShipSymbol>,
) -> Result<(), WorkflowError> {
    let mut children = Vec::new();
    for ship_symbol in &ship_symbols {
        let spec = ContainerSpec::ContractWorkflow {
            ship_symbol: ship_symbol.clone(),
        };
        let child = ctx
            .supervisor
            .register(spec.container_type(), player.id, spec.to_metadata(), -1)
            .await?;
        ctx.supervisor.start(&child.id).await?;
        ctx.logger
            .info(format!("started contract worker {} for {ship_symbol}", child.id));
        children.push(child.id);
    }

    // supervise until cancelled; workers restart through the supervisor's
    // own restart policy
    loop {
        sleep_cancellable(&ctx.cancel, &deps.clock, Duration::from_secs(60)).await?;
        let mut running = 0;
        for child in &children {
            let container = ctx.supervisor.get(child).await?;
            if !container.status.is_terminal() {
                running += 1;
            }
        }
        ctx.logger.debug(format!(
            "{running}/{} contract workers alive",
            children.len()
        ));
    }
}
