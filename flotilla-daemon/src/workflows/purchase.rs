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
use crate::workflows::{cancellable, next_iteration, WorkflowDeps, WorkflowError};
use flotilla_common::model::{Player, WaypointSymbol};

/// Buys one ship at the given shipyard. No ship lock is taken: nothing is
/// driven, only purchased.
pub async fn run_purchase(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_type: String,
    shipyard: WaypointSymbol,
) -> Result<(), WorkflowError> {
    purchase_one(&deps, &ctx, &player, &ship_type, &shipyard).await
}

/// Buys up to `count` ships, one per iteration, stopping early when the
/// container's iteration budget says so.
pub async fn run_batch_purchase(
    deps: WorkflowDeps,
    ctx: RunnerContext,
    player: Player,
    ship_type: String,
    shipyard: WaypointSymbol,
    count: u32,
) -> Result<(), WorkflowError> {
    let mut bought = 0;
    while bought < count && next_iteration(&ctx).await? {
        purchase_one(&deps, &ctx, &player, &ship_type, &shipyard).await?;
        bought += 1;
    }
    ctx.logger
        .info(format!("batch purchase finished: {bought}/{count} ships"));
    Ok(())
}

async fn purchase_one(
    deps: &WorkflowDeps,
    ctx: &RunnerContext,
    player: &Player,
    ship_type: &str,
    shipyard: &WaypointSymbol,
) -> Result<(), WorkflowError> {
    // confirm the shipyard actually sells the type before spending credits
    let yard = cancellable(&ctx.cancel, async {
        Ok(deps
            .api
            .get_shipyard(player.id, &player.token, shipyard)
            .await?)
    })
    .await?;
    let sells_type = yard
        .rest
        .get("shipTypes")
        .and_then(|types| types.as_array())
        .map(|types| {
            types
                .iter()
                .filter_map(|t| t.get("type").and_then(|v| v.as_str()))
                .any(|t| t == ship_type)
        })
        .unwrap_or(true);
    if !sells_type {
        return Err(WorkflowError::InvalidMetadata(format!(
            "shipyard {shipyard} does not sell {ship_type}"
        )));
    }

    let purchased = cancellable(&ctx.cancel, async {
        Ok(deps
            .api
            .purchase_ship(player.id, &player.token, ship_type, shipyard)
            .await?)
    })
    .await?;

    deps.players
        .update_credits(&player.id.to_string(), purchased.agent.credits)
        .await?;
    ctx.logger.info(format!(
        "purchased {} ({}) for player {}, {} credits left",
        purchased.ship.symbol, ship_type, player.agent_symbol, purchased.agent.credits
    ));
    Ok(())
}
