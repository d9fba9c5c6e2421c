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

use crate::metrics;
use crate::repo::player::{PlayerRecord, PlayerRepo};
use crate::rpc::protocol::{PlayerView, RpcErrorKind, RpcRequest, RpcResponse};
use crate::services::container_log::ContainerLogService;
use crate::services::ship_locks::LockError;
use crate::supervisor::{ContainerSupervisor, SupervisorError};
use chrono::{DateTime, Utc};
use flotilla_client::model::RegistrationRequest;
use flotilla_client::{ApiClient, ApiError};
use flotilla_common::clock::Clock;
use flotilla_common::model::{Player, PlayerId, PlayerToken};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Typed request router behind the socket server. Requests pass the logging
/// and validation middleware before reaching their handler; handlers that
/// start long-running work register a container and answer with its id.
pub struct Dispatcher {
    clock: Arc<dyn Clock>,
    api: Arc<ApiClient>,
    players: Arc<dyn PlayerRepo>,
    supervisor: Arc<ContainerSupervisor>,
    logs: Arc<ContainerLogService>,
    started_at: DateTime<Utc>,
}

impl Dispatcher {
    pub fn new(
        clock: Arc<dyn Clock>,
        api: Arc<ApiClient>,
        players: Arc<dyn PlayerRepo>,
        supervisor: Arc<ContainerSupervisor>,
        logs: Arc<ContainerLogService>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            api,
            players,
            supervisor,
            logs,
            started_at,
        }
    }

    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let op = request.op_name();
        let started = self.clock.now();

        let response = match validate(&request) {
            Err(message) => RpcResponse::error(RpcErrorKind::BadRequest, message),
            Ok(()) => self.handle(request).await,
        };

        let latency = (self.clock.now() - started)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let outcome = if response.is_error() { "error" } else { "ok" };
        metrics::record_rpc(op, outcome, latency);
        debug!(op, outcome, ?latency, "rpc handled");
        response
    }

    async fn handle(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::Health => self.health().await,
            RpcRequest::ListContainers {
                player_id,
                container_type,
                status,
            } => match self.supervisor.list(player_id, container_type, status).await {
                Ok(containers) => RpcResponse::Containers { containers },
                Err(err) => supervisor_error(err),
            },
            RpcRequest::GetContainer { container_id } => {
                match self.supervisor.get(&container_id).await {
                    Ok(container) => RpcResponse::Container { container },
                    Err(err) => supervisor_error(err),
                }
            }
            RpcRequest::StopContainer { container_id } => {
                match self.supervisor.stop(&container_id).await {
                    Ok(_) => RpcResponse::Ok,
                    Err(err) => supervisor_error(err),
                }
            }
            RpcRequest::GetContainerLogs {
                container_id,
                level,
                since,
                limit,
                offset,
            } => match self
                .logs
                .query(&container_id, level, since, limit, offset)
                .await
            {
                Ok(entries) => RpcResponse::Logs { entries },
                Err(err) => RpcResponse::error(RpcErrorKind::Internal, err.to_string()),
            },
            RpcRequest::RegisterPlayer {
                agent_symbol,
                faction,
            } => self.register_player(agent_symbol, faction).await,
            RpcRequest::GetPlayer { player_id } => match self.player(player_id).await {
                Ok(Some(player)) => RpcResponse::Player {
                    player: PlayerView::from(&player),
                },
                Ok(None) => RpcResponse::error(
                    RpcErrorKind::NotFound,
                    format!("player {player_id} not found"),
                ),
                Err(err) => RpcResponse::error(RpcErrorKind::Internal, err),
            },
            RpcRequest::ListPlayers => match self.players.list().await {
                Ok(records) => {
                    let players = records
                        .into_iter()
                        .filter_map(|record| Player::try_from(record).ok())
                        .map(|player| PlayerView::from(&player))
                        .collect();
                    RpcResponse::Players { players }
                }
                Err(err) => RpcResponse::error(RpcErrorKind::Internal, err.to_string()),
            },
            RpcRequest::RegisterContainer {
                player_id,
                spec,
                max_iterations,
            } => {
                let container = match self
                    .supervisor
                    .register(
                        spec.container_type(),
                        player_id,
                        spec.to_metadata(),
                        max_iterations,
                    )
                    .await
                {
                    Ok(container) => container,
                    Err(err) => return supervisor_error(err),
                };
                if let Err(err) = self.supervisor.start(&container.id).await {
                    return supervisor_error(err);
                }
                info!(container = %container.id, "container registered via rpc");
                RpcResponse::Registered {
                    container_id: container.id,
                }
            }
        }
    }

    async fn health(&self) -> RpcResponse {
        let active_containers = self.supervisor.active_count().await.unwrap_or(0);
        let uptime = (self.clock.now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        RpcResponse::Health {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
            active_containers,
        }
    }

    async fn player(&self, player_id: PlayerId) -> Result<Option<Player>, String> {
        let record = self
            .players
            .get(&player_id.to_string())
            .await
            .map_err(|err| err.to_string())?;
        record.map(Player::try_from).transpose()
    }

    async fn register_player(&self, agent_symbol: String, faction: String) -> RpcResponse {
        if let Ok(Some(existing)) = self.players.get_by_agent_symbol(&agent_symbol).await {
            return RpcResponse::error(
                RpcErrorKind::Conflict,
                format!("agent {} is already registered", existing.agent_symbol),
            );
        }

        let player_id = PlayerId::new();
        let registration = match self
            .api
            .register_agent(
                player_id,
                &RegistrationRequest {
                    symbol: agent_symbol.clone(),
                    faction,
                },
            )
            .await
        {
            Ok(registration) => registration,
            Err(err) => return api_error(err),
        };

        let player = Player {
            id: player_id,
            agent_symbol: registration.agent.symbol.clone(),
            token: PlayerToken(registration.token),
            credits: registration.agent.credits,
            metadata: serde_json::json!({}),
            last_active: self.clock.now(),
        };
        if let Err(err) = self.players.upsert(&PlayerRecord::from(&player)).await {
            return RpcResponse::error(RpcErrorKind::Internal, err.to_string());
        }

        info!(agent = %player.agent_symbol, player = %player.id, "player registered");
        RpcResponse::Player {
            player: PlayerView::from(&player),
        }
    }
}

/// Validation middleware: reject malformed requests before any handler
/// side effects.
fn validate(request: &RpcRequest) -> Result<(), String> {
    match request {
        RpcRequest::GetContainer { container_id }
        | RpcRequest::StopContainer { container_id }
        | RpcRequest::GetContainerLogs { container_id, .. }
            if container_id.0.trim().is_empty() =>
        {
            Err("container id must not be empty".to_string())
        }
        RpcRequest::GetContainerLogs { limit, offset, .. } => {
            if *limit <= 0 || *limit > 1000 {
                Err("limit must be between 1 and 1000".to_string())
            } else if *offset < 0 {
                Err("offset must not be negative".to_string())
            } else {
                Ok(())
            }
        }
        RpcRequest::RegisterPlayer {
            agent_symbol,
            faction,
        } => {
            if agent_symbol.trim().is_empty() {
                Err("agent symbol must not be empty".to_string())
            } else if faction.trim().is_empty() {
                Err("faction must not be empty".to_string())
            } else {
                Ok(())
            }
        }
        RpcRequest::RegisterContainer {
            spec,
            max_iterations,
            ..
        } => {
            if *max_iterations < -1 {
                return Err("max iterations must be -1 (unbounded) or non-negative".to_string());
            }
            spec.validate()
        }
        _ => Ok(()),
    }
}

fn supervisor_error(err: SupervisorError) -> RpcResponse {
    let kind = match &err {
        SupervisorError::NotFound(_) => RpcErrorKind::NotFound,
        SupervisorError::InvalidTransition(_) => RpcErrorKind::InvalidTransition,
        SupervisorError::Lock(LockError::AlreadyAssigned(_)) => RpcErrorKind::Conflict,
        SupervisorError::Runner(_) => RpcErrorKind::BadRequest,
        _ => RpcErrorKind::Internal,
    };
    RpcResponse::error(kind, err.to_string())
}

fn api_error(err: ApiError) -> RpcResponse {
    let kind = match &err {
        ApiError::NotFound(_) => RpcErrorKind::NotFound,
        ApiError::Conflict(_) => RpcErrorKind::Conflict,
        ApiError::BadRequest(_) | ApiError::Decode(_) => RpcErrorKind::BadRequest,
        ApiError::RateLimited(_) | ApiError::OpenCircuit(_) => RpcErrorKind::Unavailable,
        _ => RpcErrorKind::Internal,
    };
    RpcResponse::error(kind, err.to_string())
}
