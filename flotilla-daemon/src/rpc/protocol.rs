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

//! Framed request/response types of the local socket RPC. JSON payloads in
//! length-delimited frames; the socket is trusted-local, authentication is
//! the socket file's 0600 mode.

use crate::workflows::ContainerSpec;
use chrono::{DateTime, Utc};
use flotilla_common::model::container::{Container, ContainerStatus, ContainerType};
use flotilla_common::model::log::{ContainerLogEntry, LogLevel};
use flotilla_common::model::{ContainerId, Player, PlayerId};
use serde::{Deserialize, Serialize};

pub const UNBOUNDED_ITERATIONS: i64 = -1;

fn default_log_limit() -> i64 {
    100
}

fn default_max_iterations() -> i64 {
    UNBOUNDED_ITERATIONS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RpcRequest {
    Health,
    ListContainers {
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default)]
        container_type: Option<ContainerType>,
        #[serde(default)]
        status: Option<ContainerStatus>,
    },
    GetContainer {
        container_id: ContainerId,
    },
    StopContainer {
        container_id: ContainerId,
    },
    GetContainerLogs {
        container_id: ContainerId,
        #[serde(default)]
        level: Option<LogLevel>,
        #[serde(default)]
        since: Option<DateTime<Utc>>,
        #[serde(default = "default_log_limit")]
        limit: i64,
        #[serde(default)]
        offset: i64,
    },
    RegisterPlayer {
        agent_symbol: String,
        faction: String,
    },
    GetPlayer {
        player_id: PlayerId,
    },
    ListPlayers,
    RegisterContainer {
        player_id: PlayerId,
        spec: ContainerSpec,
        #[serde(default = "default_max_iterations")]
        max_iterations: i64,
    },
}

impl RpcRequest {
    pub fn op_name(&self) -> &'static str {
        match self {
            RpcRequest::Health => "health",
            RpcRequest::ListContainers { .. } => "list_containers",
            RpcRequest::GetContainer { .. } => "get_container",
            RpcRequest::StopContainer { .. } => "stop_container",
            RpcRequest::GetContainerLogs { .. } => "get_container_logs",
            RpcRequest::RegisterPlayer { .. } => "register_player",
            RpcRequest::GetPlayer { .. } => "get_player",
            RpcRequest::ListPlayers => "list_players",
            RpcRequest::RegisterContainer { .. } => "register_container",
        }
    }
}

/// Player without its bearer token; what goes over the socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub agent_symbol: String,
    pub credits: i64,
    pub last_active: DateTime<Utc>,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            agent_symbol: player.agent_symbol.clone(),
            credits: player.credits,
            last_active: player.last_active,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    NotFound,
    Conflict,
    InvalidTransition,
    BadRequest,
    Unavailable,
    Internal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RpcResponse {
    Health {
        version: String,
        uptime_seconds: u64,
        active_containers: usize,
    },
    Containers {
        containers: Vec<Container>,
    },
    Container {
        container: Container,
    },
    Logs {
        entries: Vec<ContainerLogEntry>,
    },
    Player {
        player: PlayerView,
    },
    Players {
        players: Vec<PlayerView>,
    },
    Registered {
        container_id: ContainerId,
    },
    Ok,
    Error {
        kind: RpcErrorKind,
        message: String,
    },
}

impl RpcResponse {
    pub fn error(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        RpcResponse::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RpcResponse::Error { .. })
    }
}
