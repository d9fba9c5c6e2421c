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

use crate::model::{ContainerId, PlayerId, ShipSymbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of ship-assignment history. While `released_at` is null the
/// assignment is active and the ship is exclusively owned by the container;
/// once released the row is immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipAssignment {
    pub ship_symbol: ShipSymbol,
    pub player_id: PlayerId,
    pub container_id: ContainerId,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub release_reason: Option<String>,
}

impl ShipAssignment {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}
