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

use crate::model::{ShipSymbol, WaypointSymbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavStatus {
    Docked,
    InOrbit,
    InTransit,
}

impl Display for NavStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NavStatus::Docked => write!(f, "DOCKED"),
            NavStatus::InOrbit => write!(f, "IN_ORBIT"),
            NavStatus::InTransit => write!(f, "IN_TRANSIT"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    Drift,
    Stealth,
    Cruise,
    Burn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipFuel {
    pub current: u32,
    pub capacity: u32,
}

impl ShipFuel {
    pub fn fraction(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.current as f64 / self.capacity as f64
        }
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.capacity
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoItem {
    pub symbol: String,
    pub units: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipCargo {
    pub capacity: u32,
    pub units: u32,
    pub inventory: Vec<CargoItem>,
}

impl ShipCargo {
    pub fn is_full(&self) -> bool {
        self.units >= self.capacity
    }

    pub fn space_left(&self) -> u32 {
        self.capacity.saturating_sub(self.units)
    }

    pub fn units_of(&self, symbol: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|item| item.symbol == symbol)
            .map(|item| item.units)
            .sum()
    }
}

/// Lightweight ship snapshot; the authoritative copy lives behind the remote
/// API and this is only ever a recently observed view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipSnapshot {
    pub symbol: ShipSymbol,
    pub location: WaypointSymbol,
    pub nav_status: NavStatus,
    pub flight_mode: FlightMode,
    pub fuel: ShipFuel,
    pub cargo: ShipCargo,
    pub engine_speed: u32,
    /// Only set while `nav_status` is `InTransit`.
    pub arrival_at: Option<DateTime<Utc>>,
}

impl ShipSnapshot {
    pub fn is_in_transit(&self) -> bool {
        self.nav_status == NavStatus::InTransit
    }

    pub fn is_docked(&self) -> bool {
        self.nav_status == NavStatus::Docked
    }

    pub fn is_in_orbit(&self) -> bool {
        self.nav_status == NavStatus::InOrbit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn cargo_accounting() {
        let cargo = ShipCargo {
            capacity: 40,
            units: 30,
            inventory: vec![
                CargoItem {
                    symbol: "IRON_ORE".to_string(),
                    units: 20,
                },
                CargoItem {
                    symbol: "ICE_WATER".to_string(),
                    units: 10,
                },
            ],
        };
        assert!(!cargo.is_full());
        assert_eq!(cargo.space_left(), 10);
        assert_eq!(cargo.units_of("IRON_ORE"), 20);
        assert_eq!(cargo.units_of("GOLD"), 0);
    }

    #[test]
    fn fuel_fraction_handles_zero_capacity() {
        let fuel = ShipFuel {
            current: 0,
            capacity: 0,
        };
        assert_eq!(fuel.fraction(), 1.0);
        assert!(fuel.is_full());
    }
}
