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

//! Wire DTOs of the remote universe API. The remote schema is camelCase
//! JSON with a `data` envelope; conversions into the domain model live next
//! to each DTO.

use chrono::{DateTime, Utc};
use flotilla_common::model::ship::{
    CargoItem, FlightMode, NavStatus, ShipCargo, ShipFuel, ShipSnapshot,
};
use flotilla_common::model::waypoint::Waypoint;
use flotilla_common::model::{ShipSymbol, SystemSymbol, WaypointSymbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Deserialize)]
pub struct PageMeta {
    pub total: u32,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub symbol: String,
    pub faction: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub agent: AgentDto,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDto {
    pub symbol: String,
    pub credits: i64,
    #[serde(default)]
    pub headquarters: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipNavRouteDto {
    pub arrival: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipNavDto {
    pub status: NavStatus,
    pub waypoint_symbol: String,
    pub flight_mode: FlightMode,
    #[serde(default)]
    pub route: Option<ShipNavRouteDto>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipFuelDto {
    pub current: u32,
    pub capacity: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CargoItemDto {
    pub symbol: String,
    pub units: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipCargoDto {
    pub capacity: u32,
    pub units: u32,
    #[serde(default)]
    pub inventory: Vec<CargoItemDto>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipEngineDto {
    pub speed: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipDto {
    pub symbol: String,
    pub nav: ShipNavDto,
    pub fuel: ShipFuelDto,
    pub cargo: ShipCargoDto,
    pub engine: ShipEngineDto,
}

impl ShipDto {
    pub fn to_snapshot(&self) -> ShipSnapshot {
        ShipSnapshot {
            symbol: ShipSymbol(self.symbol.clone()),
            location: WaypointSymbol(self.nav.waypoint_symbol.clone()),
            nav_status: self.nav.status,
            flight_mode: self.nav.flight_mode,
            fuel: ShipFuel {
                current: self.fuel.current,
                capacity: self.fuel.capacity,
            },
            cargo: ShipCargo {
                capacity: self.cargo.capacity,
                units: self.cargo.units,
                inventory: self
                    .cargo
                    .inventory
                    .iter()
                    .map(|item| CargoItem {
                        symbol: item.symbol.clone(),
                        units: item.units,
                    })
                    .collect(),
            },
            engine_speed: self.engine.speed,
            arrival_at: if self.nav.status == NavStatus::InTransit {
                self.nav.route.as_ref().map(|route| route.arrival)
            } else {
                None
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointTraitDto {
    pub symbol: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointDto {
    pub symbol: String,
    pub system_symbol: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub waypoint_type: String,
    #[serde(default)]
    pub traits: Vec<WaypointTraitDto>,
}

impl WaypointDto {
    pub fn to_waypoint(&self, synced_at: DateTime<Utc>) -> Waypoint {
        let traits: BTreeSet<String> = self.traits.iter().map(|t| t.symbol.clone()).collect();
        Waypoint {
            symbol: WaypointSymbol(self.symbol.clone()),
            system: SystemSymbol(self.system_symbol.clone()),
            x: self.x,
            y: self.y,
            has_fuel: Waypoint::derive_has_fuel(&self.waypoint_type, &traits),
            waypoint_type: self.waypoint_type.clone(),
            traits,
            synced_at,
        }
    }
}

/// Market and shipyard payloads are opaque to the daemon; only the waypoint
/// symbol is lifted out, the rest is stored as-is.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDto {
    pub symbol: String,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipyardDto {
    pub symbol: String,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDto {
    pub id: String,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub fulfilled: bool,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResultDto {
    pub nav: ShipNavDto,
    pub fuel: ShipFuelDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavResultDto {
    pub nav: ShipNavDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefuelResultDto {
    pub fuel: ShipFuelDto,
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionYieldDto {
    pub symbol: String,
    pub units: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDto {
    #[serde(rename = "yield")]
    pub extracted: ExtractionYieldDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownDto {
    pub total_seconds: u32,
    pub remaining_seconds: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResultDto {
    pub extraction: ExtractionDto,
    pub cargo: ShipCargoDto,
    #[serde(default)]
    pub cooldown: Option<CooldownDto>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResultDto {
    pub cargo: ShipCargoDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResultDto {
    pub cargo: ShipCargoDto,
    #[serde(default)]
    pub agent: Option<AgentDto>,
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseShipResultDto {
    pub ship: ShipDto,
    pub agent: AgentDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverResultDto {
    pub contract: ContractDto,
    pub cargo: ShipCargoDto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn ship_dto_decodes_and_converts() {
        let json = serde_json::json!({
            "symbol": "FLEET-1",
            "nav": {
                "status": "IN_TRANSIT",
                "waypointSymbol": "X1-AB12-C34",
                "flightMode": "CRUISE",
                "route": { "arrival": "2024-01-01T00:10:00Z" }
            },
            "fuel": { "current": 300, "capacity": 400 },
            "cargo": {
                "capacity": 40,
                "units": 5,
                "inventory": [ { "symbol": "IRON_ORE", "units": 5 } ]
            },
            "engine": { "speed": 30 }
        });
        let dto: ShipDto = serde_json::from_value(json).unwrap();
        let snapshot = dto.to_snapshot();
        assert_eq!(snapshot.symbol, ShipSymbol("FLEET-1".to_string()));
        assert_eq!(snapshot.nav_status, NavStatus::InTransit);
        assert!(snapshot.arrival_at.is_some());
        assert_eq!(snapshot.cargo.units_of("IRON_ORE"), 5);
    }

    #[test]
    fn docked_ship_has_no_arrival() {
        let json = serde_json::json!({
            "symbol": "FLEET-1",
            "nav": {
                "status": "DOCKED",
                "waypointSymbol": "X1-AB12-C34",
                "flightMode": "CRUISE",
                "route": { "arrival": "2024-01-01T00:10:00Z" }
            },
            "fuel": { "current": 300, "capacity": 400 },
            "cargo": { "capacity": 40, "units": 0, "inventory": [] },
            "engine": { "speed": 30 }
        });
        let dto: ShipDto = serde_json::from_value(json).unwrap();
        assert_eq!(dto.to_snapshot().arrival_at, None);
    }

    #[test]
    fn waypoint_dto_derives_fuel_from_traits() {
        let json = serde_json::json!({
            "symbol": "X1-AB12-C34",
            "systemSymbol": "X1-AB12",
            "x": 12.0,
            "y": -7.0,
            "type": "PLANET",
            "traits": [ { "symbol": "MARKETPLACE" } ]
        });
        let dto: WaypointDto = serde_json::from_value(json).unwrap();
        let waypoint = dto.to_waypoint(Utc::now());
        assert!(waypoint.has_fuel);
        assert_eq!(waypoint.system, SystemSymbol("X1-AB12".to_string()));
    }
}
