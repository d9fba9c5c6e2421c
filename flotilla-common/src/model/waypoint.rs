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

use crate::model::{SystemSymbol, WaypointSymbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const TRAIT_MARKETPLACE: &str = "MARKETPLACE";
pub const TRAIT_SHIPYARD: &str = "SHIPYARD";
pub const TYPE_FUEL_STATION: &str = "FUEL_STATION";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub symbol: WaypointSymbol,
    pub system: SystemSymbol,
    pub x: f64,
    pub y: f64,
    pub waypoint_type: String,
    pub traits: BTreeSet<String>,
    pub has_fuel: bool,
    pub synced_at: DateTime<Utc>,
}

impl Waypoint {
    /// Fuel can be bought wherever there is a marketplace, and at dedicated
    /// fuel stations.
    pub fn derive_has_fuel(waypoint_type: &str, traits: &BTreeSet<String>) -> bool {
        waypoint_type == TYPE_FUEL_STATION || traits.contains(TRAIT_MARKETPLACE)
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains(name)
    }

    pub fn distance_to(&self, other: &Waypoint) -> f64 {
        distance(self.x, self.y, other.x, other.y)
    }
}

pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    (dx * dx + dy * dy).sqrt()
}

/// Filters applied to cached waypoints after reading; they never influence
/// what is fetched from the remote API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaypointFilter {
    pub with_trait: Option<String>,
    pub exclude_trait: Option<String>,
    pub has_fuel: Option<bool>,
    pub waypoint_type: Option<String>,
}

impl WaypointFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn having_trait(name: &str) -> Self {
        Self {
            with_trait: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, waypoint: &Waypoint) -> bool {
        if let Some(required) = &self.with_trait {
            if !waypoint.has_trait(required) {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_trait {
            if waypoint.has_trait(excluded) {
                return false;
            }
        }
        if let Some(has_fuel) = self.has_fuel {
            if waypoint.has_fuel != has_fuel {
                return false;
            }
        }
        if let Some(waypoint_type) = &self.waypoint_type {
            if &waypoint.waypoint_type != waypoint_type {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    fn waypoint(symbol: &str, traits: &[&str], waypoint_type: &str) -> Waypoint {
        let traits: BTreeSet<String> = traits.iter().map(|t| t.to_string()).collect();
        Waypoint {
            symbol: WaypointSymbol(symbol.to_string()),
            system: SystemSymbol("X1-TEST".to_string()),
            x: 0.0,
            y: 0.0,
            waypoint_type: waypoint_type.to_string(),
            has_fuel: Waypoint::derive_has_fuel(waypoint_type, &traits),
            traits,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn fuel_is_derived_from_marketplace_trait_or_type() {
        assert!(waypoint("X1-TEST-A1", &[TRAIT_MARKETPLACE], "PLANET").has_fuel);
        assert!(waypoint("X1-TEST-A2", &[], TYPE_FUEL_STATION).has_fuel);
        assert!(!waypoint("X1-TEST-A3", &[TRAIT_SHIPYARD], "MOON").has_fuel);
    }

    #[test]
    fn filters_compose() {
        let w = waypoint("X1-TEST-B1", &[TRAIT_MARKETPLACE, TRAIT_SHIPYARD], "PLANET");

        assert!(WaypointFilter::none().matches(&w));
        assert!(WaypointFilter::having_trait(TRAIT_SHIPYARD).matches(&w));
        assert!(!WaypointFilter::having_trait("STRIPPED").matches(&w));
        assert!(!WaypointFilter {
            exclude_trait: Some(TRAIT_MARKETPLACE.to_string()),
            ..WaypointFilter::default()
        }
        .matches(&w));
        assert!(WaypointFilter {
            has_fuel: Some(true),
            waypoint_type: Some("PLANET".to_string()),
            ..WaypointFilter::default()
        }
        .matches(&w));
        assert!(!WaypointFilter {
            waypoint_type: Some("MOON".to_string()),
            ..WaypointFilter::default()
        }
        .matches(&w));
    }
}
