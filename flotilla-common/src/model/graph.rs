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

use crate::model::waypoint::{distance, Waypoint};
use crate::model::{SystemSymbol, WaypointSymbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub symbol: WaypointSymbol,
    pub x: f64,
    pub y: f64,
    pub has_fuel: bool,
}

/// Undirected edge; stored once per unordered pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: WaypointSymbol,
    pub to: WaypointSymbol,
    pub weight: f64,
}

/// Complete navigation graph of a single system, weighted by Euclidean
/// distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemGraph {
    pub system: SystemSymbol,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub built_at: DateTime<Utc>,
}

impl SystemGraph {
    pub fn build(system: SystemSymbol, waypoints: &[Waypoint], built_at: DateTime<Utc>) -> Self {
        let nodes: Vec<GraphNode> = waypoints
            .iter()
            .map(|w| GraphNode {
                symbol: w.symbol.clone(),
                x: w.x,
                y: w.y,
                has_fuel: w.has_fuel,
            })
            .collect();

        let mut edges = Vec::with_capacity(nodes.len() * nodes.len().saturating_sub(1) / 2);
        for (i, a) in nodes.iter().enumerate() {
            for b in nodes.iter().skip(i + 1) {
                edges.push(GraphEdge {
                    from: a.symbol.clone(),
                    to: b.symbol.clone(),
                    weight: distance(a.x, a.y, b.x, b.y),
                });
            }
        }

        Self {
            system,
            nodes,
            edges,
            built_at,
        }
    }

    pub fn node(&self, symbol: &WaypointSymbol) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.symbol == symbol)
    }

    pub fn fuel_stations(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.has_fuel)
    }

    /// Shortest path from `from` to `to`, as the list of waypoints to visit
    /// after leaving `from` (so navigating to where you already are yields an
    /// empty route). When `max_leg` is given, edges longer than it are
    /// unusable and the path detours through closer nodes, typically fuel
    /// stations. Returns `None` when no path exists under the constraint.
    pub fn route(
        &self,
        from: &WaypointSymbol,
        to: &WaypointSymbol,
        max_leg: Option<f64>,
    ) -> Option<Vec<WaypointSymbol>> {
        if from == to {
            return Some(Vec::new());
        }
        self.node(from)?;
        self.node(to)?;

        let mut adjacency: HashMap<&WaypointSymbol, Vec<(&WaypointSymbol, f64)>> = HashMap::new();
        for edge in &self.edges {
            if let Some(max) = max_leg {
                if edge.weight > max {
                    continue;
                }
            }
            adjacency
                .entry(&edge.from)
                .or_default()
                .push((&edge.to, edge.weight));
            adjacency
                .entry(&edge.to)
                .or_default()
                .push((&edge.from, edge.weight));
        }

        struct Visit<'a> {
            cost: f64,
            symbol: &'a WaypointSymbol,
        }
        impl PartialEq for Visit<'_> {
            fn eq(&self, other: &Self) -> bool {
                self.cost == other.cost
            }
        }
        impl Eq for Visit<'_> {}
        impl PartialOrd for Visit<'_> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Visit<'_> {
            fn cmp(&self, other: &Self) -> Ordering {
                // min-heap on cost
                other
                    .cost
                    .partial_cmp(&self.cost)
                    .unwrap_or(Ordering::Equal)
            }
        }

        let mut best: HashMap<&WaypointSymbol, f64> = HashMap::new();
        let mut previous: HashMap<&WaypointSymbol, &WaypointSymbol> = HashMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(from, 0.0);
        heap.push(Visit {
            cost: 0.0,
            symbol: from,
        });

        while let Some(Visit { cost, symbol }) = heap.pop() {
            if symbol == to {
                let mut path = vec![to.clone()];
                let mut current = to;
                while let Some(prev) = previous.get(current) {
                    if *prev == from {
                        break;
                    }
                    path.push((*prev).clone());
                    current = prev;
                }
                path.reverse();
                return Some(path);
            }
            if cost > *best.get(symbol).unwrap_or(&f64::INFINITY) {
                continue;
            }
            for (neighbor, weight) in adjacency.get(symbol).into_iter().flatten() {
                let next_cost = cost + weight;
                if next_cost < *best.get(neighbor).unwrap_or(&f64::INFINITY) {
                    best.insert(neighbor, next_cost);
                    previous.insert(neighbor, symbol);
                    heap.push(Visit {
                        cost: next_cost,
                        symbol: neighbor,
                    });
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use test_r::test;

    fn waypoint(symbol: &str, x: f64, y: f64, has_fuel: bool) -> Waypoint {
        let traits: BTreeSet<String> = if has_fuel {
            [crate::model::waypoint::TRAIT_MARKETPLACE.to_string()].into()
        } else {
            BTreeSet::new()
        };
        Waypoint {
            symbol: WaypointSymbol(symbol.to_string()),
            system: SystemSymbol("X1-TEST".to_string()),
            x,
            y,
            waypoint_type: "PLANET".to_string(),
            has_fuel,
            traits,
            synced_at: Utc::now(),
        }
    }

    fn sym(s: &str) -> WaypointSymbol {
        WaypointSymbol(s.to_string())
    }

    fn test_graph() -> SystemGraph {
        SystemGraph::build(
            SystemSymbol("X1-TEST".to_string()),
            &[
                waypoint("X1-TEST-A", 0.0, 0.0, true),
                waypoint("X1-TEST-B", 10.0, 0.0, true),
                waypoint("X1-TEST-C", 20.0, 0.0, false),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn build_produces_complete_graph() {
        let graph = test_graph();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph
            .edges
            .iter()
            .any(|e| (e.weight - 20.0).abs() < f64::EPSILON));
        assert_eq!(graph.fuel_stations().count(), 2);
    }

    #[test]
    fn route_to_self_is_empty() {
        let graph = test_graph();
        let route = graph.route(&sym("X1-TEST-A"), &sym("X1-TEST-A"), None);
        assert_eq!(route, Some(Vec::new()));
    }

    #[test]
    fn unconstrained_route_is_direct() {
        let graph = test_graph();
        let route = graph.route(&sym("X1-TEST-A"), &sym("X1-TEST-C"), None);
        assert_eq!(route, Some(vec![sym("X1-TEST-C")]));
    }

    #[test]
    fn constrained_route_detours_through_reachable_hops() {
        let graph = test_graph();
        let route = graph.route(&sym("X1-TEST-A"), &sym("X1-TEST-C"), Some(12.0));
        assert_eq!(route, Some(vec![sym("X1-TEST-B"), sym("X1-TEST-C")]));
    }

    #[test]
    fn unreachable_under_constraint_is_none() {
        let graph = test_graph();
        let route = graph.route(&sym("X1-TEST-A"), &sym("X1-TEST-C"), Some(5.0));
        assert_eq!(route, None);
    }

    #[test]
    fn unknown_endpoints_are_none() {
        let graph = test_graph();
        assert_eq!(graph.route(&sym("X1-NOPE-Z"), &sym("X1-TEST-C"), None), None);
    }
}
