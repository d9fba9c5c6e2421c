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

use crate::common::{waypoints_page_json, TestWorld};
use crate::Tracing;
use flotilla_common::clock::Clock;
use flotilla_common::model::waypoint::{WaypointFilter, TRAIT_MARKETPLACE};
use flotilla_common::model::SystemSymbol;
use std::time::Duration;
use test_r::{inherit_test_dep, test};

inherit_test_dep!(Tracing);

fn system() -> SystemSymbol {
    SystemSymbol("X1-A".to_string())
}

#[test]
async fn empty_cache_refills_from_the_api(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[
            ("X1-A-1", 0.0, 0.0, true),
            ("X1-A-2", 10.0, 0.0, false),
            ("X1-A-3", 0.0, 10.0, true),
        ],
    ));

    let waypoints = world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();
    assert_eq!(waypoints.len(), 3);
    assert_eq!(world.transport.calls(), 1);

    // the rows were persisted with the current sync time
    let rows = world.waypoint_repo.list_by_system("X1-A").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.synced_at == world.clock.now()));
}

#[test]
async fn fresh_cache_is_served_without_api_calls(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true)],
    ));

    world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();

    // one hour later the records are still inside the 2h TTL
    world.clock.advance(Duration::from_secs(3600));
    let cached = world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(world.transport.calls(), 1);
}

#[test]
async fn stale_cache_triggers_another_refill(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true)],
    ));
    world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();

    world.clock.advance(Duration::from_secs(7201));
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true), ("X1-A-2", 5.0, 5.0, false)],
    ));
    let refreshed = world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();
    assert_eq!(refreshed.len(), 2);
    assert_eq!(world.transport.calls(), 2);
}

#[test]
async fn no_refill_possible_serves_what_is_cached(_tracing: &Tracing) {
    let world = TestWorld::new().await;

    // nothing cached, no player: empty result and no API traffic
    let empty = world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), None)
        .await
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(world.transport.calls(), 0);

    // stale rows without a player are still served
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true)],
    ));
    world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), Some(&player))
        .await
        .unwrap();
    world.clock.advance(Duration::from_secs(8000));

    let stale = world
        .waypoints
        .list_waypoints(&system(), &WaypointFilter::none(), None)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(world.transport.calls(), 1);
}

#[test]
async fn filters_apply_after_reading(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[
            ("X1-A-1", 0.0, 0.0, true),
            ("X1-A-2", 10.0, 0.0, false),
        ],
    ));

    let marketplaces = world
        .waypoints
        .list_waypoints(
            &system(),
            &WaypointFilter::having_trait(TRAIT_MARKETPLACE),
            Some(&player),
        )
        .await
        .unwrap();
    assert_eq!(marketplaces.len(), 1);
    assert_eq!(marketplaces[0].symbol.0, "X1-A-1");

    // the filtered read still cached the full set
    let rows = world.waypoint_repo.list_by_system("X1-A").await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
async fn graph_builds_through_the_waypoint_cache(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[
            ("X1-A-1", 0.0, 0.0, true),
            ("X1-A-2", 10.0, 0.0, false),
            ("X1-A-3", 0.0, 10.0, false),
        ],
    ));

    let graph = world
        .graphs
        .get_graph(&system(), false, Some(&player))
        .await
        .unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 3);
    assert_eq!(graph.fuel_stations().count(), 1);

    // the build refilled the waypoint rows too; the two caches agree
    let rows = world.waypoint_repo.list_by_system("X1-A").await.unwrap();
    assert_eq!(rows.len(), 3);

    // a second read is served from the persisted row without API traffic
    let cached = world
        .graphs
        .get_graph(&system(), false, None)
        .await
        .unwrap();
    assert_eq!(cached.nodes.len(), 3);
    assert_eq!(world.transport.calls(), 1);
}

#[test]
async fn force_refresh_rebuilds_the_graph(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = world.seed_player().await;
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true)],
    ));
    world
        .graphs
        .get_graph(&system(), false, Some(&player))
        .await
        .unwrap();

    // force refresh with a stale waypoint cache hits the API again
    world.clock.advance(Duration::from_secs(7300));
    world.transport.push_ok(waypoints_page_json(
        "X1-A",
        &[("X1-A-1", 0.0, 0.0, true), ("X1-A-2", 3.0, 4.0, false)],
    ));
    let rebuilt = world
        .graphs
        .get_graph(&system(), true, Some(&player))
        .await
        .unwrap();
    assert_eq!(rebuilt.nodes.len(), 2);
    assert_eq!(world.transport.calls(), 2);
}
