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

use crate::common::{t0, TestWorld};
use crate::Tracing;
use chrono::TimeDelta;
use flotilla_common::model::container::{Container, ContainerType};
use flotilla_common::model::{ContainerId, PlayerId};
use flotilla_daemon::db::RepoError;
use flotilla_daemon::repo::container::ContainerRecord;
use flotilla_daemon::repo::container_log::ContainerLogRecord;
use flotilla_daemon::repo::market::MarketRecord;
use flotilla_daemon::repo::waypoint::WaypointRecord;
use test_r::{inherit_test_dep, test};

inherit_test_dep!(Tracing);

fn waypoint_record(symbol: &str, system: &str, traits: &[&str]) -> WaypointRecord {
    WaypointRecord {
        symbol: symbol.to_string(),
        system: system.to_string(),
        x: 1.0,
        y: -2.0,
        waypoint_type: "PLANET".to_string(),
        traits: serde_json::to_string(&traits).unwrap(),
        has_fuel: traits.contains(&"MARKETPLACE"),
        synced_at: t0(),
    }
}

#[test]
async fn waypoint_upsert_is_idempotent(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let record = waypoint_record("X1-A-1", "X1-A", &["MARKETPLACE"]);

    world.waypoint_repo.upsert(&record).await.unwrap();
    world.waypoint_repo.upsert(&record).await.unwrap();

    let rows = world.waypoint_repo.list_by_system("X1-A").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "X1-A-1");
    assert!(rows[0].has_fuel);
}

#[test]
async fn waypoint_upsert_overwrites_traits(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    world
        .waypoint_repo
        .upsert(&waypoint_record("X1-A-1", "X1-A", &["MARKETPLACE", "SHIPYARD"]))
        .await
        .unwrap();
    // the remote stripped a trait; the upsert is authoritative, no merging
    world
        .waypoint_repo
        .upsert(&waypoint_record("X1-A-1", "X1-A", &["SHIPYARD"]))
        .await
        .unwrap();

    let rows = world.waypoint_repo.list_by_system("X1-A").await.unwrap();
    assert_eq!(rows[0].traits, "[\"SHIPYARD\"]");
    assert!(!rows[0].has_fuel);
}

#[test]
async fn waypoint_trait_query_filters(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    world
        .waypoint_repo
        .upsert(&waypoint_record("X1-A-1", "X1-A", &["MARKETPLACE"]))
        .await
        .unwrap();
    world
        .waypoint_repo
        .upsert(&waypoint_record("X1-A-2", "X1-A", &["SHIPYARD"]))
        .await
        .unwrap();
    world
        .waypoint_repo
        .upsert(&waypoint_record("X1-B-1", "X1-B", &["MARKETPLACE"]))
        .await
        .unwrap();

    let rows = world
        .waypoint_repo
        .list_by_system_with_trait("X1-A", "MARKETPLACE")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "X1-A-1");
}

#[test]
async fn container_row_round_trips(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let container = Container::new(
        ContainerId("navigate-roundtrip".to_string()),
        ContainerType::Navigate,
        PlayerId::new(),
        serde_json::json!({"kind": "navigate"}),
        5,
        t0(),
    );

    world
        .container_repo
        .insert(&ContainerRecord::from(&container))
        .await
        .unwrap();
    let loaded = world
        .container_repo
        .get("navigate-roundtrip")
        .await
        .unwrap()
        .expect("row");
    let parsed = Container::try_from(loaded).unwrap();
    assert_eq!(parsed, container);
}

#[test]
async fn container_list_filters_compose(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player_a = PlayerId::new();
    let player_b = PlayerId::new();

    let mut c1 = Container::new(
        ContainerId("navigate-1".to_string()),
        ContainerType::Navigate,
        player_a,
        serde_json::json!({}),
        -1,
        t0(),
    );
    c1.start(t0()).unwrap();
    let c2 = Container::new(
        ContainerId("dock-1".to_string()),
        ContainerType::Dock,
        player_a,
        serde_json::json!({}),
        -1,
        t0(),
    );
    let c3 = Container::new(
        ContainerId("navigate-2".to_string()),
        ContainerType::Navigate,
        player_b,
        serde_json::json!({}),
        -1,
        t0(),
    );
    for c in [&c1, &c2, &c3] {
        world
            .container_repo
            .insert(&ContainerRecord::from(c))
            .await
            .unwrap();
    }
    world
        .container_repo
        .update(&ContainerRecord::from(&c1))
        .await
        .unwrap();

    let all = world.container_repo.list(None, None, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let player_a_rows = world
        .container_repo
        .list(Some(&player_a.to_string()), None, None)
        .await
        .unwrap();
    assert_eq!(player_a_rows.len(), 2);

    let running_navigators = world
        .container_repo
        .list(None, Some("NAVIGATE"), Some("RUNNING"))
        .await
        .unwrap();
    assert_eq!(running_navigators.len(), 1);
    assert_eq!(running_navigators[0].id, "navigate-1");

    let running_by_type = world
        .container_repo
        .find_running_by_type(&player_a.to_string(), "NAVIGATE")
        .await
        .unwrap();
    assert_eq!(running_by_type.len(), 1);

    let non_terminal = world.container_repo.find_non_terminal().await.unwrap();
    assert_eq!(non_terminal.len(), 3);
}

#[test]
async fn active_assignment_is_unique_per_ship(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = PlayerId::new().to_string();

    world
        .assignment_repo
        .insert_active("FLEET-1", &player, "navigate-1", &t0())
        .await
        .unwrap();
    let duplicate = world
        .assignment_repo
        .insert_active("FLEET-1", &player, "navigate-2", &t0())
        .await;
    assert!(matches!(duplicate, Err(RepoError::UniqueViolation(_))));

    // releasing frees the slot for a new active row
    let released = world
        .assignment_repo
        .release("FLEET-1", "done", &t0())
        .await
        .unwrap();
    assert_eq!(released, 1);
    world
        .assignment_repo
        .insert_active("FLEET-1", &player, "navigate-2", &t0())
        .await
        .unwrap();

    let history = world.assignment_repo.find_by_ship("FLEET-1").await.unwrap();
    assert_eq!(history.len(), 2);
    let active = world
        .assignment_repo
        .find_active_by_ship("FLEET-1")
        .await
        .unwrap()
        .expect("active row");
    assert_eq!(active.container_id, "navigate-2");
}

#[test]
async fn release_assigned_before_only_hits_old_rows(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = PlayerId::new().to_string();
    let old = t0();
    let newer = t0() + TimeDelta::minutes(20);

    world
        .assignment_repo
        .insert_active("FLEET-1", &player, "c-1", &old)
        .await
        .unwrap();
    world
        .assignment_repo
        .insert_active("FLEET-2", &player, "c-2", &newer)
        .await
        .unwrap();

    let cutoff = t0() + TimeDelta::minutes(10);
    let released = world
        .assignment_repo
        .release_assigned_before(&cutoff, "stale", &(t0() + TimeDelta::minutes(40)))
        .await
        .unwrap();
    assert_eq!(released, 1);

    assert!(world
        .assignment_repo
        .find_active_by_ship("FLEET-1")
        .await
        .unwrap()
        .is_none());
    assert!(world
        .assignment_repo
        .find_active_by_ship("FLEET-2")
        .await
        .unwrap()
        .is_some());
}

#[test]
async fn container_log_query_supports_filters_and_paging(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = PlayerId::new().to_string();

    for i in 0..5 {
        world
            .log_repo
            .append(&ContainerLogRecord {
                container_id: "mining-1".to_string(),
                player_id: player.clone(),
                level: if i % 2 == 0 { "INFO" } else { "WARN" }.to_string(),
                message: format!("entry {i}"),
                timestamp: t0() + TimeDelta::seconds(i),
            })
            .await
            .unwrap();
    }

    let all = world
        .log_repo
        .query("mining-1", None, None, 100, 0)
        .await
        .unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].message, "entry 0");

    let warns = world
        .log_repo
        .query("mining-1", Some("WARN"), None, 100, 0)
        .await
        .unwrap();
    assert_eq!(warns.len(), 2);

    let since = t0() + TimeDelta::seconds(3);
    let recent = world
        .log_repo
        .query("mining-1", None, Some(&since), 100, 0)
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);

    let page = world
        .log_repo
        .query("mining-1", None, None, 2, 2)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].message, "entry 2");
}

#[test]
async fn market_upsert_keeps_latest_observation(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = PlayerId::new().to_string();

    for observed_at in [t0(), t0() + TimeDelta::minutes(5)] {
        world
            .market_repo
            .upsert(&MarketRecord {
                player_id: player.clone(),
                waypoint_symbol: "X1-A-1".to_string(),
                system: "X1-A".to_string(),
                data: format!("{{\"at\":\"{observed_at}\"}}"),
                observed_at,
            })
            .await
            .unwrap();
    }

    let row = world
        .market_repo
        .get(&player, "X1-A-1")
        .await
        .unwrap()
        .expect("market row");
    assert_eq!(row.observed_at, t0() + TimeDelta::minutes(5));

    let by_system = world
        .market_repo
        .list_by_system(&player, "X1-A")
        .await
        .unwrap();
    assert_eq!(by_system.len(), 1);
}
