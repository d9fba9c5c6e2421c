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

use crate::common::{eventually, ship_json, t0, TestRuntime, TestWorld};
use crate::Tracing;
use flotilla_common::model::container::{ContainerStatus, ContainerType};
use flotilla_common::model::{ContainerId, Player, ShipSymbol};
use flotilla_daemon::config::HealthConfig;
use flotilla_daemon::services::health::HealthMonitor;
use flotilla_daemon::supervisor::ContainerSupervisor;
use std::sync::Arc;
use std::time::Duration;
use test_r::{inherit_test_dep, test};

inherit_test_dep!(Tracing);

fn monitor(
    world: &TestWorld,
    supervisor: &Arc<ContainerSupervisor>,
    config: HealthConfig,
) -> HealthMonitor {
    HealthMonitor::new(
        config,
        Duration::from_secs(1800),
        world.clock_arc(),
        world.api.clone(),
        world.players.clone(),
        world.locks.clone(),
        supervisor.clone(),
        world.logs.clone(),
    )
}

async fn running_container_with_ship(
    world: &TestWorld,
    supervisor: &Arc<ContainerSupervisor>,
    player: &Player,
    ship: &str,
) -> ContainerId {
    let container = supervisor
        .register(
            ContainerType::Navigate,
            player.id,
            serde_json::json!({"behavior": "run_until_cancelled"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();
    world
        .locks
        .acquire(&ShipSymbol(ship.to_string()), player.id, &container.id)
        .await
        .unwrap();
    container.id
}

#[test]
async fn overdue_transit_is_recovered_and_counter_clears(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = world.seed_player().await;
    let container_id = running_container_with_ship(&world, &supervisor, &player, "S1").await;

    // arrival was due at t0; two minutes later the ship still claims transit
    world.clock.advance(Duration::from_secs(120));
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_TRANSIT", Some(t0())));
    // recovery: the next poll sees it arrived, then it is docked
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_ORBIT", None));
    world.transport.push_ok(serde_json::json!({
        "data": { "nav": { "status": "DOCKED", "waypointSymbol": "X1-A-1", "flightMode": "CRUISE" } }
    }));

    let health = monitor(&world, &supervisor, HealthConfig::default());
    health.pass().await.unwrap();
    assert_eq!(world.transport.calls(), 3);

    eventually(&world.clock, || async {
        world
            .logs
            .query(&container_id, None, None, 100, 0)
            .await
            .unwrap()
            .iter()
            .any(|entry| entry.message.contains("recovered"))
    })
    .await;

    // next pass sees a healthy docked ship and does not touch it again
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "DOCKED", None));
    health.pass().await.unwrap();
    assert_eq!(world.transport.calls(), 4);

    // the assignment survived: recovery is not a release
    assert!(world
        .locks
        .find_active(&ShipSymbol("S1".to_string()))
        .await
        .unwrap()
        .is_some());
}

#[test]
async fn exhausted_recoveries_abandon_the_container(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = world.seed_player().await;
    let container_id = running_container_with_ship(&world, &supervisor, &player, "S1").await;

    let config = HealthConfig {
        max_recovery_attempts: 0,
        ..HealthConfig::default()
    };
    let health = monitor(&world, &supervisor, config);

    world.clock.advance(Duration::from_secs(120));
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_TRANSIT", Some(t0())));
    health.pass().await.unwrap();

    eventually(&world.clock, || async {
        supervisor.get(&container_id).await.unwrap().status == ContainerStatus::Failed
    })
    .await;
    let failed = supervisor.get(&container_id).await.unwrap();
    assert_eq!(failed.last_error.as_deref(), Some("health-abandoned"));

    eventually(&world.clock, || async {
        world
            .locks
            .find_active(&ShipSymbol("S1".to_string()))
            .await
            .unwrap()
            .is_none()
    })
    .await;
}

#[test]
async fn cooldown_spaces_out_recovery_attempts(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = world.seed_player().await;
    running_container_with_ship(&world, &supervisor, &player, "S1").await;

    let health = monitor(&world, &supervisor, HealthConfig::default());

    world.clock.advance(Duration::from_secs(120));
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_TRANSIT", Some(t0())));
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_ORBIT", None));
    world.transport.push_ok(serde_json::json!({
        "data": { "nav": { "status": "DOCKED", "waypointSymbol": "X1-A-1", "flightMode": "CRUISE" } }
    }));
    health.pass().await.unwrap();
    let after_first = world.transport.calls();

    // 30s later (inside the 60s cooldown) the ship is checked but no new
    // recovery is attempted, even though it still looks stuck
    world.clock.advance(Duration::from_secs(30));
    world
        .transport
        .push_ok(ship_json("S1", "X1-A-1", "IN_TRANSIT", Some(t0())));
    health.pass().await.unwrap();
    assert_eq!(world.transport.calls(), after_first + 1);
}

#[test]
async fn orphaned_assignments_are_swept_without_api_traffic(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = world.seed_player().await;

    world
        .locks
        .acquire(
            &ShipSymbol("S1".to_string()),
            player.id,
            &ContainerId("long-gone".to_string()),
        )
        .await
        .unwrap();

    let health = monitor(&world, &supervisor, HealthConfig::default());
    health.pass().await.unwrap();

    assert!(world
        .locks
        .find_active(&ShipSymbol("S1".to_string()))
        .await
        .unwrap()
        .is_none());
    assert_eq!(world.transport.calls(), 0);
}
