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

use crate::common::{eventually, t0, TestRuntime, TestWorld};
use crate::Tracing;
use flotilla_common::model::container::{
    Container, ContainerStatus, ContainerType, StopOutcome,
};
use flotilla_common::model::{ContainerId, PlayerId, ShipSymbol};
use flotilla_daemon::repo::container::ContainerRecord;
use flotilla_daemon::supervisor::{ContainerSupervisor, SupervisorError};
use std::sync::Arc;
use std::time::Duration;
use test_r::{inherit_test_dep, test};

inherit_test_dep!(Tracing);

async fn status_of(supervisor: &Arc<ContainerSupervisor>, id: &ContainerId) -> ContainerStatus {
    supervisor.get(id).await.expect("container").status
}

#[test]
async fn runner_success_completes_the_container(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = PlayerId::new();

    let container = supervisor
        .register(
            ContainerType::Navigate,
            player,
            serde_json::json!({"behavior": "complete"}),
            -1,
        )
        .await
        .unwrap();
    assert_eq!(container.status, ContainerStatus::Pending);

    // the container's ship is released once the runner returns
    world
        .locks
        .acquire(&ShipSymbol("S1".to_string()), player, &container.id)
        .await
        .unwrap();

    supervisor.start(&container.id).await.unwrap();
    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Completed
    })
    .await;

    let finished = supervisor.get(&container.id).await.unwrap();
    assert_eq!(finished.started_at, Some(t0()));
    assert!(finished.stopped_at.is_some());

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
async fn runner_error_fails_the_container(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::Navigate,
            PlayerId::new(),
            serde_json::json!({"behavior": "fail"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();

    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Failed
    })
    .await;
    let failed = supervisor.get(&container.id).await.unwrap();
    assert!(failed.last_error.as_deref().unwrap_or("").contains("boom"));
    // NAVIGATE does not auto-restart
    assert_eq!(failed.restart_count, 0);
}

#[test]
async fn runner_panic_is_converted_to_failed(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::Navigate,
            PlayerId::new(),
            serde_json::json!({"behavior": "panic"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();

    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Failed
    })
    .await;
    let failed = supervisor.get(&container.id).await.unwrap();
    assert!(failed
        .last_error
        .as_deref()
        .unwrap_or("")
        .contains("panicked"));
}

#[test]
async fn auto_restart_retries_until_success(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::MiningWorker,
            PlayerId::new(),
            serde_json::json!({"behavior": "fail_then_complete", "fail_times": 2}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();

    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Completed
    })
    .await;
    let finished = supervisor.get(&container.id).await.unwrap();
    assert_eq!(finished.restart_count, 2);
    assert!(finished.last_error.is_none());
}

#[test]
async fn restart_budget_leaves_the_container_failed(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::MiningWorker,
            PlayerId::new(),
            serde_json::json!({"behavior": "fail"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();

    eventually(&world.clock, || async {
        let c = supervisor.get(&container.id).await.unwrap();
        c.status == ContainerStatus::Failed && c.restart_count == 3
    })
    .await;
    // stays FAILED: the budget is spent
    let exhausted = supervisor.get(&container.id).await.unwrap();
    assert!(!exhausted.can_restart());
}

#[test]
async fn graceful_stop_goes_through_stopping(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::Navigate,
            PlayerId::new(),
            serde_json::json!({"behavior": "run_until_cancelled"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();
    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Running
    })
    .await;

    let outcome = supervisor.stop(&container.id).await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopping);

    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Stopped
    })
    .await;
    assert!(supervisor.get(&container.id).await.unwrap().stopped_at.is_some());
}

#[test]
async fn pending_container_stops_directly(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::Navigate,
            PlayerId::new(),
            serde_json::json!({"behavior": "complete"}),
            -1,
        )
        .await
        .unwrap();

    let outcome = supervisor.stop(&container.id).await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopped);

    // a second stop is rejected by the state machine
    let second = supervisor.stop(&container.id).await;
    assert!(matches!(
        second,
        Err(SupervisorError::InvalidTransition(_))
    ));
}

#[test]
async fn iteration_budget_is_respected_and_persisted(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));

    let container = supervisor
        .register(
            ContainerType::Navigate,
            PlayerId::new(),
            serde_json::json!({"behavior": "iterate"}),
            3,
        )
        .await
        .unwrap();
    supervisor.start(&container.id).await.unwrap();

    eventually(&world.clock, || async {
        status_of(&supervisor, &container.id).await == ContainerStatus::Completed
    })
    .await;

    let row = world
        .container_repo
        .get(&container.id.0)
        .await
        .unwrap()
        .expect("row");
    assert_eq!(row.current_iteration, 3);
}

#[test]
async fn shutdown_force_fails_stragglers(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let supervisor = world.supervisor(TestRuntime::new(&world));
    let player = PlayerId::new();

    let polite = supervisor
        .register(
            ContainerType::Navigate,
            player,
            serde_json::json!({"behavior": "run_until_cancelled"}),
            -1,
        )
        .await
        .unwrap();
    let stubborn = supervisor
        .register(
            ContainerType::Navigate,
            player,
            serde_json::json!({"behavior": "hang"}),
            -1,
        )
        .await
        .unwrap();
    supervisor.start(&polite.id).await.unwrap();
    supervisor.start(&stubborn.id).await.unwrap();

    world
        .locks
        .acquire(&ShipSymbol("S1".to_string()), player, &polite.id)
        .await
        .unwrap();
    world
        .locks
        .acquire(&ShipSymbol("S2".to_string()), player, &stubborn.id)
        .await
        .unwrap();

    let shutdown = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.shutdown(Duration::from_secs(30)).await })
    };

    eventually(&world.clock, || async { shutdown.is_finished() }).await;

    assert_eq!(
        status_of(&supervisor, &polite.id).await,
        ContainerStatus::Stopped
    );
    let failed = supervisor.get(&stubborn.id).await.unwrap();
    assert_eq!(failed.status, ContainerStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("shutdown-timeout"));

    eventually(&world.clock, || async {
        world.locks.list_active().await.unwrap().is_empty()
    })
    .await;
}

#[test]
async fn startup_recovery_fails_orphans_and_resumes_resumable_types(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let player = PlayerId::new();

    // rows left over by a previous daemon run
    let mut orphaned = Container::new(
        ContainerId("navigate-old".to_string()),
        ContainerType::Navigate,
        player,
        serde_json::json!({"behavior": "complete"}),
        -1,
        t0(),
    );
    orphaned.start(t0()).unwrap();
    let mut resumable = Container::new(
        ContainerId("mining-worker-old".to_string()),
        ContainerType::MiningWorker,
        player,
        serde_json::json!({"behavior": "run_until_cancelled"}),
        -1,
        t0(),
    );
    resumable.start(t0()).unwrap();
    for c in [&orphaned, &resumable] {
        world
            .container_repo
            .insert(&ContainerRecord::from(c))
            .await
            .unwrap();
    }
    world
        .locks
        .acquire(&ShipSymbol("S1".to_string()), player, &orphaned.id)
        .await
        .unwrap();
    world
        .locks
        .acquire(&ShipSymbol("S2".to_string()), player, &resumable.id)
        .await
        .unwrap();
    // an assignment whose container row does not even exist
    world
        .locks
        .acquire(
            &ShipSymbol("S3".to_string()),
            player,
            &ContainerId("gone".to_string()),
        )
        .await
        .unwrap();

    let supervisor = world.supervisor(TestRuntime::new(&world));
    supervisor.recover_at_startup().await.unwrap();

    let failed = supervisor.get(&orphaned.id).await.unwrap();
    assert_eq!(failed.status, ContainerStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("orphaned-at-startup"));

    eventually(&world.clock, || async {
        status_of(&supervisor, &resumable.id).await == ContainerStatus::Running
    })
    .await;
    let resumed = supervisor.get(&resumable.id).await.unwrap();
    assert_eq!(resumed.restart_count, 1);

    // every stale assignment is gone, and the freed ship can be re-acquired
    assert!(world.locks.list_active().await.unwrap().is_empty());
    world
        .locks
        .acquire(
            &ShipSymbol("S1".to_string()),
            player,
            &ContainerId("navigate-new".to_string()),
        )
        .await
        .unwrap();
}
