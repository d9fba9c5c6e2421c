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

use crate::common::{eventually, ship_json, TestWorld};
use crate::Tracing;
use bytes::Bytes;
use flotilla_common::model::container::ContainerStatus;
use flotilla_common::model::{ContainerId, PlayerId, ShipSymbol, WaypointSymbol};
use flotilla_daemon::rpc::dispatcher::Dispatcher;
use flotilla_daemon::rpc::protocol::{RpcErrorKind, RpcRequest, RpcResponse};
use flotilla_daemon::rpc::server::SocketServer;
use flotilla_daemon::supervisor::ContainerSupervisor;
use flotilla_daemon::workflows::registry::WorkflowRegistry;
use flotilla_daemon::workflows::{ContainerSpec, WorkflowDeps};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use test_r::{inherit_test_dep, test};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

inherit_test_dep!(Tracing);

fn wire_dispatcher(world: &TestWorld) -> (Arc<Dispatcher>, Arc<ContainerSupervisor>) {
    let deps = WorkflowDeps {
        clock: world.clock_arc(),
        api: world.api.clone(),
        players: world.players.clone(),
        waypoints: world.waypoints.clone(),
        graphs: world.graphs.clone(),
        locks: world.locks.clone(),
        markets: world.market_repo.clone(),
        contracts: world.contract_repo.clone(),
        mining: world.mining_repo.clone(),
        goods: world.goods_repo.clone(),
    };
    let supervisor = world.supervisor(Arc::new(WorkflowRegistry::new(deps)));
    let dispatcher = Arc::new(Dispatcher::new(
        world.clock_arc(),
        world.api.clone(),
        world.players.clone(),
        supervisor.clone(),
        world.logs.clone(),
    ));
    (dispatcher, supervisor)
}

#[test]
async fn validation_rejects_bad_requests_before_dispatch(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let (dispatcher, _) = wire_dispatcher(&world);

    let response = dispatcher
        .dispatch(RpcRequest::GetContainerLogs {
            container_id: ContainerId("navigate-1".to_string()),
            level: None,
            since: None,
            limit: 0,
            offset: 0,
        })
        .await;
    assert!(matches!(
        response,
        RpcResponse::Error {
            kind: RpcErrorKind::BadRequest,
            ..
        }
    ));

    let response = dispatcher
        .dispatch(RpcRequest::RegisterContainer {
            player_id: PlayerId::new(),
            spec: ContainerSpec::Dock {
                ship_symbol: ShipSymbol("  ".to_string()),
            },
            max_iterations: -1,
        })
        .await;
    assert!(matches!(
        response,
        RpcResponse::Error {
            kind: RpcErrorKind::BadRequest,
            ..
        }
    ));
    // nothing was registered
    match dispatcher
        .dispatch(RpcRequest::ListContainers {
            player_id: None,
            container_type: None,
            status: None,
        })
        .await
    {
        RpcResponse::Containers { containers } => assert!(containers.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
async fn player_registration_round_trip(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let (dispatcher, _) = wire_dispatcher(&world);

    world.transport.push_ok(serde_json::json!({
        "data": {
            "agent": { "symbol": "FLEET-2", "credits": 150_000 },
            "token": "fresh-token"
        }
    }));

    let player_id = match dispatcher
        .dispatch(RpcRequest::RegisterPlayer {
            agent_symbol: "FLEET-2".to_string(),
            faction: "COSMIC".to_string(),
        })
        .await
    {
        RpcResponse::Player { player } => {
            assert_eq!(player.agent_symbol, "FLEET-2");
            assert_eq!(player.credits, 150_000);
            player.id
        }
        other => panic!("unexpected response: {other:?}"),
    };

    match dispatcher
        .dispatch(RpcRequest::GetPlayer { player_id })
        .await
    {
        RpcResponse::Player { player } => assert_eq!(player.id, player_id),
        other => panic!("unexpected response: {other:?}"),
    }

    // registering the same agent again is a conflict
    let duplicate = dispatcher
        .dispatch(RpcRequest::RegisterPlayer {
            agent_symbol: "FLEET-2".to_string(),
            faction: "COSMIC".to_string(),
        })
        .await;
    assert!(matches!(
        duplicate,
        RpcResponse::Error {
            kind: RpcErrorKind::Conflict,
            ..
        }
    ));
}

#[test]
async fn unknown_container_is_not_found(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let (dispatcher, _) = wire_dispatcher(&world);

    let response = dispatcher
        .dispatch(RpcRequest::StopContainer {
            container_id: ContainerId("navigate-ghost".to_string()),
        })
        .await;
    assert!(matches!(
        response,
        RpcResponse::Error {
            kind: RpcErrorKind::NotFound,
            ..
        }
    ));
}

#[test]
async fn register_container_runs_the_workflow(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let (dispatcher, supervisor) = wire_dispatcher(&world);
    let player = world.seed_player().await;

    // the ship is already at the destination: the workflow is a no-op
    world
        .transport
        .push_ok(ship_json("FLEET-1", "X1-A-1", "DOCKED", None));

    let container_id = match dispatcher
        .dispatch(RpcRequest::RegisterContainer {
            player_id: player.id,
            spec: ContainerSpec::Navigate {
                ship_symbol: ShipSymbol("FLEET-1".to_string()),
                destination: WaypointSymbol("X1-A-1".to_string()),
            },
            max_iterations: -1,
        })
        .await
    {
        RpcResponse::Registered { container_id } => container_id,
        other => panic!("unexpected response: {other:?}"),
    };

    eventually(&world.clock, || async {
        supervisor.get(&container_id).await.unwrap().status == ContainerStatus::Completed
    })
    .await;

    // progress is observable through the log query
    eventually(&world.clock, || async {
        world
            .logs
            .query(&container_id, None, None, 100, 0)
            .await
            .unwrap()
            .iter()
            .any(|entry| entry.message.contains("nothing to do"))
    })
    .await;

    // the ship lock was taken and released again
    assert!(world
        .locks
        .find_active(&ShipSymbol("FLEET-1".to_string()))
        .await
        .unwrap()
        .is_none());
}

#[test]
async fn socket_round_trip_and_unlink(_tracing: &Tracing) {
    let world = TestWorld::new().await;
    let (dispatcher, _) = wire_dispatcher(&world);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.sock");
    let server = SocketServer::bind(&path, dispatcher).await.unwrap();
    assert!(path.exists());

    let cancel = CancellationToken::new();
    let server_task = tokio::spawn(server.run(cancel.clone()));

    let stream = UnixStream::connect(&path).await.unwrap();
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let request = serde_json::to_vec(&RpcRequest::Health).unwrap();
    framed.send(Bytes::from(request)).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let response: RpcResponse = serde_json::from_slice(&frame).unwrap();
    match response {
        RpcResponse::Health {
            version,
            active_containers,
            ..
        } => {
            assert!(!version.is_empty());
            assert_eq!(active_containers, 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    // malformed payloads answer with a BadRequest error frame
    framed.send(Bytes::from_static(b"not json")).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let response: RpcResponse = serde_json::from_slice(&frame).unwrap();
    assert!(matches!(
        response,
        RpcResponse::Error {
            kind: RpcErrorKind::BadRequest,
            ..
        }
    ));

    cancel.cancel();
    let _ = server_task.await;
    assert!(!path.exists());
}
