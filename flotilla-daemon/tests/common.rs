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

//! Shared fixtures: a sqlite-backed service world with a controllable clock
//! and a scripted API transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flotilla_client::circuit::CircuitBreakerConfig;
use flotilla_client::error::TransportError;
use flotilla_client::transport::{ApiRequest, ApiTransport};
use flotilla_client::{ApiClient, ApiClientConfig};
use flotilla_common::clock::{Clock, TestClock};
use flotilla_common::config::DbSqliteConfig;
use flotilla_common::model::{Player, PlayerId, PlayerToken};
use flotilla_common::retries::RetryConfig;
use flotilla_daemon::bootstrap::migrate_sqlite;
use flotilla_daemon::db::sqlite::SqlitePool;
use flotilla_daemon::repo::container::{ContainerRepo, DbContainerRepo};
use flotilla_daemon::repo::container_log::{ContainerLogRepo, DbContainerLogRepo};
use flotilla_daemon::repo::contract::{ContractRepo, DbContractRepo};
use flotilla_daemon::repo::goods_factory::{DbGoodsFactoryRepo, GoodsFactoryRepo};
use flotilla_daemon::repo::market::{DbMarketRepo, MarketRepo};
use flotilla_daemon::repo::mining::{DbMiningRepo, MiningRepo};
use flotilla_daemon::repo::player::{DbPlayerRepo, PlayerRecord, PlayerRepo};
use flotilla_daemon::repo::ship_assignment::{DbShipAssignmentRepo, ShipAssignmentRepo};
use flotilla_daemon::repo::system_graph::{DbSystemGraphRepo, SystemGraphRepo};
use flotilla_daemon::repo::waypoint::{DbWaypointRepo, WaypointRepo};
use flotilla_daemon::services::container_log::ContainerLogService;
use flotilla_daemon::services::ship_locks::{ShipLockService, ShipLockServiceDefault};
use flotilla_daemon::services::system_graph::{SystemGraphCache, SystemGraphCacheDefault};
use flotilla_daemon::services::waypoint_cache::{WaypointCache, WaypointCacheDefault};
use flotilla_common::model::container::{Container, ContainerType};
use flotilla_daemon::supervisor::{ContainerRuntime, ContainerSupervisor, RunnerContext, RunnerFuture};
use flotilla_daemon::workflows::WorkflowError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<serde_json::Value, TransportError>>>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn push_ok(&self, value: serde_json::Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(&self, _request: ApiRequest) -> Result<serde_json::Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::from(
                    flotilla_client::ApiError::Network("script exhausted".to_string()),
                ))
            })
    }
}

/// A full sqlite-backed substrate with virtual time and a scripted remote.
pub struct TestWorld {
    pub clock: TestClock,
    pub transport: Arc<ScriptedTransport>,
    pub api: Arc<ApiClient>,
    pub pool: SqlitePool,
    pub players: Arc<dyn PlayerRepo>,
    pub waypoint_repo: Arc<dyn WaypointRepo>,
    pub graph_repo: Arc<dyn SystemGraphRepo>,
    pub container_repo: Arc<dyn ContainerRepo>,
    pub log_repo: Arc<dyn ContainerLogRepo>,
    pub assignment_repo: Arc<dyn ShipAssignmentRepo>,
    pub market_repo: Arc<dyn MarketRepo>,
    pub contract_repo: Arc<dyn ContractRepo>,
    pub mining_repo: Arc<dyn MiningRepo>,
    pub goods_repo: Arc<dyn GoodsFactoryRepo>,
    pub locks: Arc<dyn ShipLockService>,
    pub logs: Arc<ContainerLogService>,
    pub waypoints: Arc<dyn WaypointCache>,
    pub graphs: Arc<dyn SystemGraphCache>,
    _tempdir: TempDir,
}

impl TestWorld {
    pub async fn new() -> TestWorld {
        let clock = TestClock::new(t0());
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());

        let tempdir = tempfile::tempdir().expect("tempdir");
        let db_path = tempdir.path().join("world.db");
        let pool = SqlitePool::configured(
            &DbSqliteConfig {
                database: db_path.to_str().expect("utf8 path").to_string(),
                max_connections: 5,
                // far beyond anything virtual time advances to in a test,
                // so a deadline never fires under an in-flight query
                query_timeout: Duration::from_secs(7 * 24 * 3600),
            },
            clock_arc.clone(),
        )
        .await
        .expect("sqlite pool");
        migrate_sqlite(&pool).await.expect("migrations");

        let transport = ScriptedTransport::new();
        let api_config = ApiClientConfig {
            rate_limit: 10_000.0,
            burst: 10_000,
            retries: RetryConfig {
                max_attempts: 0,
                jitter: 0.0,
                ..RetryConfig::default()
            },
            circuit: CircuitBreakerConfig {
                threshold: 1_000,
                cooldown: Duration::from_secs(60),
            },
            ..ApiClientConfig::default()
        };
        let api = Arc::new(ApiClient::with_transport(
            transport.clone(),
            &api_config,
            clock_arc.clone(),
        ));

        let players: Arc<dyn PlayerRepo> = Arc::new(DbPlayerRepo::new(pool.clone()));
        let waypoint_repo: Arc<dyn WaypointRepo> = Arc::new(DbWaypointRepo::new(pool.clone()));
        let graph_repo: Arc<dyn SystemGraphRepo> = Arc::new(DbSystemGraphRepo::new(pool.clone()));
        let container_repo: Arc<dyn ContainerRepo> = Arc::new(DbContainerRepo::new(pool.clone()));
        let log_repo: Arc<dyn ContainerLogRepo> = Arc::new(DbContainerLogRepo::new(pool.clone()));
        let assignment_repo: Arc<dyn ShipAssignmentRepo> =
            Arc::new(DbShipAssignmentRepo::new(pool.clone()));
        let market_repo: Arc<dyn MarketRepo> = Arc::new(DbMarketRepo::new(pool.clone()));
        let contract_repo: Arc<dyn ContractRepo> = Arc::new(DbContractRepo::new(pool.clone()));
        let mining_repo: Arc<dyn MiningRepo> = Arc::new(DbMiningRepo::new(pool.clone()));
        let goods_repo: Arc<dyn GoodsFactoryRepo> =
            Arc::new(DbGoodsFactoryRepo::new(pool.clone()));

        let locks: Arc<dyn ShipLockService> = Arc::new(ShipLockServiceDefault::new(
            assignment_repo.clone(),
            clock_arc.clone(),
        ));
        let logs = ContainerLogService::start(log_repo.clone(), clock_arc.clone());
        let waypoints: Arc<dyn WaypointCache> = Arc::new(WaypointCacheDefault::new(
            waypoint_repo.clone(),
            api.clone(),
            clock_arc.clone(),
            Duration::from_secs(7200),
        ));
        let graphs: Arc<dyn SystemGraphCache> = Arc::new(SystemGraphCacheDefault::new(
            graph_repo.clone(),
            waypoints.clone(),
            clock_arc.clone(),
        ));

        TestWorld {
            clock,
            transport,
            api,
            pool,
            players,
            waypoint_repo,
            graph_repo,
            container_repo,
            log_repo,
            assignment_repo,
            market_repo,
            contract_repo,
            mining_repo,
            goods_repo,
            locks,
            logs,
            waypoints,
            graphs,
            _tempdir: tempdir,
        }
    }

    pub fn clock_arc(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    pub fn supervisor(&self, runtime: Arc<dyn ContainerRuntime>) -> Arc<ContainerSupervisor> {
        ContainerSupervisor::new(
            self.container_repo.clone(),
            self.locks.clone(),
            self.logs.clone(),
            self.clock_arc(),
            runtime,
            3,
        )
    }

    pub async fn seed_player(&self) -> Player {
        let player = Player {
            id: PlayerId::new(),
            agent_symbol: "FLEET".to_string(),
            token: PlayerToken("test-token".to_string()),
            credits: 100_000,
            metadata: serde_json::json!({}),
            last_active: self.clock.now(),
        };
        self.players
            .upsert(&PlayerRecord::from(&player))
            .await
            .expect("seed player");
        player
    }
}

/// Drives virtual time until the async condition holds, yielding between
/// steps so background tasks can run.
pub async fn eventually<F, Fut>(clock: &TestClock, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..5_000 {
        if condition().await {
            return;
        }
        if clock.sleeper_count() > 0 {
            clock.advance(Duration::from_millis(500));
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was not reached in time");
}

pub fn ship_json(
    symbol: &str,
    waypoint: &str,
    status: &str,
    arrival: Option<DateTime<Utc>>,
) -> serde_json::Value {
    let mut nav = serde_json::json!({
        "status": status,
        "waypointSymbol": waypoint,
        "flightMode": "CRUISE",
    });
    if let Some(arrival) = arrival {
        nav["route"] = serde_json::json!({ "arrival": arrival.to_rfc3339() });
    }
    serde_json::json!({
        "data": {
            "symbol": symbol,
            "nav": nav,
            "fuel": { "current": 400, "capacity": 400 },
            "cargo": { "capacity": 40, "units": 0, "inventory": [] },
            "engine": { "speed": 30 }
        }
    })
}

pub fn waypoints_page_json(system: &str, waypoints: &[(&str, f64, f64, bool)]) -> serde_json::Value {
    let data: Vec<serde_json::Value> = waypoints
        .iter()
        .map(|(symbol, x, y, marketplace)| {
            let traits = if *marketplace {
                serde_json::json!([{ "symbol": "MARKETPLACE" }])
            } else {
                serde_json::json!([])
            };
            serde_json::json!({
                "symbol": symbol,
                "systemSymbol": system,
                "x": x,
                "y": y,
                "type": "PLANET",
                "traits": traits,
            })
        })
        .collect();
    let total = data.len();
    serde_json::json!({
        "data": data,
        "meta": { "total": total, "page": 1, "limit": 20 }
    })
}

/// Scripted runners: the container's metadata names the behavior.
pub struct TestRuntime {
    clock: Arc<dyn Clock>,
}

impl TestRuntime {
    pub fn new(world: &TestWorld) -> Arc<Self> {
        Arc::new(Self {
            clock: world.clock_arc(),
        })
    }
}

impl ContainerRuntime for TestRuntime {
    fn build(
        &self,
        container: &Container,
        ctx: RunnerContext,
    ) -> Result<RunnerFuture, WorkflowError> {
        let behavior = container
            .metadata
            .get("behavior")
            .and_then(|v| v.as_str())
            .unwrap_or("complete")
            .to_string();
        let fail_times = container
            .metadata
            .get("fail_times")
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as u32;
        let restart_count = container.restart_count;
        let id = container.id.clone();
        let clock = self.clock.clone();

        Ok(match behavior.as_str() {
            "complete" => Box::pin(async { Ok(()) }),
            "fail" => Box::pin(async { Err(WorkflowError::Timeout("boom".to_string())) }),
            "panic" => Box::pin(async { panic!("kaboom") }),
            "fail_then_complete" => Box::pin(async move {
                if restart_count < fail_times {
                    Err(WorkflowError::Timeout("transient trouble".to_string()))
                } else {
                    Ok(())
                }
            }),
            "run_until_cancelled" => Box::pin(async move {
                ctx.cancel.cancelled().await;
                Err(WorkflowError::Cancelled)
            }),
            "hang" => Box::pin(async move {
                loop {
                    clock.sleep(Duration::from_secs(3600)).await;
                }
            }),
            "iterate" => Box::pin(async move {
                while ctx.supervisor.should_continue(&id).await? {
                    ctx.supervisor.increment_iteration(&id).await?;
                }
                Ok(())
            }),
            other => {
                return Err(WorkflowError::InvalidMetadata(format!(
                    "unknown behavior {other}"
                )))
            }
        })
    }

    fn auto_restart(&self, container_type: ContainerType) -> bool {
        container_type == ContainerType::MiningWorker
    }

    fn resumable(&self, container_type: ContainerType) -> bool {
        container_type == ContainerType::MiningWorker
    }
}

