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

use crate::config::DaemonConfig;
use crate::db::postgres::PostgresPool;
use crate::db::sqlite::SqlitePool;
use crate::db::Pool;
use crate::repo;
use crate::repo::container::ContainerRepo;
use crate::repo::container_log::ContainerLogRepo;
use crate::repo::contract::ContractRepo;
use crate::repo::goods_factory::GoodsFactoryRepo;
use crate::repo::market::MarketRepo;
use crate::repo::mining::MiningRepo;
use crate::repo::player::PlayerRepo;
use crate::repo::ship_assignment::ShipAssignmentRepo;
use crate::repo::system_graph::SystemGraphRepo;
use crate::repo::waypoint::WaypointRepo;
use crate::rpc::dispatcher::Dispatcher;
use crate::services::container_log::ContainerLogService;
use crate::services::health::HealthMonitor;
use crate::services::ship_locks::{ShipLockService, ShipLockServiceDefault};
use crate::services::system_graph::{SystemGraphCache, SystemGraphCacheDefault};
use crate::services::waypoint_cache::{WaypointCache, WaypointCacheDefault};
use crate::supervisor::ContainerSupervisor;
use crate::workflows::registry::WorkflowRegistry;
use crate::workflows::WorkflowDeps;
use anyhow::Context;
use flotilla_client::ApiClient;
use flotilla_common::clock::Clock;
use flotilla_common::config::DbConfig;
use include_dir::{include_dir, Dir};
use std::sync::Arc;
use tracing::info;

static DB_MIGRATIONS: Dir = include_dir!("$CARGO_MANIFEST_DIR/db/migration");

enum DbHandle {
    Postgres(PostgresPool),
    Sqlite(SqlitePool),
}

impl DbHandle {
    async fn close(&self) {
        match self {
            DbHandle::Postgres(pool) => pool.close().await,
            DbHandle::Sqlite(pool) => pool.close().await,
        }
    }
}

/// The daemon's wired-up service graph; constructed once at startup and
/// shared from there.
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub api: Arc<ApiClient>,
    pub players: Arc<dyn PlayerRepo>,
    pub waypoints: Arc<dyn WaypointCache>,
    pub graphs: Arc<dyn SystemGraphCache>,
    pub locks: Arc<dyn ShipLockService>,
    pub logs: Arc<ContainerLogService>,
    pub supervisor: Arc<ContainerSupervisor>,
    pub health: Arc<HealthMonitor>,
    pub dispatcher: Arc<Dispatcher>,
    db: DbHandle,
}

impl Services {
    pub async fn new(config: &DaemonConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Services> {
        match config.db.clone() {
            DbConfig::Postgres(db_config) => {
                let pool = PostgresPool::configured(&db_config, clock.clone())
                    .await
                    .context("connecting to postgres")?;
                migrate_postgres(&pool).await?;
                let db = DbHandle::Postgres(pool.clone());
                Self::make_with_db(config, clock, pool, db).await
            }
            DbConfig::Sqlite(db_config) => {
                let pool = SqlitePool::configured(&db_config, clock.clone())
                    .await
                    .context("opening sqlite database")?;
                migrate_sqlite(&pool).await?;
                let db = DbHandle::Sqlite(pool.clone());
                Self::make_with_db(config, clock, pool, db).await
            }
        }
    }

    async fn make_with_db<DB>(
        config: &DaemonConfig,
        clock: Arc<dyn Clock>,
        db_pool: DB,
        db: DbHandle,
    ) -> anyhow::Result<Services>
    where
        DB: Pool,
        repo::player::DbPlayerRepo<DB>: PlayerRepo,
        repo::waypoint::DbWaypointRepo<DB>: WaypointRepo,
        repo::system_graph::DbSystemGraphRepo<DB>: SystemGraphRepo,
        repo::container::DbContainerRepo<DB>: ContainerRepo,
        repo::container_log::DbContainerLogRepo<DB>: ContainerLogRepo,
        repo::ship_assignment::DbShipAssignmentRepo<DB>: ShipAssignmentRepo,
        repo::market::DbMarketRepo<DB>: MarketRepo,
        repo::contract::DbContractRepo<DB>: ContractRepo,
        repo::mining::DbMiningRepo<DB>: MiningRepo,
        repo::goods_factory::DbGoodsFactoryRepo<DB>: GoodsFactoryRepo,
    {
        let player_repo: Arc<dyn PlayerRepo> =
            Arc::new(repo::player::DbPlayerRepo::new(db_pool.clone()));
        let waypoint_repo: Arc<dyn WaypointRepo> =
            Arc::new(repo::waypoint::DbWaypointRepo::new(db_pool.clone()));
        let system_graph_repo: Arc<dyn SystemGraphRepo> =
            Arc::new(repo::system_graph::DbSystemGraphRepo::new(db_pool.clone()));
        let container_repo: Arc<dyn ContainerRepo> =
            Arc::new(repo::container::DbContainerRepo::new(db_pool.clone()));
        let container_log_repo: Arc<dyn ContainerLogRepo> =
            Arc::new(repo::container_log::DbContainerLogRepo::new(db_pool.clone()));
        let ship_assignment_repo: Arc<dyn ShipAssignmentRepo> = Arc::new(
            repo::ship_assignment::DbShipAssignmentRepo::new(db_pool.clone()),
        );
        let market_repo: Arc<dyn MarketRepo> =
            Arc::new(repo::market::DbMarketRepo::new(db_pool.clone()));
        let contract_repo: Arc<dyn ContractRepo> =
            Arc::new(repo::contract::DbContractRepo::new(db_pool.clone()));
        let mining_repo: Arc<dyn MiningRepo> =
            Arc::new(repo::mining::DbMiningRepo::new(db_pool.clone()));
        let goods_factory_repo: Arc<dyn GoodsFactoryRepo> =
            Arc::new(repo::goods_factory::DbGoodsFactoryRepo::new(db_pool.clone()));

        let api = Arc::new(
            ApiClient::new(&config.api, clock.clone())
                .map_err(|err| anyhow::anyhow!("building api client: {err}"))?,
        );

        let logs = ContainerLogService::start(container_log_repo.clone(), clock.clone());
        let locks: Arc<dyn ShipLockService> = Arc::new(ShipLockServiceDefault::new(
            ship_assignment_repo.clone(),
            clock.clone(),
        ));
        let waypoints: Arc<dyn WaypointCache> = Arc::new(WaypointCacheDefault::new(
            waypoint_repo.clone(),
            api.clone(),
            clock.clone(),
            config.waypoint_ttl,
        ));
        let graphs: Arc<dyn SystemGraphCache> = Arc::new(SystemGraphCacheDefault::new(
            system_graph_repo.clone(),
            waypoints.clone(),
            clock.clone(),
        ));

        let deps = WorkflowDeps {
            clock: clock.clone(),
            api: api.clone(),
            players: player_repo.clone(),
            waypoints: waypoints.clone(),
            graphs: graphs.clone(),
            locks: locks.clone(),
            markets: market_repo.clone(),
            contracts: contract_repo.clone(),
            mining: mining_repo.clone(),
            goods: goods_factory_repo.clone(),
        };
        let registry = Arc::new(WorkflowRegistry::new(deps));

        let supervisor = ContainerSupervisor::new(
            container_repo.clone(),
            locks.clone(),
            logs.clone(),
            clock.clone(),
            registry,
            config.container_max_restarts,
        );

        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            config.lock_stale_timeout,
            clock.clone(),
            api.clone(),
            player_repo.clone(),
            locks.clone(),
            supervisor.clone(),
            logs.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            clock.clone(),
            api.clone(),
            player_repo.clone(),
            supervisor.clone(),
            logs.clone(),
        ));

        info!("services wired up");
        Ok(Services {
            clock,
            api,
            players: player_repo,
            waypoints,
            graphs,
            locks,
            logs,
            supervisor,
            health,
            dispatcher,
            db,
        })
    }

    pub async fn close(&self) {
        self.logs.close().await;
        self.db.close().await;
    }
}

pub async fn migrate_postgres(pool: &PostgresPool) -> anyhow::Result<()> {
    for file in sorted_scripts("postgres")? {
        pool.apply_migration(file.0, file.1)
            .await
            .with_context(|| format!("applying migration {}", file.0))?;
    }
    Ok(())
}

pub async fn migrate_sqlite(pool: &SqlitePool) -> anyhow::Result<()> {
    for file in sorted_scripts("sqlite")? {
        pool.apply_migration(file.0, file.1)
            .await
            .with_context(|| format!("applying migration {}", file.0))?;
    }
    Ok(())
}

fn sorted_scripts(backend: &str) -> anyhow::Result<Vec<(&'static str, &'static str)>> {
    let dir = DB_MIGRATIONS
        .get_dir(backend)
        .with_context(|| format!("missing {backend} migrations"))?;
    let mut scripts: Vec<(&'static str, &'static str)> = dir
        .files()
        .filter_map(|file| {
            Some((
                file.path().to_str()?,
                file.contents_utf8()?,
            ))
        })
        .collect();
    scripts.sort_by_key(|(name, _)| *name);
    Ok(scripts)
}
