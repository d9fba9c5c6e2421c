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

use crate::db::RepoError;
use crate::repo::waypoint::{WaypointRecord, WaypointRepo};
use async_trait::async_trait;
use chrono::TimeDelta;
use flotilla_client::{ApiClient, ApiError};
use flotilla_common::clock::Clock;
use flotilla_common::model::waypoint::{Waypoint, WaypointFilter};
use flotilla_common::model::{Player, SystemSymbol, WaypointSymbol};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("corrupt cached record: {0}")]
    Corrupt(String),
}

/// Read-through cache of waypoint records per system. Reads come from the
/// repository; when the cached set is empty or stale and a player token is
/// available, the authoritative list is refetched and upserted.
#[async_trait]
pub trait WaypointCache: Send + Sync {
    /// Filters apply after reading and never influence the remote query.
    async fn list_waypoints(
        &self,
        system: &SystemSymbol,
        filter: &WaypointFilter,
        refill_as: Option<&Player>,
    ) -> Result<Vec<Waypoint>, CacheError>;

    async fn get_waypoint(
        &self,
        symbol: &WaypointSymbol,
        refill_as: Option<&Player>,
    ) -> Result<Option<Waypoint>, CacheError>;

    /// Authoritative upsert; overwrites traits and coordinates, stamping
    /// `synced_at` with the current time.
    async fn save_waypoints(&self, waypoints: Vec<Waypoint>) -> Result<(), CacheError>;
}

pub struct WaypointCacheDefault {
    repo: Arc<dyn WaypointRepo>,
    api: Arc<ApiClient>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl WaypointCacheDefault {
    pub fn new(
        repo: Arc<dyn WaypointRepo>,
        api: Arc<ApiClient>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            repo,
            api,
            clock,
            ttl,
        }
    }

    fn is_fresh(&self, waypoints: &[Waypoint]) -> bool {
        if waypoints.is_empty() {
            return false;
        }
        let oldest = waypoints
            .iter()
            .map(|w| w.synced_at)
            .min()
            .expect("non-empty");
        let ttl = TimeDelta::from_std(self.ttl).expect("ttl out of range");
        oldest + ttl >= self.clock.now()
    }

    async fn load_cached(&self, system: &SystemSymbol) -> Result<Vec<Waypoint>, CacheError> {
        let records = self.repo.list_by_system(&system.0).await?;
        records
            .into_iter()
            .map(|r| Waypoint::try_from(r).map_err(CacheError::Corrupt))
            .collect()
    }

    /// Two concurrent refills for the same system may both hit the API; the
    /// later upsert wins and the rows stay consistent.
    async fn refill(
        &self,
        system: &SystemSymbol,
        player: &Player,
    ) -> Result<Vec<Waypoint>, CacheError> {
        info!(system = %system, player = %player.agent_symbol, "refilling waypoint cache");
        let now = self.clock.now();
        let dtos = self
            .api
            .list_waypoints(player.id, &player.token, system)
            .await?;
        let waypoints: Vec<Waypoint> = dtos.iter().map(|dto| dto.to_waypoint(now)).collect();
        let records: Vec<WaypointRecord> = waypoints.iter().map(WaypointRecord::from).collect();
        self.repo.upsert_all(&records).await?;
        Ok(waypoints)
    }
}

#[async_trait]
impl WaypointCache for WaypointCacheDefault {
    async fn list_waypoints(
        &self,
        system: &SystemSymbol,
        filter: &WaypointFilter,
        refill_as: Option<&Player>,
    ) -> Result<Vec<Waypoint>, CacheError> {
        let cached = self.load_cached(system).await?;

        let waypoints = if self.is_fresh(&cached) {
            cached
        } else if let Some(player) = refill_as {
            self.refill(system, player).await?
        } else {
            debug!(system = %system, "no refill possible, serving cached waypoints");
            cached
        };

        Ok(waypoints
            .into_iter()
            .filter(|w| filter.matches(w))
            .collect())
    }

    async fn get_waypoint(
        &self,
        symbol: &WaypointSymbol,
        refill_as: Option<&Player>,
    ) -> Result<Option<Waypoint>, CacheError> {
        let system = symbol.system_symbol();
        let waypoints = self
            .list_waypoints(&system, &WaypointFilter::none(), refill_as)
            .await?;
        Ok(waypoints.into_iter().find(|w| &w.symbol == symbol))
    }

    async fn save_waypoints(&self, waypoints: Vec<Waypoint>) -> Result<(), CacheError> {
        let now = self.clock.now();
        let records: Vec<WaypointRecord> = waypoints
            .iter()
            .map(|w| {
                let mut record = WaypointRecord::from(w);
                record.synced_at = now;
                record
            })
            .collect();
        self.repo.upsert_all(&records).await?;
        Ok(())
    }
}
