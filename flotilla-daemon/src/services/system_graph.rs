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

use crate::repo::system_graph::{SystemGraphRecord, SystemGraphRepo};
use crate::services::waypoint_cache::{CacheError, WaypointCache};
use async_trait::async_trait;
use flotilla_common::clock::Clock;
use flotilla_common::model::graph::SystemGraph;
use flotilla_common::model::waypoint::WaypointFilter;
use flotilla_common::model::{Player, SystemSymbol};
use std::sync::Arc;
use tracing::info;

/// Cache of per-system navigation graphs. There is no TTL: a graph is
/// rebuilt only on `force_refresh`, or indirectly when the waypoint cache
/// refreshes underneath a rebuild.
#[async_trait]
pub trait SystemGraphCache: Send + Sync {
    async fn get_graph(
        &self,
        system: &SystemSymbol,
        force_refresh: bool,
        refill_as: Option<&Player>,
    ) -> Result<SystemGraph, CacheError>;
}

pub struct SystemGraphCacheDefault {
    repo: Arc<dyn SystemGraphRepo>,
    waypoints: Arc<dyn WaypointCache>,
    clock: Arc<dyn Clock>,
}

impl SystemGraphCacheDefault {
    pub fn new(
        repo: Arc<dyn SystemGraphRepo>,
        waypoints: Arc<dyn WaypointCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            waypoints,
            clock,
        }
    }

    /// Builds go through the waypoint cache, so a build can never diverge
    /// from the waypoint rows: any refill it triggers upserts those first.
    async fn build(
        &self,
        system: &SystemSymbol,
        refill_as: Option<&Player>,
    ) -> Result<SystemGraph, CacheError> {
        let waypoints = self
            .waypoints
            .list_waypoints(system, &WaypointFilter::none(), refill_as)
            .await?;
        let graph = SystemGraph::build(system.clone(), &waypoints, self.clock.now());
        self.repo.upsert(&SystemGraphRecord::from(&graph)).await?;
        info!(
            system = %system,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "system graph built"
        );
        Ok(graph)
    }
}

#[async_trait]
impl SystemGraphCache for SystemGraphCacheDefault {
    async fn get_graph(
        &self,
        system: &SystemSymbol,
        force_refresh: bool,
        refill_as: Option<&Player>,
    ) -> Result<SystemGraph, CacheError> {
        if !force_refresh {
            if let Some(record) = self.repo.get(&system.0).await? {
                return SystemGraph::try_from(record).map_err(CacheError::Corrupt);
            }
        }
        self.build(system, refill_as).await
    }
}
