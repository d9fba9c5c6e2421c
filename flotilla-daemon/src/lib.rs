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

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod metrics;
pub mod repo;
pub mod rpc;
pub mod services;
pub mod supervisor;
pub mod workflows;

#[cfg(test)]
test_r::enable!();

use crate::bootstrap::Services;
use crate::config::DaemonConfig;
use crate::rpc::server::SocketServer;
use flotilla_common::clock::{Clock, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the daemon until a shutdown signal arrives. Fatal startup problems
/// (unreachable database, socket in use) surface as errors; a clean stop
/// returns Ok.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    std::fs::create_dir_all(&config.state_dir)?;
    let services = Services::new(&config, clock).await?;

    services.supervisor.recover_at_startup().await?;

    let cancel = CancellationToken::new();

    let health_task = {
        let health = services.health.clone();
        let token = cancel.child_token();
        tokio::spawn(async move { health.run(token).await })
    };

    let socket_path = config.socket_path();
    let server = SocketServer::bind(&socket_path, services.dispatcher.clone()).await?;
    let server_task = {
        let token = cancel.child_token();
        tokio::spawn(server.run(token))
    };

    info!("daemon up");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    services.supervisor.shutdown(config.shutdown_deadline).await;
    cancel.cancel();
    let _ = server_task.await;
    let _ = health_task.await;
    services.close().await;

    info!("daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
