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

use flotilla_client::ApiClientConfig;
use flotilla_common::config::DbConfig;
use flotilla_common::tracing::TracingConfig;
use flotilla_common::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub tracing: TracingConfig,
    /// Directory for the daemon's runtime state (socket file, sqlite db).
    pub state_dir: PathBuf,
    /// Socket path; defaults to `<state_dir>/daemon.sock` when unset.
    pub socket_path: Option<PathBuf>,
    pub db: DbConfig,
    pub api: ApiClientConfig,
    #[serde(with = "humantime_serde")]
    pub waypoint_ttl: Duration,
    pub container_max_restarts: u32,
    #[serde(with = "humantime_serde")]
    pub lock_stale_timeout: Duration,
    pub health: HealthConfig,
    #[serde(with = "humantime_serde")]
    pub shutdown_deadline: Duration,
}

impl DaemonConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("daemon.sock"))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::local_dev("flotillad"),
            state_dir: PathBuf::from("."),
            socket_path: None,
            db: DbConfig::default(),
            api: ApiClientConfig::default(),
            waypoint_ttl: Duration::from_secs(7200),
            container_max_restarts: 3,
            lock_stale_timeout: Duration::from_secs(1800),
            health: HealthConfig::default(),
            shutdown_deadline: Duration::from_secs(30),
        }
    }
}

impl SafeDisplay for DaemonConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "tracing:");
        let _ = writeln!(&mut result, "{}", self.tracing.to_safe_string_indented());
        let _ = writeln!(&mut result, "state dir: {}", self.state_dir.display());
        let _ = writeln!(&mut result, "socket: {}", self.socket_path().display());
        let _ = writeln!(&mut result, "db:");
        let _ = writeln!(&mut result, "{}", self.db.to_safe_string_indented());
        let _ = writeln!(&mut result, "api:");
        let _ = writeln!(&mut result, "{}", self.api.to_safe_string_indented());
        let _ = writeln!(&mut result, "waypoint ttl: {:?}", self.waypoint_ttl);
        let _ = writeln!(
            &mut result,
            "container max restarts: {}",
            self.container_max_restarts
        );
        let _ = writeln!(
            &mut result,
            "lock stale timeout: {:?}",
            self.lock_stale_timeout
        );
        let _ = writeln!(&mut result, "health:");
        let _ = writeln!(&mut result, "{}", self.health.to_safe_string_indented());
        let _ = writeln!(
            &mut result,
            "shutdown deadline: {:?}",
            self.shutdown_deadline
        );
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Grace after the expected arrival before an in-transit ship counts as
    /// stuck.
    #[serde(with = "humantime_serde")]
    pub transit_grace: Duration,
    /// How long a ship may sit in the same (location, nav status) under a
    /// RUNNING container before it counts as stuck.
    #[serde(with = "humantime_serde")]
    pub idle_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub recovery_cooldown: Duration,
    pub max_recovery_attempts: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            transit_grace: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(900),
            recovery_cooldown: Duration::from_secs(60),
            max_recovery_attempts: 3,
        }
    }
}

impl SafeDisplay for HealthConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "interval: {:?}", self.interval);
        let _ = writeln!(&mut result, "transit grace: {:?}", self.transit_grace);
        let _ = writeln!(&mut result, "idle threshold: {:?}", self.idle_threshold);
        let _ = writeln!(
            &mut result,
            "recovery cooldown: {:?}",
            self.recovery_cooldown
        );
        let _ = writeln!(
            &mut result,
            "max recovery attempts: {}",
            self.max_recovery_attempts
        );
        result
    }
}
