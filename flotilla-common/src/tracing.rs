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

use crate::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    /// `tracing_subscriber::EnvFilter` directive string; `RUST_LOG`
    /// overrides it when set.
    pub env_filter: String,
    pub json: bool,
    pub ansi: bool,
}

impl TracingConfig {
    pub fn local_dev(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            env_filter: "info".to_string(),
            json: false,
            ansi: true,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::local_dev("flotilla")
    }
}

impl SafeDisplay for TracingConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "service name: {}", self.service_name);
        let _ = writeln!(&mut result, "env filter: {}", self.env_filter);
        let _ = writeln!(&mut result, "json: {}", self.json);
        result
    }
}

/// Installs the global subscriber. Call once, from the binary entry point.
pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.env_filter.clone()));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_ansi(config.ansi)
            .with_env_filter(filter)
            .init();
    }
}

/// Subscriber installation for tests: never panics when a subscriber is
/// already set, so any number of test binaries can share it as a test dep.
pub fn init_tracing_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
