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

use flotilla_common::config::ConfigLoader;
use flotilla_common::tracing::init_tracing;
use flotilla_common::SafeDisplay;
use flotilla_daemon::config::DaemonConfig;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let config_path =
        std::env::var("FLOTILLA_CONFIG").unwrap_or_else(|_| "config/flotillad.toml".to_string());
    let loader = ConfigLoader::<DaemonConfig>::new(Path::new(&config_path));

    match loader.load_or_dump_config() {
        None => ExitCode::SUCCESS,
        Some(Err(err)) => {
            eprintln!("invalid configuration: {err}");
            ExitCode::FAILURE
        }
        Some(Ok(config)) => {
            init_tracing(&config.tracing);
            info!("starting flotillad with configuration:\n{}", config.to_safe_string());

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!(error = %err, "failed to build runtime");
                    return ExitCode::FAILURE;
                }
            };

            match runtime.block_on(flotilla_daemon::run(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!(error = %err, "daemon failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
