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
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Layered config loading: defaults from the `Default` impl, overridden by a
/// TOML file, overridden by `FLOTILLA__`-prefixed environment variables
/// (`__` separates nesting levels).
pub struct ConfigLoader<T: Serialize + DeserializeOwned + Default> {
    pub config_file_name: PathBuf,
    phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned + Default> ConfigLoader<T> {
    pub fn new(config_file_name: &Path) -> Self {
        Self {
            config_file_name: config_file_name.to_path_buf(),
            phantom: PhantomData,
        }
    }

    pub fn figment(&self) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(T::default()))
            .merge(Toml::file(&self.config_file_name))
            .merge(Env::prefixed("FLOTILLA__").split("__"))
    }

    pub fn load(&self) -> figment::Result<T> {
        self.figment().extract()
    }

    /// Loads the config, or dumps the effective defaults as TOML and returns
    /// `None` when `FLOTILLA_DUMP_CONFIG` is set.
    pub fn load_or_dump_config(&self) -> Option<figment::Result<T>> {
        if std::env::var("FLOTILLA_DUMP_CONFIG").is_ok() {
            let defaults = T::default();
            match toml::to_string(&defaults) {
                Ok(dump) => println!("{dump}"),
                Err(err) => eprintln!("failed to serialize default config: {err}"),
            }
            None
        } else {
            Some(self.load())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DbConfig {
    Postgres(DbPostgresConfig),
    Sqlite(DbSqliteConfig),
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig::Sqlite(DbSqliteConfig::default())
    }
}

impl SafeDisplay for DbConfig {
    fn to_safe_string(&self) -> String {
        match self {
            DbConfig::Postgres(config) => config.to_safe_string(),
            DbConfig::Sqlite(config) => config.to_safe_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbPostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub schema: Option<String>,
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for DbPostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "flotilla".to_string(),
            username: "flotilla".to_string(),
            password: "".to_string(),
            schema: None,
            max_connections: 5,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl SafeDisplay for DbPostgresConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "kind: postgres");
        let _ = writeln!(&mut result, "host: {}", self.host);
        let _ = writeln!(&mut result, "port: {}", self.port);
        let _ = writeln!(&mut result, "database: {}", self.database);
        let _ = writeln!(&mut result, "username: {}", self.username);
        let _ = writeln!(&mut result, "password: ****");
        if let Some(schema) = &self.schema {
            let _ = writeln!(&mut result, "schema: {schema}");
        }
        let _ = writeln!(&mut result, "max connections: {}", self.max_connections);
        let _ = writeln!(&mut result, "query timeout: {:?}", self.query_timeout);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbSqliteConfig {
    pub database: String,
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for DbSqliteConfig {
    fn default() -> Self {
        Self {
            database: "flotilla.db".to_string(),
            max_connections: 5,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl SafeDisplay for DbSqliteConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "kind: sqlite");
        let _ = writeln!(&mut result, "database: {}", self.database);
        let _ = writeln!(&mut result, "max connections: {}", self.max_connections);
        let _ = writeln!(&mut result, "query timeout: {:?}", self.query_timeout);
        result
    }
}
