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

use crate::db::{is_transient, RepoError};
use flotilla_common::clock::Clock;
use flotilla_common::config::DbPostgresConfig;
use flotilla_common::retries::RetryConfig;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct PostgresPool {
    pool: sqlx::PgPool,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    query_timeout: Duration,
}

impl PostgresPool {
    pub async fn configured(
        config: &DbPostgresConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RepoError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password);
        if let Some(schema) = &config.schema {
            options = options.options([("search_path", schema.as_str())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(RepoError::from)?;

        info!(
            host = config.host,
            database = config.database,
            "connected to postgres"
        );

        Ok(Self {
            pool,
            clock,
            retry: RetryConfig::transient_db(),
            query_timeout: config.query_timeout,
        })
    }

    /// Runs one migration script as a single multi-statement batch. Scripts
    /// are idempotent (`IF NOT EXISTS` DDL) and re-run on every start.
    pub async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), RepoError> {
        debug!(name, "applying migration");
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(RepoError::from)?;
        Ok(())
    }

    pub fn with_ro(&self, svc: &'static str, api: &'static str) -> PostgresLabelledApi<'_> {
        self.labelled(svc, api)
    }

    pub fn with_rw(&self, svc: &'static str, api: &'static str) -> PostgresLabelledApi<'_> {
        self.labelled(svc, api)
    }

    fn labelled(&self, svc: &'static str, api: &'static str) -> PostgresLabelledApi<'_> {
        PostgresLabelledApi {
            pool: &self.pool,
            clock: &self.clock,
            retry: &self.retry,
            query_timeout: self.query_timeout,
            svc,
            api,
        }
    }

    /// Waits for in-flight queries to finish and closes all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct PostgresLabelledApi<'a> {
    pool: &'a sqlx::PgPool,
    clock: &'a Arc<dyn Clock>,
    retry: &'a RetryConfig,
    query_timeout: Duration,
    svc: &'static str,
    api: &'static str,
}

impl PostgresLabelledApi<'_> {
    pub async fn execute<'q, F>(&self, make_query: F) -> Result<u64, RepoError>
    where
        F: Fn() -> Query<'q, Postgres, PgArguments>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                r = make_query().execute(self.pool) => r,
                _ = self.clock.sleep(self.query_timeout) => {
                    return Err(RepoError::Timeout(self.query_timeout));
                }
            };
            match result {
                Ok(done) => return Ok(done.rows_affected()),
                Err(err) if is_transient(&err) && attempt < self.retry.max_attempts => {
                    attempt += 1;
                    self.backoff(attempt, &err).await;
                }
                Err(err) => return Err(self.surface(err)),
            }
        }
    }

    pub async fn fetch_optional_as<'q, T, F>(&self, make_query: F) -> Result<Option<T>, RepoError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
        F: Fn() -> QueryAs<'q, Postgres, T, PgArguments>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                r = make_query().fetch_optional(self.pool) => r,
                _ = self.clock.sleep(self.query_timeout) => {
                    return Err(RepoError::Timeout(self.query_timeout));
                }
            };
            match result {
                Ok(row) => return Ok(row),
                Err(err) if is_transient(&err) && attempt < self.retry.max_attempts => {
                    attempt += 1;
                    self.backoff(attempt, &err).await;
                }
                Err(err) => return Err(self.surface(err)),
            }
        }
    }

    pub async fn fetch_all_as<'q, T, F>(&self, make_query: F) -> Result<Vec<T>, RepoError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
        F: Fn() -> QueryAs<'q, Postgres, T, PgArguments>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                r = make_query().fetch_all(self.pool) => r,
                _ = self.clock.sleep(self.query_timeout) => {
                    return Err(RepoError::Timeout(self.query_timeout));
                }
            };
            match result {
                Ok(rows) => return Ok(rows),
                Err(err) if is_transient(&err) && attempt < self.retry.max_attempts => {
                    attempt += 1;
                    self.backoff(attempt, &err).await;
                }
                Err(err) => return Err(self.surface(err)),
            }
        }
    }

    async fn backoff(&self, attempt: u32, err: &sqlx::Error) {
        let delay = self.retry.delay_for_attempt(attempt - 1);
        warn!(
            svc = self.svc,
            api = self.api,
            attempt,
            error = %err,
            ?delay,
            "transient database error, retrying"
        );
        self.clock.sleep(delay).await;
    }

    fn surface(&self, err: sqlx::Error) -> RepoError {
        let repo_error = RepoError::from(err);
        if !matches!(repo_error, RepoError::UniqueViolation(_)) {
            error!(svc = self.svc, api = self.api, error = %repo_error, "query failed");
        }
        repo_error
    }
}
