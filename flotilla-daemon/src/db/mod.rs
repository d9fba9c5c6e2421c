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

pub mod postgres;
pub mod sqlite;

use std::time::Duration;

/// Marker for the concrete pool types; repository impls are generated per
/// pool with `conditional_trait_gen::trait_gen`.
pub trait Pool: Clone + Send + Sync + 'static {}

impl Pool for postgres::PostgresPool {}
impl Pool for sqlite::SqlitePool {}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepoError::UniqueViolation(db_err.to_string())
            }
            _ => RepoError::Internal(err.to_string()),
        }
    }
}

/// Connection drops and serialization conflicts are worth retrying; schema
/// and constraint errors are not.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            matches!(
                db_err.code().as_deref(),
                // postgres serialization_failure / deadlock_detected,
                // sqlite SQLITE_BUSY / SQLITE_LOCKED
                Some("40001") | Some("40P01") | Some("5") | Some("6")
            )
        }
        _ => false,
    }
}
