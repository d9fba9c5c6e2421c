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

use std::time::Duration;

/// Tagged error kinds of the remote universe API, after rate limiting,
/// retry and circuit breaking have been applied.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("circuit open for {0}")]
    OpenCircuit(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Retried with backoff by the client. Everything else surfaces
    /// immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited(_) | ApiError::ServerError { .. } | ApiError::Network(_)
        )
    }

    /// Counts towards the endpoint family's circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, ApiError::ServerError { .. } | ApiError::Network(_))
    }

    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited(message),
            400..=499 => ApiError::BadRequest(message),
            _ => ApiError::ServerError { status, message },
        }
    }
}

/// A failed transport attempt; `retry_after` carries the server's
/// `Retry-After` hint when one was present.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{error}")]
pub struct TransportError {
    pub error: ApiError,
    pub retry_after: Option<Duration>,
}

impl From<ApiError> for TransportError {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}
