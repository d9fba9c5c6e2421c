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

use crate::error::{ApiError, TransportError};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub token: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self {
            method: Method::PATCH,
            path: path.into(),
            body: None,
            token: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// A single HTTP attempt against the remote API. The retry loop, rate
/// limiting and circuit breaking live above this seam so that tests can
/// script the transport.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<serde_json::Value, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let with_slash = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&with_slash)
            .map_err(|err| ApiError::BadRequest(format!("invalid base url: {err}")))?;
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<serde_json::Value, TransportError> {
        let url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|err| TransportError::from(ApiError::BadRequest(err.to_string())))?;

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            TransportError::from(ApiError::Network(err.to_string()))
        })?;

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::from(ApiError::Network(err.to_string())))?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|err| TransportError::from(ApiError::Decode(err.to_string())))
        } else {
            Err(TransportError {
                error: ApiError::from_status(status.as_u16(), error_message(status, &body)),
                retry_after,
            })
        }
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}

fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("{status}: {body}"))
}
