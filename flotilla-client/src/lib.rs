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

pub mod circuit;
pub mod client;
pub mod error;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod transport;

pub use client::{ApiClient, ApiClientConfig};
pub use error::ApiError;

#[cfg(test)]
test_r::enable!();
