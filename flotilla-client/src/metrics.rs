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

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    static ref API_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "flotilla_api_calls_total",
        "Remote API calls by endpoint family and outcome",
        &["family", "outcome"]
    )
    .unwrap();
    static ref API_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "flotilla_api_retries_total",
        "Retried remote API attempts by endpoint family",
        &["family"]
    )
    .unwrap();
}

pub fn record_api_call(family: &str, outcome: &str) {
    API_CALLS_TOTAL.with_label_values(&[family, outcome]).inc();
}

pub fn record_api_retry(family: &str) {
    API_RETRIES_TOTAL.with_label_values(&[family]).inc();
}
