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

use flotilla_common::model::container::{ContainerStatus, ContainerType};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::time::Duration;

lazy_static! {
    static ref CONTAINER_STATUS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "flotilla_container_status_total",
        "Container status transitions by type and resulting status",
        &["container_type", "status"]
    )
    .unwrap();
    static ref RPC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "flotilla_rpc_requests_total",
        "Socket RPC requests by operation and outcome",
        &["op", "outcome"]
    )
    .unwrap();
    static ref RPC_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "flotilla_rpc_duration_seconds",
        "Socket RPC handling latency",
        &["op"]
    )
    .unwrap();
}

pub fn record_container_status(container_type: ContainerType, status: ContainerStatus) {
    CONTAINER_STATUS_TOTAL
        .with_label_values(&[container_type.as_str(), status.as_str()])
        .inc();
}

pub fn record_rpc(op: &str, outcome: &str, duration: Duration) {
    RPC_REQUESTS_TOTAL.with_label_values(&[op, outcome]).inc();
    RPC_DURATION_SECONDS
        .with_label_values(&[op])
        .observe(duration.as_secs_f64());
}
