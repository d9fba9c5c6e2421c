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

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use flotilla_common::clock::Clock;
use flotilla_common::model::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct BucketState {
    tokens: f64,
    updated_at: DateTime<Utc>,
}

/// Token bucket with capacity `burst` refilled at `rate` tokens per second.
/// All waiting is done through the clock.
pub struct TokenBucket {
    clock: Arc<dyn Clock>,
    rate: f64,
    burst: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(clock: Arc<dyn Clock>, rate: f64, burst: u32) -> Self {
        let now = clock.now();
        Self {
            clock,
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                updated_at: now,
            }),
        }
    }

    /// Takes one token, sleeping until one becomes available. Fails with
    /// `RateLimited` when no token can be had before `deadline` elapses.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), ApiError> {
        let started = self.clock.now();
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = self.clock.now();
                let elapsed = (now - state.updated_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.burst as f64);
                state.updated_at = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };

            let elapsed = (self.clock.now() - started).to_std().unwrap_or(Duration::ZERO);
            if elapsed + wait > deadline {
                return Err(ApiError::RateLimited(format!(
                    "no token within {deadline:?}"
                )));
            }
            self.clock.sleep(wait).await;
        }
    }
}

/// One token bucket per player; requests for different players never gate
/// each other.
pub struct PlayerRateLimiter {
    clock: Arc<dyn Clock>,
    rate: f64,
    burst: u32,
    buckets: Mutex<HashMap<PlayerId, Arc<TokenBucket>>>,
}

impl PlayerRateLimiter {
    pub fn new(clock: Arc<dyn Clock>, rate: f64, burst: u32) -> Self {
        Self {
            clock,
            rate,
            burst,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn bucket(&self, player_id: PlayerId) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(player_id)
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(self.clock.clone(), self.rate, self.burst))
            })
            .clone()
    }
}
