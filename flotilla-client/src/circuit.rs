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
use chrono::{DateTime, TimeDelta, Utc};
use flotilla_common::clock::Clock;
use flotilla_common::model::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: DateTime<Utc> },
    HalfOpen { probe_outstanding: bool },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// One breaker per (player, endpoint family). After `threshold` consecutive
/// failures the breaker opens for `cooldown`, then lets a single probe
/// through; a successful probe closes it, a failed one re-opens it.
pub struct CircuitBreakers {
    clock: Arc<dyn Clock>,
    config: CircuitBreakerConfig,
    state: Mutex<HashMap<(PlayerId, &'static str), BreakerState>>,
}

impl CircuitBreakers {
    pub fn new(clock: Arc<dyn Clock>, config: CircuitBreakerConfig) -> Self {
        Self {
            clock,
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether a call may proceed. In half-open state exactly one
    /// caller is admitted as the probe.
    pub fn try_acquire(&self, player_id: PlayerId, family: &'static str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry((player_id, family))
            .or_insert(BreakerState::Closed {
                consecutive_failures: 0,
            });
        match *entry {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { until } => {
                if self.clock.now() >= until {
                    debug!(%player_id, family, "circuit half-open, admitting probe");
                    *entry = BreakerState::HalfOpen {
                        probe_outstanding: true,
                    };
                    Ok(())
                } else {
                    Err(ApiError::OpenCircuit(family.to_string()))
                }
            }
            BreakerState::HalfOpen { probe_outstanding } => {
                if probe_outstanding {
                    Err(ApiError::OpenCircuit(family.to_string()))
                } else {
                    *entry = BreakerState::HalfOpen {
                        probe_outstanding: true,
                    };
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self, player_id: PlayerId, family: &'static str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.get_mut(&(player_id, family)) {
            if !matches!(
                *entry,
                BreakerState::Closed {
                    consecutive_failures: 0
                }
            ) {
                debug!(%player_id, family, "circuit closed");
            }
            *entry = BreakerState::Closed {
                consecutive_failures: 0,
            };
        }
    }

    pub fn record_failure(&self, player_id: PlayerId, family: &'static str) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry((player_id, family))
            .or_insert(BreakerState::Closed {
                consecutive_failures: 0,
            });
        match *entry {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.threshold {
                    let until = self.clock.now() + cooldown_delta(self.config.cooldown);
                    warn!(%player_id, family, failures, "circuit opened");
                    *entry = BreakerState::Open { until };
                } else {
                    *entry = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            BreakerState::HalfOpen { .. } => {
                let until = self.clock.now() + cooldown_delta(self.config.cooldown);
                warn!(%player_id, family, "probe failed, circuit re-opened");
                *entry = BreakerState::Open { until };
            }
            BreakerState::Open { .. } => {}
        }
    }
}

fn cooldown_delta(cooldown: Duration) -> TimeDelta {
    TimeDelta::from_std(cooldown).expect("cooldown out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_common::clock::TestClock;
    use test_r::test;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn breakers(clock: &TestClock) -> CircuitBreakers {
        CircuitBreakers::new(Arc::new(clock.clone()), CircuitBreakerConfig::default())
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let clock = TestClock::new(start());
        let breakers = breakers(&clock);
        let player = PlayerId::new();

        for _ in 0..4 {
            breakers.record_failure(player, "ships");
            assert!(breakers.try_acquire(player, "ships").is_ok());
        }
        breakers.record_failure(player, "ships");
        assert!(matches!(
            breakers.try_acquire(player, "ships"),
            Err(ApiError::OpenCircuit(_))
        ));
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let clock = TestClock::new(start());
        let breakers = breakers(&clock);
        let player = PlayerId::new();

        for _ in 0..4 {
            breakers.record_failure(player, "ships");
        }
        breakers.record_success(player, "ships");
        for _ in 0..4 {
            breakers.record_failure(player, "ships");
        }
        assert!(breakers.try_acquire(player, "ships").is_ok());
    }

    #[test]
    fn half_open_admits_one_probe_and_closes_on_success() {
        let clock = TestClock::new(start());
        let breakers = breakers(&clock);
        let player = PlayerId::new();

        for _ in 0..5 {
            breakers.record_failure(player, "ships");
        }
        assert!(breakers.try_acquire(player, "ships").is_err());

        clock.advance(Duration::from_secs(60));
        assert!(breakers.try_acquire(player, "ships").is_ok());
        // second caller while the probe is in flight is still rejected
        assert!(breakers.try_acquire(player, "ships").is_err());

        breakers.record_success(player, "ships");
        assert!(breakers.try_acquire(player, "ships").is_ok());
    }

    #[test]
    fn failed_probe_reopens_for_another_cooldown() {
        let clock = TestClock::new(start());
        let breakers = breakers(&clock);
        let player = PlayerId::new();

        for _ in 0..5 {
            breakers.record_failure(player, "ships");
        }
        clock.advance(Duration::from_secs(60));
        assert!(breakers.try_acquire(player, "ships").is_ok());
        breakers.record_failure(player, "ships");

        assert!(breakers.try_acquire(player, "ships").is_err());
        clock.advance(Duration::from_secs(59));
        assert!(breakers.try_acquire(player, "ships").is_err());
        clock.advance(Duration::from_secs(1));
        assert!(breakers.try_acquire(player, "ships").is_ok());
    }

    #[test]
    fn families_are_independent() {
        let clock = TestClock::new(start());
        let breakers = breakers(&clock);
        let player = PlayerId::new();

        for _ in 0..5 {
            breakers.record_failure(player, "ships");
        }
        assert!(breakers.try_acquire(player, "ships").is_err());
        assert!(breakers.try_acquire(player, "markets").is_ok());
        assert!(breakers.try_acquire(PlayerId::new(), "ships").is_ok());
    }
}
