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

use crate::clock::Clock;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Poll-with-backoff schedule for waiting on remotely observed state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollSchedule {
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 1.5,
            max: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AwaitError<E> {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        what: &'static str,
        timeout: Duration,
    },
    #[error("fetch failed while waiting for {what}: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: E,
    },
}

/// Polls `fetch` until `condition` holds for the fetched value, sleeping the
/// schedule's backoff between polls, or fails once `timeout` elapses. All
/// navigation-adjacent waits (dock, orbit, refuel, transit arrival) go
/// through here instead of ad-hoc sleep loops.
pub async fn await_condition<T, E, F, Fut, P>(
    clock: &dyn Clock,
    what: &'static str,
    timeout: Duration,
    schedule: &PollSchedule,
    mut fetch: F,
    condition: P,
) -> Result<T, AwaitError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let deadline = clock.now() + TimeDelta::from_std(timeout).expect("timeout out of range");
    let mut delay = schedule.initial;
    loop {
        let value = fetch()
            .await
            .map_err(|source| AwaitError::Fetch { what, source })?;
        if condition(&value) {
            return Ok(value);
        }
        let now = clock.now();
        if now >= deadline {
            return Err(AwaitError::Timeout { what, timeout });
        }
        let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        clock.sleep(delay.min(remaining)).await;
        delay = delay.mul_f64(schedule.multiplier).min(schedule.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use test_r::test;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    async fn returns_once_condition_holds() {
        let clock = TestClock::new(start());
        let polls = Arc::new(AtomicU32::new(0));

        let task = {
            let clock = clock.clone();
            let polls = polls.clone();
            tokio::spawn(async move {
                await_condition(
                    &clock,
                    "counter to reach three",
                    Duration::from_secs(60),
                    &PollSchedule::default(),
                    || {
                        let n = polls.fetch_add(1, Ordering::SeqCst) + 1;
                        async move { Ok::<u32, Boom>(n) }
                    },
                    |n| *n >= 3,
                )
                .await
            })
        };

        clock.wait_for_sleepers(1).await;
        clock.advance(Duration::from_secs(1));
        clock.wait_for_sleepers(1).await;
        clock.advance(Duration::from_secs(2));

        let result = task.await.unwrap().unwrap();
        assert_eq!(result, 3);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    async fn times_out_when_condition_never_holds() {
        let clock = TestClock::new(start());

        let task = {
            let clock = clock.clone();
            tokio::spawn(async move {
                await_condition(
                    &clock,
                    "the impossible",
                    Duration::from_secs(5),
                    &PollSchedule::default(),
                    || async { Ok::<u32, Boom>(0) },
                    |_| false,
                )
                .await
            })
        };

        for _ in 0..8 {
            clock.wait_for_sleepers(1).await;
            clock.advance(Duration::from_secs(10));
            if task.is_finished() {
                break;
            }
        }

        let result = task.await.unwrap();
        assert!(matches!(result, Err(AwaitError::Timeout { .. })));
    }

    #[test]
    async fn fetch_errors_propagate() {
        let clock = TestClock::new(start());
        let result = await_condition(
            &clock,
            "anything",
            Duration::from_secs(5),
            &PollSchedule::default(),
            || async { Err::<u32, Boom>(Boom) },
            |_| true,
        )
        .await;
        assert!(matches!(result, Err(AwaitError::Fetch { .. })));
    }
}
