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

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// The process-wide time source. Every TTL, backoff, timeout and periodic
/// task reads time through this trait so that tests can drive it
/// deterministically.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for the given duration. Cancellable by dropping the future.
    async fn sleep(&self, duration: Duration);

    /// Returns a one-shot signal that fires after the given duration.
    fn after(&self, duration: Duration) -> oneshot::Receiver<()>;
}

/// Wall-clock time backed by tokio timers.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }

    fn after(&self, duration: Duration) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(());
        });
        rx
    }
}

struct Sleeper {
    wake_at: DateTime<Utc>,
    tx: oneshot::Sender<()>,
}

struct TestClockState {
    now: DateTime<Utc>,
    sleepers: Vec<Sleeper>,
}

/// Controllable clock for tests. Virtual time only moves when `advance` or
/// `set` is called; due sleepers are woken synchronously from those calls.
#[derive(Clone)]
pub struct TestClock {
    state: Arc<Mutex<TestClockState>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TestClockState {
                now: start,
                sleepers: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now += TimeDelta::from_std(duration).expect("duration out of range");
        let now = state.now;
        let due: Vec<Sleeper> = {
            let (due, pending) = std::mem::take(&mut state.sleepers)
                .into_iter()
                .partition(|s| s.wake_at <= now);
            state.sleepers = pending;
            due
        };
        drop(state);
        for sleeper in due {
            let _ = sleeper.tx.send(());
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let current = self.state.lock().unwrap().now;
        if now > current {
            let delta = (now - current).to_std().expect("time went backwards");
            self.advance(delta);
        }
    }

    /// Number of tasks currently parked in `sleep`/`after`. Tests poll this
    /// to know when the code under test has reached its next suspension.
    pub fn sleeper_count(&self) -> usize {
        self.state.lock().unwrap().sleepers.len()
    }

    /// Yields until at least `n` sleepers are parked on this clock.
    pub async fn wait_for_sleepers(&self, n: usize) {
        while self.sleeper_count() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let _ = self.after(duration).await;
    }

    fn after(&self, duration: Duration) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        let wake_at = state.now + TimeDelta::from_std(duration).expect("duration out of range");
        if wake_at <= state.now {
            let _ = tx.send(());
        } else {
            state.sleepers.push(Sleeper { wake_at, tx });
        }
        rx
    }
}
