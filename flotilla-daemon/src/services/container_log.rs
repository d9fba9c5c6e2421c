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

use crate::db::RepoError;
use crate::repo::container_log::{ContainerLogRecord, ContainerLogRepo};
use chrono::{DateTime, TimeDelta, Utc};
use flotilla_common::clock::Clock;
use flotilla_common::model::log::{ContainerLogEntry, LogLevel};
use flotilla_common::model::{ContainerId, PlayerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Successive identical (container, level, message) entries inside this
/// window collapse to one row.
const DEDUP_WINDOW: TimeDelta = TimeDelta::seconds(60);

/// Append-only container log store. Writes are queued onto a single writer
/// task, which gives a total order per container id; queries go straight to
/// the repository.
pub struct ContainerLogService {
    tx: Mutex<Option<mpsc::UnboundedSender<ContainerLogEntry>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    repo: Arc<dyn ContainerLogRepo>,
    clock: Arc<dyn Clock>,
}

impl ContainerLogService {
    pub fn start(repo: Arc<dyn ContainerLogRepo>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ContainerLogEntry>();
        let writer_repo = repo.clone();
        let writer = tokio::spawn(async move {
            let mut last_written: HashMap<ContainerId, (LogLevel, String, DateTime<Utc>)> =
                HashMap::new();
            while let Some(entry) = rx.recv().await {
                if let Some((level, message, at)) = last_written.get(&entry.container_id) {
                    if *level == entry.level
                        && *message == entry.message
                        && entry.timestamp - *at < DEDUP_WINDOW
                    {
                        continue;
                    }
                }
                last_written.insert(
                    entry.container_id.clone(),
                    (entry.level, entry.message.clone(), entry.timestamp),
                );
                if let Err(err) = writer_repo.append(&ContainerLogRecord::from(&entry)).await {
                    error!(container = %entry.container_id, error = %err, "failed to persist container log entry");
                }
            }
        });
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            repo,
            clock,
        })
    }

    pub fn logger(
        self: &Arc<Self>,
        container_id: ContainerId,
        player_id: PlayerId,
    ) -> ContainerLogger {
        ContainerLogger {
            service: self.clone(),
            container_id,
            player_id,
        }
    }

    pub fn append(
        &self,
        container_id: &ContainerId,
        player_id: PlayerId,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let entry = ContainerLogEntry {
            container_id: container_id.clone(),
            player_id,
            level,
            message: message.into(),
            timestamp: self.clock.now(),
        };
        let tx = self.tx.lock().unwrap();
        if let Some(tx) = tx.as_ref() {
            if tx.send(entry).is_err() {
                warn!("container log writer is gone, dropping entry");
            }
        }
    }

    pub async fn query(
        &self,
        container_id: &ContainerId,
        level: Option<LogLevel>,
        since: Option<DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContainerLogEntry>, RepoError> {
        let records = self
            .repo
            .query(
                &container_id.0,
                level.map(|l| l.as_str()),
                since.as_ref(),
                limit,
                offset,
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|r| ContainerLogEntry::try_from(r).ok())
            .collect())
    }

    /// Stops accepting entries and waits for the queue to drain.
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap().take();
        drop(tx);
        let writer = self.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
    }
}

/// Handle bound to one container; what runners write their progress with.
#[derive(Clone)]
pub struct ContainerLogger {
    service: Arc<ContainerLogService>,
    container_id: ContainerId,
    player_id: PlayerId,
}

impl ContainerLogger {
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.service
            .append(&self.container_id, self.player_id, level, message)
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }
}
