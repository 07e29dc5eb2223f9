//! Script queue
//!
//! FIFO scheduler for submitted scripts. Submissions wait until a worker
//! (`run_worker`) claims them; each worker owns one `Engine` and runs its
//! submissions one at a time.
//!
//! ## Suspension
//!
//! When a run suspends, the submission stays in the queue marked
//! `Suspended` and its resumption key is registered. A spawned driver
//! completes the operation (tokio timer, `tokio::fs` read, or pause poll)
//! and calls [`ScriptQueue::resume`], which hands the completion back to the
//! owning worker. The worker only claims its next submission once the
//! current one has finished.

mod runner;

#[cfg(test)]
mod tests;

pub use runner::run_worker;
pub(crate) use runner::{complete_operation, on_blocking_pool};

use crate::config::{EngineConfig, QueueConfig};
use crate::executor::{Completion, ResumptionKey, RunOutcome};
use crate::host::Host;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};
use uuid::Uuid;

/* ===================== Submissions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    fn new() -> Self {
        SubmissionId(Uuid::new_v4())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Waiting,
    Running,
    Suspended,
}

/// Snapshot of a submission still held by the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionInfo {
    pub id: SubmissionId,
    pub name: String,
    pub status: SubmissionStatus,
    pub worker: Option<usize>,
    pub submitted_at: DateTime<Utc>,
}

/// Delivered to the submitter once a run finishes
#[derive(Debug, Clone)]
pub struct QueueResult {
    pub id: SubmissionId,
    pub outcome: RunOutcome,
    /// Lines printed by the run
    pub output: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct Submission {
    info: SubmissionInfo,
    source: String,
    reply: Option<oneshot::Sender<QueueResult>>,
}

/// Work handed to a worker by `claim`
#[derive(Debug)]
pub(crate) struct Claimed {
    pub id: SubmissionId,
    pub name: String,
    pub source: String,
}

/* ===================== Queue ===================== */

pub struct ScriptQueue {
    engine_config: EngineConfig,
    config: QueueConfig,
    host: Arc<dyn Host>,
    items: Mutex<VecDeque<Submission>>,
    pending: Mutex<HashMap<(SubmissionId, ResumptionKey), oneshot::Sender<Completion>>>,
    wakeup: Notify,
}

impl ScriptQueue {
    pub fn new(engine_config: EngineConfig, config: QueueConfig, host: Arc<dyn Host>) -> Self {
        Self {
            engine_config,
            config,
            host,
            items: Mutex::new(VecDeque::new()),
            pending: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
        }
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn host(&self) -> Arc<dyn Host> {
        self.host.clone()
    }

    /// Queue a script for execution.
    ///
    /// Fails when the queue has a capacity and that many submissions are
    /// already waiting.
    pub fn submit(
        &self,
        name: &str,
        source: impl Into<String>,
    ) -> Result<(SubmissionId, oneshot::Receiver<QueueResult>)> {
        let mut items = self.items();
        let waiting = items
            .iter()
            .filter(|s| s.info.status == SubmissionStatus::Waiting)
            .count();
        if self.config.capacity > 0 && waiting >= self.config.capacity {
            bail!("queue is full (capacity {})", self.config.capacity);
        }

        let id = SubmissionId::new();
        let (tx, rx) = oneshot::channel();
        items.push_back(Submission {
            info: SubmissionInfo {
                id,
                name: name.to_string(),
                status: SubmissionStatus::Waiting,
                worker: None,
                submitted_at: Utc::now(),
            },
            source: source.into(),
            reply: Some(tx),
        });
        drop(items);

        info!(%id, name, "submitted");
        self.wakeup.notify_waiters();
        Ok((id, rx))
    }

    /// Deliver the completion of a suspended operation.
    ///
    /// Returns false when nothing is waiting on that key, e.g. the run was
    /// already halted.
    pub fn resume(&self, id: SubmissionId, key: &ResumptionKey, completion: Completion) -> bool {
        let sender = self.pending().remove(&(id, key.clone()));
        match sender {
            Some(tx) => tx.send(completion).is_ok(),
            None => {
                debug!(%id, %key, "no pending operation");
                false
            }
        }
    }

    pub fn info(&self, id: SubmissionId) -> Option<SubmissionInfo> {
        self.items()
            .iter()
            .find(|s| s.info.id == id)
            .map(|s| s.info.clone())
    }

    pub fn snapshot(&self) -> Vec<SubmissionInfo> {
        self.items().iter().map(|s| s.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /* ===================== Worker side ===================== */

    /// Wait for the oldest waiting submission and mark it running
    pub(crate) async fn claim(&self, worker: usize) -> Claimed {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(claimed) = self.try_claim(worker) {
                return claimed;
            }
            notified.await;
        }
    }

    fn try_claim(&self, worker: usize) -> Option<Claimed> {
        let mut items = self.items();
        let item = items
            .iter_mut()
            .find(|s| s.info.status == SubmissionStatus::Waiting)?;
        item.info.status = SubmissionStatus::Running;
        item.info.worker = Some(worker);
        Some(Claimed {
            id: item.info.id,
            name: item.info.name.clone(),
            source: item.source.clone(),
        })
    }

    pub(crate) fn set_status(&self, id: SubmissionId, status: SubmissionStatus) {
        if let Some(item) = self.items().iter_mut().find(|s| s.info.id == id) {
            item.info.status = status;
        }
    }

    pub(crate) fn register(
        &self,
        id: SubmissionId,
        key: ResumptionKey,
    ) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        self.pending().insert((id, key), tx);
        rx
    }

    pub(crate) fn unregister(&self, id: SubmissionId, key: &ResumptionKey) {
        self.pending().remove(&(id, key.clone()));
    }

    /// Remove a finished submission and notify its submitter
    pub(crate) fn finish(&self, id: SubmissionId, outcome: RunOutcome, output: Vec<String>) {
        let removed = {
            let mut items = self.items();
            let index = items.iter().position(|s| s.info.id == id);
            index.and_then(|i| items.remove(i))
        };
        let Some(mut submission) = removed else {
            return;
        };

        let result = QueueResult {
            id,
            outcome,
            output,
            submitted_at: submission.info.submitted_at,
            finished_at: Utc::now(),
        };
        if let Some(reply) = submission.reply.take() {
            // submitter may have dropped its receiver
            let _ = reply.send(result);
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Submission>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(
        &self,
    ) -> MutexGuard<'_, HashMap<(SubmissionId, ResumptionKey), oneshot::Sender<Completion>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
