//! Fixed-size worker pool
//!
//! `WorkerPool::run` spawns exactly `workers` tokio tasks over a pre-filled
//! `TaskQueue`. Each worker holds one connection for its whole life, takes
//! tasks until the queue is empty and reports one signal per executed task.
//!
//! Stopping early (threshold reached, or a sibling failed to connect) raises
//! a shared `CancelFlag`. Workers check it between tasks only, so a task that
//! was already taken still runs to completion; its outcome is dropped.

use crate::aggregator::{Aggregator, Outcome, RunReport, WorkerSignal};
use crate::error::Result;
use crate::executor::Connector;
use crate::queue::TaskQueue;
use crate::statement::{StatementKind, Task};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Set once, observed by every worker between tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct WorkerPool {
    workers: usize,
    connector: Arc<dyn Connector>,
}

impl WorkerPool {
    pub fn new(workers: usize, connector: Arc<dyn Connector>) -> Self {
        Self { workers, connector }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers over `queue`. Signals arrive on the returned receiver;
    /// the channel holds one slot per worker.
    pub fn spawn(
        &self,
        queue: Arc<TaskQueue>,
        cancel: CancelFlag,
    ) -> (mpsc::Receiver<WorkerSignal>, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(self.workers.max(1));
        let handles = (0..self.workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&self.connector),
                    Arc::clone(&queue),
                    cancel.clone(),
                    tx.clone(),
                ))
            })
            .collect();
        (rx, handles)
    }

    /// Execute `tasks` and aggregate counts. A non-zero `threshold` returns as
    /// soon as the running total reaches it.
    pub async fn run(&self, tasks: Vec<Task>, threshold: u64) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let queue = Arc::new(TaskQueue::new(tasks));
        let cancel = CancelFlag::new();

        info!(
            workers = self.workers,
            tasks = queue.len(),
            threshold,
            "dispatching tasks"
        );

        // Handles are dropped: workers still busy after an early stop are
        // detached and wind down on their own.
        let (mut signals, _handles) = self.spawn(Arc::clone(&queue), cancel.clone());
        let result = Aggregator::new(self.workers, threshold)
            .collect(&mut signals, started, started_at)
            .await;

        // No-op after a natural drain; otherwise stops the remaining workers
        // from taking further tasks.
        cancel.cancel();
        if !queue.is_empty() {
            debug!(remaining = queue.len(), "tasks left undispatched");
        }
        result
    }
}

async fn worker_loop(
    worker: usize,
    connector: Arc<dyn Connector>,
    queue: Arc<TaskQueue>,
    cancel: CancelFlag,
    signals: mpsc::Sender<WorkerSignal>,
) {
    let mut conn = match connector.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(worker, error = %e, "failed to acquire connection");
            let _ = signals
                .send(WorkerSignal::ConnectFailed {
                    worker,
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };
    debug!(worker, "worker connected");

    let mut executed = 0usize;
    loop {
        if cancel.is_cancelled() {
            debug!(worker, executed, "worker cancelled");
            break;
        }

        let Some(task) = queue.try_take() else {
            let _ = signals.send(WorkerSignal::Finished { worker }).await;
            debug!(worker, executed, "queue drained");
            break;
        };

        let result = match task.kind {
            StatementKind::Count => conn.count(&task.sql).await,
            StatementKind::Materialize | StatementKind::Index => conn.execute(&task.sql).await,
        };
        executed += 1;

        let result = match result {
            Ok(count) => {
                debug!(worker, shard = task.shard, kind = %task.kind, count, "task done");
                Ok(count)
            }
            Err(e) => {
                warn!(worker, shard = task.shard, kind = %task.kind, error = %e, sql = %task.sql, "task failed");
                Err(e.to_string())
            }
        };

        let outcome = Outcome {
            worker,
            task,
            result,
        };
        if signals.send(WorkerSignal::Outcome(outcome)).await.is_err() {
            // Collector already returned.
            debug!(worker, executed, "collector gone, stopping");
            break;
        }
    }

    if let Err(e) = conn.close().await {
        debug!(worker, error = %e, "error closing connection");
    }
}
