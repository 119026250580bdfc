//! Result aggregation and early exit
//!
//! Workers never touch the running total. They report through a channel of
//! `WorkerSignal`s and a single control loop folds those into an
//! `Aggregator`, deciding after every signal whether to keep waiting.

use crate::error::{Result, TablesplitError};
use crate::statement::{StatementKind, Task};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of executing one task. Failures are kept as text; they are logged
/// by the worker and never retried.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub worker: usize,
    pub task: Task,
    pub result: std::result::Result<u64, String>,
}

#[derive(Debug, Clone)]
pub enum WorkerSignal {
    Outcome(Outcome),
    /// The worker found the queue empty. Sent after all of its outcomes.
    Finished { worker: usize },
    ConnectFailed { worker: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every worker drained the queue
    Drained,
    /// The running total met the threshold
    ThresholdReached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
    /// A worker could not connect; the run has no valid total
    Abort { worker: usize, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub worker: usize,
    pub shard: usize,
    pub kind: StatementKind,
    pub sql: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub worker: usize,
    pub shard: usize,
    pub sql: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: u64,
    pub elapsed_ms: u64,
    pub workers: usize,
    pub finished_workers: usize,
    pub stop: StopReason,
    /// Successful outcomes in arrival order
    pub outcomes: Vec<TaskOutcome>,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Control-loop state. `threshold == 0` means run to completion.
#[derive(Debug)]
pub struct Aggregator {
    workers: usize,
    threshold: u64,
    finished: usize,
    total: u64,
    outcomes: Vec<TaskOutcome>,
    failures: Vec<TaskFailure>,
}

impl Aggregator {
    pub fn new(workers: usize, threshold: u64) -> Self {
        Self {
            workers,
            threshold,
            finished: 0,
            total: 0,
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn finished_workers(&self) -> usize {
        self.finished
    }

    /// Fold one signal into the state and decide whether to stop.
    pub fn observe(&mut self, signal: WorkerSignal) -> Step {
        match signal {
            WorkerSignal::Finished { worker } => {
                self.finished += 1;
                debug!(worker, finished = self.finished, "worker finished");
            }
            WorkerSignal::Outcome(Outcome {
                worker,
                task,
                result: Ok(count),
            }) => {
                self.total = self.total.saturating_add(count);
                self.outcomes.push(TaskOutcome {
                    worker,
                    shard: task.shard,
                    kind: task.kind,
                    sql: task.sql,
                    count,
                });
            }
            WorkerSignal::Outcome(Outcome {
                worker,
                task,
                result: Err(error),
            }) => {
                self.failures.push(TaskFailure {
                    worker,
                    shard: task.shard,
                    sql: task.sql,
                    error,
                });
            }
            WorkerSignal::ConnectFailed { worker, message } => {
                return Step::Abort { worker, message };
            }
        }

        if self.finished >= self.workers {
            return Step::Stop(StopReason::Drained);
        }
        if self.threshold > 0 && self.total >= self.threshold {
            return Step::Stop(StopReason::ThresholdReached);
        }
        Step::Continue
    }

    /// Drive the control loop until a stop condition holds. Returns as soon
    /// as it does; signals still in flight are left unconsumed.
    pub async fn collect(
        mut self,
        signals: &mut mpsc::Receiver<WorkerSignal>,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport> {
        let stop = loop {
            if self.workers == 0 {
                break StopReason::Drained;
            }
            let Some(signal) = signals.recv().await else {
                return Err(TablesplitError::Execution(format!(
                    "worker channel closed with {} of {} workers finished",
                    self.finished, self.workers
                )));
            };
            match self.observe(signal) {
                Step::Continue => {}
                Step::Stop(reason) => break reason,
                Step::Abort { worker, message } => {
                    return Err(TablesplitError::Connect { worker, message });
                }
            }
        };

        let report = self.into_report(stop, started, started_at);
        if report.failed() > 0 {
            warn!(failed = report.failed(), "some tasks failed and were left out of the total");
        }
        info!(
            run_id = %report.run_id,
            total = report.total,
            elapsed_ms = report.elapsed_ms,
            stop = ?report.stop,
            finished_workers = report.finished_workers,
            "run complete"
        );
        Ok(report)
    }

    pub fn into_report(self, stop: StopReason, started: Instant, started_at: DateTime<Utc>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at,
            total: self.total,
            elapsed_ms: elapsed_millis(started.elapsed()),
            workers: self.workers,
            finished_workers: self.finished,
            stop,
            outcomes: self.outcomes,
            failures: self.failures,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
