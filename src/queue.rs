//! Shared task queue drained by the worker pool
//!
//! The queue is filled once at construction and only ever shrinks. There is
//! deliberately no `push`: workers start after the last task is enqueued.

use crate::statement::Task;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into()),
        }
    }

    /// Pop the front task. Each task is handed to exactly one caller.
    pub fn try_take(&self) -> Option<Task> {
        // A poisoned lock only means another worker panicked mid-pop; the
        // deque itself is still consistent.
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        match self.tasks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Task> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
