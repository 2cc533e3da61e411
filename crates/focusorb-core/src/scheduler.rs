//! Repeating-task scheduling.
//!
//! Each task ticks on its own period; a task's ticks never overlap, and tasks
//! make no ordering promises to one another. Production runs on tokio
//! intervals; tests drive a [`ManualScheduler`] against a [`ManualClock`].

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::clock::{Clock, ManualClock};

#[async_trait]
pub trait RepeatingTask: Send {
    fn name(&self) -> &'static str;

    /// Run one tick. Errors are logged and the task keeps its schedule.
    async fn run_once(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

pub trait Scheduler {
    /// Start `task`; its first tick happens one `period` from now
    fn start(&mut self, period: Duration, task: Box<dyn RepeatingTask>) -> TaskId;

    /// Returns false if `id` was not running
    fn stop(&mut self, id: TaskId) -> bool;

    fn stop_all(&mut self);

    fn active_tasks(&self) -> usize;
}

async fn run_tick(task: &mut dyn RepeatingTask) {
    if let Err(e) = task.run_once().await {
        log::warn!("{} tick failed: {e:#}", task.name());
    }
}

/// Tokio-backed scheduler; dropping it cancels every task
#[derive(Debug, Default)]
pub struct TokioScheduler {
    next_id: u64,
    handles: HashMap<TaskId, JoinHandle<()>>,
}

impl TokioScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn start(&mut self, period: Duration, mut task: Box<dyn RepeatingTask>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_tick(task.as_mut()).await;
            }
        });

        self.handles.insert(id, handle);
        id
    }

    fn stop(&mut self, id: TaskId) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn stop_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    fn active_tasks(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct ManualEntry {
    id: TaskId,
    period_ms: u64,
    next_due_ms: u64,
    task: Box<dyn RepeatingTask>,
}

/// Deterministic scheduler that runs ticks as virtual time advances
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    next_id: u64,
    entries: Vec<ManualEntry>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Move the clock forward by `by`, running every tick that falls due,
    /// in due-time order
    pub async fn advance(&mut self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let target = self.clock.now_ms().saturating_add(by_ms);

        loop {
            let due = self
                .entries
                .iter_mut()
                .filter(|entry| entry.next_due_ms <= target)
                .min_by_key(|entry| (entry.next_due_ms, entry.id));
            let Some(entry) = due else {
                break;
            };

            self.clock.advance_to(entry.next_due_ms);
            entry.next_due_ms += entry.period_ms;
            run_tick(entry.task.as_mut()).await;
        }

        self.clock.advance_to(target);
    }
}

impl Scheduler for ManualScheduler {
    fn start(&mut self, period: Duration, task: Box<dyn RepeatingTask>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
        self.entries.push(ManualEntry {
            id,
            period_ms,
            next_due_ms: self.clock.now_ms().saturating_add(period_ms),
            task,
        });
        id
    }

    fn stop(&mut self, id: TaskId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    fn stop_all(&mut self) {
        self.entries.clear();
    }

    fn active_tasks(&self) -> usize {
        self.entries.len()
    }
}
