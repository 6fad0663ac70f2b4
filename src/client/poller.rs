//! Cancellable status poller
//!
//! Deadline-based rather than sleep-based: the owner asks `is_due(now)` on
//! its own schedule, so tests drive the poller with synthetic instants and
//! never sleep. Exactly one poller exists per in-flight run.

use crate::types::TaskId;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct StatusPoller {
    task_id: TaskId,
    interval: Duration,
    /// Consecutive failed checks tolerated before abandoning
    retry_budget: u32,
    consecutive_errors: u32,
    next_due: Instant,
    stopped: bool,
}

impl StatusPoller {
    /// Create a poller whose first check is due immediately
    pub fn new(task_id: TaskId, interval: Duration, retry_budget: u32) -> Self {
        Self::starting_at(task_id, interval, retry_budget, Instant::now())
    }

    /// Create a poller with an explicit start instant
    pub fn starting_at(
        task_id: TaskId,
        interval: Duration,
        retry_budget: u32,
        now: Instant,
    ) -> Self {
        Self {
            task_id,
            interval,
            retry_budget,
            consecutive_errors: 0,
            next_due: now,
            stopped: false,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Whether a status check should happen now
    ///
    /// A stopped poller is never due.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.stopped && now >= self.next_due
    }

    /// Record a successful status check and schedule the next one
    pub fn record_success(&mut self, now: Instant) {
        self.consecutive_errors = 0;
        self.next_due = now + self.interval;
    }

    /// Record a failed status check
    ///
    /// Returns the attempt count when the retry budget is exhausted; the
    /// poller stops itself in that case.
    pub fn record_error(&mut self, now: Instant) -> Option<u32> {
        self.consecutive_errors += 1;
        self.next_due = now + self.interval;
        if self.consecutive_errors >= self.retry_budget {
            self.stopped = true;
            Some(self.consecutive_errors)
        } else {
            None
        }
    }

    /// Stop the poller; idempotent and final
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
