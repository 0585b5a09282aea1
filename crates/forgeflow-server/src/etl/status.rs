//! Process-wide batch run status
//!
//! The idle-to-running transition happens under one lock acquisition, so two
//! concurrent triggers can never both start a batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const ABORTED_MESSAGE: &str = "batch aborted before completion";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchRunStatus {
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a batch is already running")]
pub struct AlreadyRunning;

#[derive(Debug, Default)]
pub struct RunStatusTracker {
    inner: Mutex<BatchRunStatus>,
}

impl RunStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BatchRunStatus {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Mark a batch as running, or refuse if one already is
    pub fn try_start(self: &Arc<Self>) -> Result<RunGuard, AlreadyRunning> {
        let mut status = self.lock();
        if status.running {
            return Err(AlreadyRunning);
        }
        status.running = true;
        status.last_run = Some(Utc::now());
        drop(status);

        Ok(RunGuard {
            tracker: Arc::clone(self),
            settled: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BatchRunStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held for the lifetime of one batch. Dropping it returns the tracker to
/// idle; a guard dropped without being settled records an abort.
#[derive(Debug)]
pub struct RunGuard {
    tracker: Arc<RunStatusTracker>,
    settled: bool,
}

impl RunGuard {
    pub fn succeed(mut self) {
        let mut status = self.tracker.lock();
        status.last_success = Some(Utc::now());
        status.last_error = None;
        drop(status);
        self.settled = true;
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.tracker.lock().last_error = Some(message.into());
        self.settled = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut status = self.tracker.lock();
        if !self.settled {
            status.last_error = Some(ABORTED_MESSAGE.to_string());
        }
        status.running = false;
    }
}
