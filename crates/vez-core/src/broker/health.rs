use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Maximum number of recent error strings retained; the oldest is evicted
/// first.
pub const RECENT_ERRORS_CAP: usize = 100;

/// Running broker counters. Owned by one broker instance (no process-wide
/// statics), incremented by the worker threads and read concurrently by
/// monitoring callers. Simple counters are atomics; the error ring needs the
/// mutex.
#[derive(Default)]
pub(crate) struct HealthState {
    processed: AtomicU64,
    failed: AtomicU64,
    delayed: AtomicUsize,
    last_processed: Mutex<Option<DateTime<Utc>>>,
    recent_errors: Mutex<VecDeque<String>>,
}

impl HealthState {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some(Utc::now());
    }

    /// Record a terminal dead-letter. Per-attempt failures only reach the
    /// error ring; `failed` counts envelopes abandoned after their budget.
    pub(crate) fn record_dead_letter(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, message: String) {
        let mut ring = self
            .recent_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if ring.len() == RECENT_ERRORS_CAP {
            ring.pop_front();
        }
        ring.push_back(message);
    }

    pub(crate) fn delay_added(&self) {
        self.delayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delay_removed(&self) {
        self.delayed.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn delayed(&self) -> usize {
        self.delayed.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, pending: usize) -> HealthStatus {
        let last_processed = *self
            .last_processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let recent_errors = self
            .recent_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        HealthStatus {
            pending,
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_processed,
            recent_errors,
        }
    }
}

/// Point-in-time broker health for monitoring endpoints. `pending` is
/// approximate — lane depths and the delay store are sampled, not read under
/// one lock.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub pending: usize,
    pub processed: u64,
    pub failed: u64,
    pub last_processed: Option<DateTime<Utc>>,
    /// Most recent error strings, oldest first, capped at
    /// [`RECENT_ERRORS_CAP`].
    pub recent_errors: Vec<String>,
}
