//! Global counters for run loop activity.
//!
//! Incremented at the call site; [`Metrics::flush`] emits the current values
//! as one `info!` event at the end of an evaluation.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    cleanups: AtomicU64,
    processes_spawned: AtomicU64,
    spawn_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
            processes_spawned: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts", "counter incremented");
    }

    pub fn inc_failed_attempts(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "failed_attempts", "counter incremented");
    }

    pub fn inc_cleanups(&self) {
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cleanups", "counter incremented");
    }

    pub fn inc_processes_spawned(&self) {
        self.processes_spawned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "processes_spawned", "counter incremented");
    }

    pub fn inc_spawn_failures(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "spawn_failures", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            attempts = self.attempts(),
            failed_attempts = self.failed_attempts(),
            cleanups = self.cleanups(),
            processes_spawned = self.processes_spawned(),
            spawn_failures = self.spawn_failures(),
        );
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    pub fn cleanups(&self) -> u64 {
        self.cleanups.load(Ordering::Relaxed)
    }

    pub fn processes_spawned(&self) -> u64 {
        self.processes_spawned.load(Ordering::Relaxed)
    }

    pub fn spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }
}
