//! Global atomic counters for resolution observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    resolutions: AtomicU64,
    resolved: AtomicU64,
    unresolved: AtomicU64,
    verifications: AtomicU64,
    cache_writes: AtomicU64,
    fetch_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            resolutions: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
            cache_writes: AtomicU64::new(0),
            fetch_timeouts: AtomicU64::new(0),
        }
    }

    /// Count a finished top-level resolution and its outcome.
    pub fn record_resolution(&self, success: bool) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.resolved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.unresolved.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "resolutions", success, "counter incremented");
    }

    pub fn inc_verifications(&self) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "verifications", "counter incremented");
    }

    pub fn inc_cache_writes(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_writes", "counter incremented");
    }

    pub fn inc_fetch_timeouts(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetch_timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            resolutions = self.resolutions(),
            resolved = self.resolved(),
            unresolved = self.unresolved(),
            verifications = self.verifications(),
            cache_writes = self.cache_writes(),
            fetch_timeouts = self.fetch_timeouts(),
        );
    }

    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    pub fn unresolved(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }

    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    pub fn cache_writes(&self) -> u64 {
        self.cache_writes.load(Ordering::Relaxed)
    }

    pub fn fetch_timeouts(&self) -> u64 {
        self.fetch_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.resolutions.store(0, Ordering::Relaxed);
        self.resolved.store(0, Ordering::Relaxed);
        self.unresolved.store(0, Ordering::Relaxed);
        self.verifications.store(0, Ordering::Relaxed);
        self.cache_writes.store(0, Ordering::Relaxed);
        self.fetch_timeouts.store(0, Ordering::Relaxed);
    }
}
