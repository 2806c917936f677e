//! Per-session metrics
//!
//! Atomic counters, readable from any thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one session
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Scans delivered by the driver
    pub scans: AtomicU64,
    /// Samples that passed filtering
    pub samples_kept: AtomicU64,
    /// Samples dropped as invalid, out of range or below the noise floor
    pub samples_dropped: AtomicU64,
    /// Read cycles that ended without data (normal when idle)
    pub no_data: AtomicU64,
    /// Read cycles that failed
    pub errors: AtomicU64,
    /// Successful reconnects
    pub reconnects: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            samples_kept: self.samples_kept.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.scans.store(0, Ordering::Relaxed);
        self.samples_kept.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.no_data.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self, kept: usize, dropped: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.samples_kept.fetch_add(kept as u64, Ordering::Relaxed);
        self.samples_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_no_data(&self) {
        self.no_data.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub scans: u64,
    pub samples_kept: u64,
    pub samples_dropped: u64,
    pub no_data: u64,
    pub errors: u64,
    pub reconnects: u64,
}

impl MetricsSnapshot {
    /// Fraction of decoded samples that were dropped (0.0 when none seen)
    pub fn drop_ratio(&self) -> f64 {
        let total = self.samples_kept + self.samples_dropped;
        if total == 0 {
            0.0
        } else {
            self.samples_dropped as f64 / total as f64
        }
    }
}
