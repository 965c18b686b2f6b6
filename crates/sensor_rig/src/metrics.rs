//! Sensor rig metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between the manager and every rider tap
#[derive(Debug, Default)]
pub struct RigMetrics {
    /// Measurements accepted into a queue
    pub payloads_received: AtomicU64,

    /// Measurements refused by a closed gate
    pub payloads_dropped: AtomicU64,

    /// Channel drains that hit the deadline
    pub drain_timeouts: AtomicU64,

    /// Sensors currently mounted
    pub attached_sensors: AtomicUsize,
}

impl RigMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.payloads_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.payloads_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drain_timeout(&self) {
        self.drain_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_attached_sensors(&self, count: usize) {
        self.attached_sensors.store(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RigMetricsSnapshot {
        RigMetricsSnapshot {
            payloads_received: self.payloads_received.load(Ordering::Relaxed),
            payloads_dropped: self.payloads_dropped.load(Ordering::Relaxed),
            drain_timeouts: self.drain_timeouts.load(Ordering::Relaxed),
            attached_sensors: self.attached_sensors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RigMetricsSnapshot {
    pub payloads_received: u64,
    pub payloads_dropped: u64,
    pub drain_timeouts: u64,
    pub attached_sensors: usize,
}
