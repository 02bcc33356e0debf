//! Process-wide counters for dropped samples and connection churn.
//!
//! Nothing the bridge drops is reported back to the device, so these counters
//! (together with the log) are the only way to observe losses.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters. Cheap to update from any task.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    pub sessions_accepted: AtomicU64,
    pub sessions_closed_clean: AtomicU64,
    pub sessions_closed_error: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub samples_published: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub inlet_forwarded: AtomicU64,
    pub inlet_dropped: AtomicU64,
    pub supervisor_faults: AtomicU64,
}

/// Point-in-time copy of [`BridgeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_accepted: u64,
    pub sessions_closed_clean: u64,
    pub sessions_closed_error: u64,
    pub frames_decoded: u64,
    pub samples_published: u64,
    pub samples_dropped: u64,
    pub inlet_forwarded: u64,
    pub inlet_dropped: u64,
    pub supervisor_faults: u64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            sessions_accepted: load(&self.sessions_accepted),
            sessions_closed_clean: load(&self.sessions_closed_clean),
            sessions_closed_error: load(&self.sessions_closed_error),
            frames_decoded: load(&self.frames_decoded),
            samples_published: load(&self.samples_published),
            samples_dropped: load(&self.samples_dropped),
            inlet_forwarded: load(&self.inlet_forwarded),
            inlet_dropped: load(&self.inlet_dropped),
            supervisor_faults: load(&self.supervisor_faults),
        }
    }

    /// Sessions that have ended, whatever the reason.
    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed_clean.load(Ordering::Relaxed)
            + self.sessions_closed_error.load(Ordering::Relaxed)
    }
}
