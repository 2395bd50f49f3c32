//! Exchange Statistics
//!
//! Counters maintained across cycles, exposed as cloneable snapshots.

use parking_lot::Mutex;

/// Statistics about the exchange since startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Total cycles completed
    pub cycles_completed: u64,

    /// Total records published
    pub records_published: u64,

    /// Total (record, subscriber) deliveries made
    pub records_delivered: u64,

    /// Total records destroyed (immediate and swept)
    pub records_destroyed: u64,

    /// Cycles cut short by a subscriber returning false
    pub dispatch_cancellations: u64,

    /// Dependency resolutions that hit the move cap
    pub reorder_give_ups: u64,
}

#[derive(Default)]
pub(crate) struct StatsTracker {
    inner: Mutex<BusStats>,
}

impl StatsTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        self.inner.lock().clone()
    }

    pub(crate) fn note_published(&self) {
        self.inner.lock().records_published += 1;
    }

    pub(crate) fn note_destroyed(&self, count: u64) {
        self.inner.lock().records_destroyed += count;
    }

    pub(crate) fn note_cycle(&self, delivered: u64, cancelled: bool, reorder_give_ups: u64) {
        let mut stats = self.inner.lock();
        stats.cycles_completed += 1;
        stats.records_delivered += delivered;
        if cancelled {
            stats.dispatch_cancellations += 1;
        }
        stats.reorder_give_ups += reorder_give_ups;
    }
}
