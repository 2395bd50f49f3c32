//! Cycle Scheduler
//!
//! The single driver of the exchange. One cycle runs the "before" hooks,
//! walks the observer name list dispatching every name with new data,
//! runs the "after" hooks, then sweeps unreferenced records and clears the
//! new-data flags. Only one cycle can be current at a time; the host calls
//! [`Scheduler::run_cycle`] in its own forever-loop.
//!
//! Dispatch is synchronous: subscriber callbacks run on the calling thread
//! with no registry lock held, so a callback may publish, look data up or
//! change subscriptions freely — and a callback that blocks, blocks the
//! whole loop. A callback returning `false` cancels the remainder of
//! dispatch for the cycle; a callback that panics takes the process down,
//! which is a deliberate limitation, not an accident.

pub mod hooks;
pub mod stats;

pub use hooks::{HookFn, HookId};
pub use stats::BusStats;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::data::{DataRegistry, RecordHandle, ReleaseOutcome};
use crate::observer::ObserverRegistry;
use hooks::HookLists;
use stats::StatsTracker;

/// Phase of the cycle state machine. Each cycle ends where the next one
/// starts: `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    PreHooks,
    Dispatching,
    PostHooks,
    Cleanup,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Sequence number of the cycle, starting at 1.
    pub cycle: u64,
    /// (record, subscriber) deliveries made, the cancelling one included.
    pub delivered: u64,
    /// Records destroyed during dispatch and by the sweep.
    pub destroyed: usize,
    /// Whether a subscriber cancelled the cycle.
    pub cancelled: bool,
}

/// The cycle driver.
pub struct Scheduler {
    hooks: HookLists,
    phase: Mutex<CyclePhase>,
    cycle_guard: Mutex<()>,
    cycle_counter: AtomicU64,
    pub(crate) stats: StatsTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            hooks: HookLists::new(),
            phase: Mutex::new(CyclePhase::Idle),
            cycle_guard: Mutex::new(()),
            cycle_counter: AtomicU64::new(0),
            stats: StatsTracker::new(),
        }
    }

    /// Register a hook to run before dispatch, every cycle.
    pub fn run_before(&self, hook: HookFn) -> HookId {
        self.hooks.add_before(hook)
    }

    /// Register a hook to run after dispatch, every cycle.
    pub fn run_after(&self, hook: HookFn) -> HookId {
        self.hooks.add_after(hook)
    }

    /// Remove a hook from whichever list holds it.
    pub fn unregister_hook(&self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    pub fn current_phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    pub fn stats(&self) -> BusStats {
        self.stats.snapshot()
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock() = phase;
    }

    /// Run one full cycle against the given registries.
    ///
    /// Blocks if another thread is mid-cycle; must not be called from
    /// within a subscriber or hook callback.
    pub fn run_cycle(&self, data: &DataRegistry, observers: &ObserverRegistry) -> CycleReport {
        let _guard = self.cycle_guard.lock();
        let cycle = self.cycle_counter.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Cycle {} starting", cycle);

        self.set_phase(CyclePhase::PreHooks);
        for hook in self.hooks.before_snapshot() {
            hook();
        }

        self.set_phase(CyclePhase::Dispatching);
        let (delivered, cancelled, reorder_give_ups, destroyed_in_dispatch) =
            self.dispatch(data, observers);

        self.set_phase(CyclePhase::PostHooks);
        for hook in self.hooks.after_snapshot() {
            hook();
        }

        self.set_phase(CyclePhase::Cleanup);
        let report = data.sweep_cycle_end();
        for (name, count) in &report.destroyed {
            observers.records_destroyed(name, *count);
        }
        self.stats.note_destroyed(report.total_destroyed() as u64);
        observers.finish_cycle();

        self.set_phase(CyclePhase::Idle);
        self.stats.note_cycle(delivered, cancelled, reorder_give_ups);
        trace!(
            "Cycle {} complete: {} delivered, {} destroyed",
            cycle,
            delivered,
            destroyed_in_dispatch + report.total_destroyed()
        );
        CycleReport {
            cycle,
            delivered,
            destroyed: destroyed_in_dispatch + report.total_destroyed(),
            cancelled,
        }
    }

    /// Walk the observer list and deliver new records name by name.
    ///
    /// Each visit fetches the name's new records past the per-name cursor;
    /// records published into the name mid-visit move the header to the
    /// tail of the walk, so the revisit picks up exactly the ones not yet
    /// delivered. Returns (delivered, cancelled, reorder give-ups,
    /// destroyed during dispatch).
    fn dispatch(
        &self,
        data: &DataRegistry,
        observers: &ObserverRegistry,
    ) -> (u64, bool, u64, usize) {
        observers.begin_walk();
        let mut delivered = 0u64;
        let mut cancelled = false;
        let mut reorder_give_ups = 0u64;
        let mut destroyed = 0usize;
        let mut cursors: HashMap<String, RecordHandle> = HashMap::new();

        while let Some(target) = observers.next_pending() {
            if target.reorder_gave_up {
                reorder_give_ups += 1;
            }
            let after = cursors.get(&target.name).copied();
            let records = data.get_all_matching(&target.name, after, true, None);
            for record in &records {
                if !cancelled {
                    for (subscriber, process) in &target.entries {
                        delivered += 1;
                        if !process(&target.name, record) {
                            debug!(
                                "Cycle dispatch cancelled by {} during '{}'",
                                subscriber, target.name
                            );
                            cancelled = true;
                            break;
                        }
                    }
                    cursors.insert(target.name.clone(), record.handle());
                }
                if data.release(record) == ReleaseOutcome::Destroyed {
                    observers.records_destroyed(&target.name, 1);
                    destroyed += 1;
                    self.stats.note_destroyed(1);
                }
            }
            if cancelled {
                break;
            }
        }
        (delivered, cancelled, reorder_give_ups, destroyed)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
