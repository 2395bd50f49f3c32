//! The Exchange Bus
//!
//! Owns the three registries, the unit table and the scheduler, and
//! exposes the whole surface a plugin shell programs against. The bus
//! mediates every cross-registry effect — a publish marks the observer
//! header and may re-queue it behind the walk cursor, a destroyed record
//! decrements the header's live count and may collect the header — while
//! holding at most one registry lock at any moment.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use plugbus::Bus;
//! use plugbus::observer::PRIORITY_DEFAULT;
//!
//! let bus = Arc::new(Bus::new());
//! let camera = bus.add_unit("camera");
//! let viewer = bus.add_unit("viewer");
//!
//! bus.subscribe("image", viewer, PRIORITY_DEFAULT, Arc::new(|_, record| {
//!     let _frame = record.payload::<Vec<u8>>();
//!     true
//! })).unwrap();
//!
//! bus.publish("image", camera, Arc::new(vec![0u8; 16]), None);
//! bus.run_cycle();
//! ```

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use crate::data::{DataRegistry, Payload, ReclaimFn, RecordHandle, RecordRef, ReleaseOutcome};
use crate::function::{CallableFn, FunctionEntry, FunctionHandle, FunctionRegistry, FunctionResult};
use crate::observer::{parse_subscription, ObserverRegistry, ObserverResult, ProcessFn};
use crate::scheduler::{BusStats, CyclePhase, CycleReport, HookFn, HookId, Scheduler};
use crate::unit::{UnitId, UnitTable};

/// Tunables for a bus instance.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Multiplier of the dependency-pass move cap (`factor * n * n + 1`).
    pub reorder_cap_factor: usize,
    /// Default wait used by [`Bus::wait_for_activity`].
    pub idle_wait: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            reorder_cap_factor: 1,
            idle_wait: Duration::from_millis(100),
        }
    }
}

/// The process-wide data-exchange core.
pub struct Bus {
    data: DataRegistry,
    observers: ObserverRegistry,
    functions: FunctionRegistry,
    units: UnitTable,
    scheduler: Scheduler,
    settings: BusSettings,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_settings(BusSettings::default())
    }

    pub fn with_settings(settings: BusSettings) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            data: DataRegistry::new(),
            observers: ObserverRegistry::with_reorder_cap_factor(settings.reorder_cap_factor),
            functions: FunctionRegistry::new(),
            units: UnitTable::new(),
            scheduler: Scheduler::new(),
            settings,
            wake_tx,
            wake_rx,
        }
    }

    // --- units ---

    /// Register a unit (plugin) and issue its identity.
    pub fn add_unit(&self, name: &str) -> UnitId {
        self.units.register(name)
    }

    /// Tear a unit down: drop its subscriptions and function entries and
    /// forget its identity. Records it published stay on the bus until
    /// they are released like any others.
    pub fn remove_unit(&self, id: UnitId) {
        let subs = self.observers.remove_subscriber(id);
        let funcs = self.functions.remove_owner(id);
        if self.units.remove(id).is_some() {
            debug!(
                "Removed unit {} ({} subscriptions, {} functions)",
                id, subs, funcs
            );
        }
    }

    /// Enable or disable a unit's function entries.
    pub fn set_unit_enabled(&self, id: UnitId, enabled: bool) -> bool {
        self.units.set_enabled(id, enabled)
    }

    pub fn unit_name(&self, id: UnitId) -> Option<String> {
        self.units.name_of(id)
    }

    // --- data surface ---

    /// Publish a payload under `name` on behalf of `producer`.
    ///
    /// The observer header for the name is flagged as holding new data; if
    /// the cycle in progress has already walked past the name, the header
    /// is re-queued at the tail so the data is still observed this cycle.
    /// Publishing from an unregistered producer is a wiring bug and fatal.
    pub fn publish(
        &self,
        name: &str,
        producer: UnitId,
        payload: Payload,
        reclaim: Option<ReclaimFn>,
    ) -> RecordHandle {
        assert!(
            self.units.is_registered(producer),
            "publish under '{}' from unregistered producer {}",
            name,
            producer
        );
        let handle = self.data.publish(name, producer, payload, reclaim);
        self.observers.mark_new_data(name);
        self.scheduler.stats.note_published();
        // A full slot already means a wake-up is pending.
        let _ = self.wake_tx.try_send(());
        handle
    }

    /// First matching record under `name`, refcount bumped.
    pub fn get(
        &self,
        name: &str,
        after: Option<RecordHandle>,
        producer: Option<UnitId>,
    ) -> Option<RecordRef> {
        self.data.get(name, after, false, producer)
    }

    /// Like [`get`](Self::get), restricted to records not yet seen by a
    /// cycle cleanup.
    pub fn get_new(
        &self,
        name: &str,
        after: Option<RecordHandle>,
        producer: Option<UnitId>,
    ) -> Option<RecordRef> {
        self.data.get(name, after, true, producer)
    }

    /// Every matching record under `name`, refcounts bumped.
    pub fn get_all_matching(
        &self,
        name: &str,
        after: Option<RecordHandle>,
        only_new: bool,
        producers: Option<&[UnitId]>,
    ) -> Vec<RecordRef> {
        self.data.get_all_matching(name, after, only_new, producers)
    }

    /// Take an additional reference on a held record.
    pub fn ref_record(&self, rec: &RecordRef) -> Option<u32> {
        self.data.ref_record(rec)
    }

    /// Drop one reference, updating observer bookkeeping if the record is
    /// destroyed.
    pub fn release(&self, rec: &RecordRef) -> ReleaseOutcome {
        let outcome = self.data.release(rec);
        if outcome == ReleaseOutcome::Destroyed {
            self.observers.records_destroyed(rec.name(), 1);
            self.scheduler.stats.note_destroyed(1);
        }
        outcome
    }

    /// Flip a record from floating to immediately-destructible.
    pub fn sink(&self, rec: &RecordRef) -> ReleaseOutcome {
        let outcome = self.data.sink(rec);
        if outcome == ReleaseOutcome::Destroyed {
            self.observers.records_destroyed(rec.name(), 1);
            self.scheduler.stats.note_destroyed(1);
        }
        outcome
    }

    // --- observer surface ---

    /// Subscribe a unit to a name, with an optional inline dependency list
    /// (`"image"`, `"image()"`, `"image(capture decoder)"`).
    pub fn subscribe(
        &self,
        subscription: &str,
        subscriber: UnitId,
        priority: i32,
        process: ProcessFn,
    ) -> ObserverResult<()> {
        let parsed = parse_subscription(subscription)?;
        let subscriber_name = self.units.name_of(subscriber).unwrap_or_else(|| {
            panic!("subscribe to '{}' from unregistered unit {}", parsed.name, subscriber)
        });
        self.observers
            .subscribe(parsed, subscriber, subscriber_name, priority, process)
    }

    /// Drop a unit's subscription to a name.
    pub fn unsubscribe(&self, name: &str, subscriber: UnitId) -> ObserverResult<()> {
        self.observers.unsubscribe(name, subscriber)
    }

    /// Force dependency re-resolution for a name before its next dispatch.
    pub fn mark_dirty(&self, name: &str) -> bool {
        self.observers.mark_dirty(name)
    }

    // --- function surface ---

    /// Register a callable under a name on behalf of `owner`.
    pub fn register_function(
        &self,
        name: &str,
        owner: UnitId,
        callable: CallableFn,
    ) -> FunctionHandle {
        let owner_name = self.units.name_of(owner).unwrap_or_else(|| {
            panic!("function '{}' registered by unregistered unit {}", name, owner)
        });
        self.functions.register(name, owner, &owner_name, callable)
    }

    /// Remove the first function under `name` owned by `owner`.
    pub fn unregister_function(&self, name: &str, owner: UnitId) -> FunctionResult<()> {
        self.functions.unregister(name, owner)
    }

    /// Next matching function under `name`, skipping disabled owners.
    pub fn lookup_function(
        &self,
        name: &str,
        after: Option<FunctionHandle>,
        owner_name: Option<&str>,
    ) -> Option<FunctionEntry> {
        self.functions
            .lookup(name, after, owner_name, |owner| self.units.is_enabled(owner))
    }

    // --- scheduler surface ---

    /// Register a hook to run before dispatch, every cycle.
    pub fn run_before(&self, hook: HookFn) -> HookId {
        self.scheduler.run_before(hook)
    }

    /// Register a hook to run after dispatch, every cycle.
    pub fn run_after(&self, hook: HookFn) -> HookId {
        self.scheduler.run_after(hook)
    }

    /// Remove a previously registered hook.
    pub fn unregister_hook(&self, id: HookId) -> bool {
        self.scheduler.unregister_hook(id)
    }

    /// Run one full cycle. The host calls this from its forever-loop.
    pub fn run_cycle(&self) -> CycleReport {
        self.scheduler.run_cycle(&self.data, &self.observers)
    }

    /// Park until a publish signals activity or the timeout passes.
    /// Purely advisory; returns whether a wake-up was received.
    pub fn wait_for_activity(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.settings.idle_wait);
        self.wake_rx.recv_timeout(timeout).is_ok()
    }

    pub fn current_phase(&self) -> CyclePhase {
        self.scheduler.current_phase()
    }

    pub fn stats(&self) -> BusStats {
        self.scheduler.stats()
    }

    /// The data registry, for direct inspection.
    pub fn data(&self) -> &DataRegistry {
        &self.data
    }

    /// The observer registry, for direct inspection.
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
