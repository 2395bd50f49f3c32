//! Observer Registry
//!
//! Per-name bookkeeping for dispatch: each observed name has a header
//! carrying the ordered subscriber list, a new-data flag, a reorder flag
//! and a live-record count. Headers sit in a stable name list that the
//! scheduler walks once per cycle; the walk cursor lives under the same
//! lock so a concurrent publish can tell whether its name was already
//! passed and must be moved to the tail for same-cycle delivery.
//!
//! Callbacks are never invoked from here; dispatch works on snapshots so
//! subscribe/unsubscribe during a walk can never invalidate an iteration
//! in progress.

use std::collections::HashMap;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::observer::error::{ObserverError, ObserverResult};
use crate::observer::list::{ObserverEntry, ObserverList, ProcessFn, ReorderOutcome};
use crate::observer::subscription::Subscription;
use crate::unit::UnitId;

/// Snapshot handed to the scheduler for one name's dispatch.
pub(crate) struct DispatchTarget {
    pub(crate) name: String,
    pub(crate) entries: Vec<(UnitId, ProcessFn)>,
    pub(crate) reorder_gave_up: bool,
}

struct Header {
    list: ObserverList,
    has_new_data: bool,
    needs_reorder: bool,
    live_records: usize,
}

impl Header {
    fn new() -> Self {
        Self {
            list: ObserverList::new(),
            has_new_data: false,
            needs_reorder: false,
            live_records: 0,
        }
    }

    fn is_garbage(&self) -> bool {
        self.list.is_empty() && self.live_records == 0
    }
}

#[derive(Default)]
struct ObserverInner {
    headers: HashMap<String, Header>,
    /// Stable walk order of the observed names.
    order: Vec<String>,
    /// Walk position of the cycle in progress; `None` while idle.
    cursor: Option<usize>,
}

impl ObserverInner {
    fn ensure_header(&mut self, name: &str) {
        if !self.headers.contains_key(name) {
            self.headers.insert(name.to_string(), Header::new());
            self.order.push(name.to_string());
        }
    }

    /// Drop a header that has neither entries nor live records.
    fn collect_garbage(&mut self, name: &str) {
        let garbage = self.headers.get(name).map(Header::is_garbage).unwrap_or(false);
        if !garbage {
            return;
        }
        self.headers.remove(name);
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            self.order.remove(pos);
            if let Some(cursor) = self.cursor {
                if pos < cursor {
                    self.cursor = Some(cursor - 1);
                }
            }
        }
        trace!("Collected empty header '{}'", name);
    }
}

/// The registry of subscriber lists, one per observed name.
pub struct ObserverRegistry {
    inner: Mutex<ObserverInner>,
    reorder_cap_factor: usize,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::with_reorder_cap_factor(1)
    }

    /// The bubble pass gives up after `factor * n * n + 1` moves for a list
    /// of n entries.
    pub fn with_reorder_cap_factor(factor: usize) -> Self {
        Self {
            inner: Mutex::new(ObserverInner::default()),
            reorder_cap_factor: factor.max(1),
        }
    }

    /// Add a subscriber to a name's list, creating the header if absent.
    pub fn subscribe(
        &self,
        subscription: Subscription,
        subscriber: UnitId,
        subscriber_name: String,
        priority: i32,
        process: ProcessFn,
    ) -> ObserverResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_header(&subscription.name);
        let has_deps = !subscription.depends_on.is_empty();
        let header = inner
            .headers
            .get_mut(&subscription.name)
            .expect("header just ensured");
        if header.list.contains(subscriber) {
            return Err(ObserverError::duplicate_subscription(
                subscription.name,
                subscriber_name,
            ));
        }
        header.list.insert(ObserverEntry {
            subscriber,
            subscriber_name: subscriber_name.clone(),
            priority,
            depends_on: subscription.depends_on,
            process,
        });
        if has_deps {
            header.needs_reorder = true;
        }
        debug!(
            "Subscribed '{}' to '{}' (priority {})",
            subscriber_name, subscription.name, priority
        );
        Ok(())
    }

    /// Remove a subscriber from a name's list, collecting the header if it
    /// ends up with no entries and no live records.
    pub fn unsubscribe(&self, name: &str, subscriber: UnitId) -> ObserverResult<()> {
        let mut inner = self.inner.lock();
        let removed = inner
            .headers
            .get_mut(name)
            .and_then(|header| header.list.remove(subscriber));
        match removed {
            Some(entry) => {
                debug!("Unsubscribed '{}' from '{}'", entry.subscriber_name, name);
                inner.collect_garbage(name);
                Ok(())
            }
            None => Err(ObserverError::subscription_not_found(
                name,
                subscriber.to_string(),
            )),
        }
    }

    /// Request a dependency re-resolution before the next delivery.
    pub fn mark_dirty(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.headers.get_mut(name) {
            Some(header) => {
                header.needs_reorder = true;
                true
            }
            None => false,
        }
    }

    /// Remove every subscription held by a unit. Returns how many were
    /// removed.
    pub fn remove_subscriber(&self, subscriber: UnitId) -> usize {
        let mut inner = self.inner.lock();
        let names: Vec<String> = inner.order.clone();
        let mut removed = 0;
        for name in names {
            let hit = inner
                .headers
                .get_mut(&name)
                .and_then(|header| header.list.remove(subscriber))
                .is_some();
            if hit {
                removed += 1;
                inner.collect_garbage(&name);
            }
        }
        removed
    }

    /// Note a freshly published record: flags the header (creating it if
    /// absent), counts the record, and moves a name the walk has already
    /// passed to the tail so the cycle in progress still observes it.
    pub(crate) fn mark_new_data(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner.ensure_header(name);
        {
            let header = inner.headers.get_mut(name).expect("header just ensured");
            header.has_new_data = true;
            header.live_records += 1;
        }
        if let Some(cursor) = inner.cursor {
            if let Some(pos) = inner.order.iter().position(|n| n == name) {
                if pos < cursor {
                    let moved = inner.order.remove(pos);
                    inner.order.push(moved);
                    inner.cursor = Some(cursor - 1);
                    trace!("Moved '{}' behind the walk cursor to the tail", name);
                }
            }
        }
    }

    /// Note records destroyed under a name, collecting the header when the
    /// last one goes and no subscribers remain.
    pub(crate) fn records_destroyed(&self, name: &str, count: usize) {
        let mut inner = self.inner.lock();
        if let Some(header) = inner.headers.get_mut(name) {
            header.live_records = header.live_records.saturating_sub(count);
        }
        inner.collect_garbage(name);
    }

    /// Start a cycle walk from the head of the name list.
    pub(crate) fn begin_walk(&self) {
        self.inner.lock().cursor = Some(0);
    }

    /// Advance to the next header with new data, resolving its order first
    /// if flagged, and return a dispatch snapshot. The cursor is advanced
    /// past the returned name before any callback runs, so a publish back
    /// to it counts as "already passed".
    pub(crate) fn next_pending(&self) -> Option<DispatchTarget> {
        let mut inner = self.inner.lock();
        let mut pos = inner.cursor.unwrap_or(0);
        while pos < inner.order.len() {
            let name = inner.order[pos].clone();
            let cap_factor = self.reorder_cap_factor;
            let target = {
                let header = inner
                    .headers
                    .get_mut(&name)
                    .expect("every ordered name has a header");
                if header.has_new_data && !header.list.is_empty() {
                    let mut gave_up = false;
                    if header.needs_reorder {
                        let n = header.list.len();
                        let cap = cap_factor * n * n + 1;
                        if let ReorderOutcome::GaveUp { moves } = header.list.resolve_order(cap) {
                            warn!(
                                "Unresolved ordering dependencies under '{}' after {} moves, keeping current order",
                                name, moves
                            );
                            gave_up = true;
                        }
                        header.needs_reorder = false;
                    }
                    Some(DispatchTarget {
                        name: name.clone(),
                        entries: header.list.snapshot(),
                        reorder_gave_up: gave_up,
                    })
                } else {
                    None
                }
            };
            if let Some(target) = target {
                inner.cursor = Some(pos + 1);
                return Some(target);
            }
            pos += 1;
        }
        inner.cursor = Some(pos);
        None
    }

    /// Cycle cleanup: clear every new-data flag, reset the cursor and drop
    /// headers that lost their last entry and record during the cycle.
    pub(crate) fn finish_cycle(&self) {
        let mut inner = self.inner.lock();
        inner.cursor = None;
        for header in inner.headers.values_mut() {
            header.has_new_data = false;
        }
        let names: Vec<String> = inner.order.clone();
        for name in names {
            inner.collect_garbage(&name);
        }
    }

    pub fn has_new_data(&self, name: &str) -> bool {
        self.inner
            .lock()
            .headers
            .get(name)
            .map(|h| h.has_new_data)
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .headers
            .get(name)
            .map(|h| h.list.len())
            .unwrap_or(0)
    }

    pub fn live_records(&self, name: &str) -> usize {
        self.inner
            .lock()
            .headers
            .get(name)
            .map(|h| h.live_records)
            .unwrap_or(0)
    }

    /// Observed names in walk order.
    pub fn observed_names(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
