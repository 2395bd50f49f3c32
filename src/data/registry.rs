//! Data Registry
//!
//! Owns every published record, grouped into append-ordered chains by name.
//! Lookups hand out [`RecordRef`] views and bump the record's refcount;
//! `release` drops it again and destroys sunk records at zero, while
//! floating records wait for the end-of-cycle sweep. Reclaim callbacks are
//! always invoked with the registry lock released, so they may re-enter.

use std::collections::HashMap;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::data::record::{Payload, ReclaimFn, Record, RecordFlags, RecordHandle, RecordRef};
use crate::unit::UnitId;

/// Result of a `release` or `sink` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The record is still referenced.
    Alive(u32),
    /// Refcount reached zero but the record is floating; the sweep owns it.
    Deferred,
    /// The record was unlinked and its reclaim callback has run.
    Destroyed,
    /// No such record. Double releases land here and are logged.
    Missing,
}

/// Summary of one end-of-cycle sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Names that lost records, with the count destroyed under each.
    pub destroyed: Vec<(String, usize)>,
}

impl SweepReport {
    pub fn total_destroyed(&self) -> usize {
        self.destroyed.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Default)]
struct DataInner {
    chains: HashMap<String, Vec<Record>>,
    last_handle: u64,
}

impl DataInner {
    fn find(&self, name: &str, handle: RecordHandle) -> Option<&Record> {
        self.chains
            .get(name)
            .and_then(|chain| chain.iter().find(|r| r.handle == handle))
    }

    fn find_mut(&mut self, name: &str, handle: RecordHandle) -> Option<&mut Record> {
        self.chains
            .get_mut(name)
            .and_then(|chain| chain.iter_mut().find(|r| r.handle == handle))
    }

    /// Unlink a record whose refcount is zero. Returns its reclaim callback.
    fn unlink(&mut self, name: &str, handle: RecordHandle) -> Option<ReclaimFn> {
        let chain = self.chains.get_mut(name)?;
        let idx = chain.iter().position(|r| r.handle == handle)?;
        let mut record = chain.remove(idx);
        if chain.is_empty() {
            self.chains.remove(name);
        }
        trace!("Destroyed record {:?} under '{}'", handle, name);
        record.reclaim.take()
    }
}

/// The process-wide store of published records.
pub struct DataRegistry {
    inner: Mutex<DataInner>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DataInner::default()),
        }
    }

    /// Publish a payload under `name`.
    ///
    /// The record starts floating, unreferenced and new. An empty name is a
    /// wiring bug and fatal; producer identity is validated by the bus.
    pub fn publish(
        &self,
        name: &str,
        producer: UnitId,
        payload: Payload,
        reclaim: Option<ReclaimFn>,
    ) -> RecordHandle {
        assert!(!name.is_empty(), "publish requires a non-empty name");
        let mut inner = self.inner.lock();
        inner.last_handle += 1;
        let handle = RecordHandle(inner.last_handle);
        inner
            .chains
            .entry(name.to_string())
            .or_default()
            .push(Record::new(handle, producer, payload, reclaim));
        debug!("Published {:?} under '{}' by {}", handle, name, producer);
        handle
    }

    /// Return the first matching record and bump its refcount.
    ///
    /// `after` continues the chain past a previously returned handle;
    /// `only_new` restricts to records unseen by a cycle cleanup; `producer`
    /// restricts to one publishing unit. Absence is a normal outcome.
    pub fn get(
        &self,
        name: &str,
        after: Option<RecordHandle>,
        only_new: bool,
        producer: Option<UnitId>,
    ) -> Option<RecordRef> {
        let mut inner = self.inner.lock();
        let chain = inner.chains.get_mut(name)?;
        for record in chain.iter_mut() {
            if !matches(record, after, only_new, producer) {
                continue;
            }
            record.ref_count += 1;
            return Some(make_ref(name, record));
        }
        None
    }

    /// Batch form of [`get`](Self::get): every matching record is returned
    /// with its refcount bumped. `producers` of `None` matches any producer.
    pub fn get_all_matching(
        &self,
        name: &str,
        after: Option<RecordHandle>,
        only_new: bool,
        producers: Option<&[UnitId]>,
    ) -> Vec<RecordRef> {
        let mut inner = self.inner.lock();
        let Some(chain) = inner.chains.get_mut(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for record in chain.iter_mut() {
            let producer_ok = producers
                .map(|list| list.contains(&record.producer))
                .unwrap_or(true);
            if producer_ok && matches(record, after, only_new, None) {
                record.ref_count += 1;
                out.push(make_ref(name, record));
            }
        }
        out
    }

    /// Take an additional reference on a record already held.
    ///
    /// Returns the new refcount, or `None` if the record is gone.
    pub fn ref_record(&self, rec: &RecordRef) -> Option<u32> {
        let mut inner = self.inner.lock();
        match inner.find_mut(&rec.name, rec.handle) {
            Some(record) => {
                record.ref_count += 1;
                Some(record.ref_count)
            }
            None => {
                warn!("ref on unknown record {:?} under '{}'", rec.handle, rec.name);
                None
            }
        }
    }

    /// Drop one reference. Sunk records are destroyed at zero; floating
    /// records are left for the sweep.
    pub fn release(&self, rec: &RecordRef) -> ReleaseOutcome {
        let (outcome, reclaim) = {
            let mut inner = self.inner.lock();
            let outcome = match inner.find_mut(&rec.name, rec.handle) {
                None => {
                    warn!("release of unknown record {:?} under '{}'", rec.handle, rec.name);
                    ReleaseOutcome::Missing
                }
                Some(record) => {
                    if record.ref_count == 0 {
                        // Refcounts never go negative; an extra release is a
                        // caller bug worth surfacing, not corrupting state over.
                        warn!("refcount underflow ignored on '{}'", rec.name);
                        ReleaseOutcome::Deferred
                    } else {
                        record.ref_count -= 1;
                        if record.ref_count > 0 {
                            ReleaseOutcome::Alive(record.ref_count)
                        } else if record.is_floating() {
                            ReleaseOutcome::Deferred
                        } else {
                            ReleaseOutcome::Destroyed
                        }
                    }
                }
            };
            let reclaim = if outcome == ReleaseOutcome::Destroyed {
                inner.unlink(&rec.name, rec.handle)
            } else {
                None
            };
            (outcome, reclaim)
        };
        if let Some(reclaim) = reclaim {
            reclaim();
        }
        outcome
    }

    /// One-way flip of a record from floating to immediately-destructible,
    /// re-checking for destruction right away.
    pub fn sink(&self, rec: &RecordRef) -> ReleaseOutcome {
        let (outcome, reclaim) = {
            let mut inner = self.inner.lock();
            let outcome = match inner.find_mut(&rec.name, rec.handle) {
                None => {
                    warn!("sink of unknown record {:?} under '{}'", rec.handle, rec.name);
                    ReleaseOutcome::Missing
                }
                Some(record) => {
                    record.flags.remove(RecordFlags::FLOATING);
                    if record.ref_count > 0 {
                        ReleaseOutcome::Alive(record.ref_count)
                    } else {
                        ReleaseOutcome::Destroyed
                    }
                }
            };
            let reclaim = if outcome == ReleaseOutcome::Destroyed {
                inner.unlink(&rec.name, rec.handle)
            } else {
                None
            };
            (outcome, reclaim)
        };
        if let Some(reclaim) = reclaim {
            reclaim();
        }
        outcome
    }

    /// End-of-cycle sweep: destroy every unreferenced record and clear the
    /// NEW flag on the survivors. Reclaim callbacks run after the lock is
    /// dropped.
    pub fn sweep_cycle_end(&self) -> SweepReport {
        let mut reclaims: Vec<ReclaimFn> = Vec::new();
        let mut report = SweepReport::default();
        {
            let mut inner = self.inner.lock();
            inner.chains.retain(|name, chain| {
                let before = chain.len();
                chain.retain_mut(|record| {
                    if record.ref_count == 0 {
                        if let Some(reclaim) = record.reclaim.take() {
                            reclaims.push(reclaim);
                        }
                        false
                    } else {
                        record.flags.remove(RecordFlags::NEW);
                        true
                    }
                });
                let removed = before - chain.len();
                if removed > 0 {
                    report.destroyed.push((name.clone(), removed));
                }
                !chain.is_empty()
            });
        }
        if !report.destroyed.is_empty() {
            debug!("Sweep destroyed {} record(s)", report.total_destroyed());
        }
        for reclaim in reclaims {
            reclaim();
        }
        report
    }

    /// Number of live records under a name.
    pub fn record_count(&self, name: &str) -> usize {
        self.inner.lock().chains.get(name).map(Vec::len).unwrap_or(0)
    }

    /// Current refcount of a record, if it is still linked.
    pub fn refcount(&self, rec: &RecordRef) -> Option<u32> {
        self.inner.lock().find(&rec.name, rec.handle).map(|r| r.ref_count)
    }
}

impl Default for DataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(
    record: &Record,
    after: Option<RecordHandle>,
    only_new: bool,
    producer: Option<UnitId>,
) -> bool {
    if let Some(cursor) = after {
        if record.handle <= cursor {
            return false;
        }
    }
    if only_new && !record.is_new() {
        return false;
    }
    if let Some(wanted) = producer {
        if record.producer != wanted {
            return false;
        }
    }
    true
}

fn make_ref(name: &str, record: &Record) -> RecordRef {
    RecordRef {
        handle: record.handle,
        name: name.to_string(),
        producer: record.producer,
        payload: std::sync::Arc::clone(&record.payload),
        is_new: record.is_new(),
    }
}
