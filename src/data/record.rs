//! Payload Records
//!
//! A record is one published item under a name: an opaque shared payload,
//! the producer identity, an explicit reference count, and two state bits.
//! `NEW` marks records published since the last cycle cleanup; `FLOATING`
//! defers destruction of an unreferenced record to the end-of-cycle sweep.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::unit::UnitId;

/// Shared-ownership payload. The registry holds one reference while the
/// record is linked; every [`RecordRef`] holds another, so payload memory
/// outlives the record for as long as any holder needs it.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Callback invoked exactly once when the registry unlinks a record.
pub type ReclaimFn = Box<dyn FnOnce() + Send>;

bitflags! {
    /// Per-record state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        /// Published since the last cycle cleanup.
        const NEW = 0b0000_0001;
        /// Destruction at refcount zero is deferred to the sweep.
        const FLOATING = 0b0000_0010;
    }
}

/// Stable handle of a record, unique for the lifetime of the process.
///
/// Handles are allocated monotonically, so comparing two handles of the
/// same chain also orders them by publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordHandle(pub(crate) u64);

/// A record as owned by the data registry.
pub(crate) struct Record {
    pub(crate) handle: RecordHandle,
    pub(crate) producer: UnitId,
    pub(crate) payload: Payload,
    pub(crate) reclaim: Option<ReclaimFn>,
    pub(crate) flags: RecordFlags,
    pub(crate) ref_count: u32,
}

impl Record {
    pub(crate) fn new(
        handle: RecordHandle,
        producer: UnitId,
        payload: Payload,
        reclaim: Option<ReclaimFn>,
    ) -> Self {
        Self {
            handle,
            producer,
            payload,
            reclaim,
            flags: RecordFlags::NEW | RecordFlags::FLOATING,
            ref_count: 0,
        }
    }

    pub(crate) fn is_new(&self) -> bool {
        self.flags.contains(RecordFlags::NEW)
    }

    pub(crate) fn is_floating(&self) -> bool {
        self.flags.contains(RecordFlags::FLOATING)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("handle", &self.handle)
            .field("producer", &self.producer)
            .field("flags", &self.flags)
            .field("ref_count", &self.ref_count)
            .finish()
    }
}

/// Caller-side view of a record returned by the getters.
///
/// A `RecordRef` is a snapshot taken while the registry lock was held; the
/// registry refcount tracks `get`/`ref_record`/`release` calls, not copies
/// of this view. Callers that received one from a getter owe the registry
/// one `release`.
pub struct RecordRef {
    pub(crate) handle: RecordHandle,
    pub(crate) name: String,
    pub(crate) producer: UnitId,
    pub(crate) payload: Payload,
    pub(crate) is_new: bool,
}

impl RecordRef {
    /// Stable handle of the underlying record, usable as a lookup cursor.
    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    /// Name the record was published under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the publishing unit.
    pub fn producer(&self) -> UnitId {
        self.producer
    }

    /// Whether the record was still unseen by a cycle cleanup at get time.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Downcast the payload to a concrete type.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Shared handle to the payload, for holders that outlive the record.
    pub fn payload_arc(&self) -> Payload {
        Arc::clone(&self.payload)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("producer", &self.producer)
            .field("is_new", &self.is_new)
            .finish()
    }
}
