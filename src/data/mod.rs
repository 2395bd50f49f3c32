//! Refcounted Payload Exchange
//!
//! The data side of the bus: named chains of published records with
//! explicit reference counting and two-phase reclamation. Producers
//! publish floating records; consumers look them up by name, optionally
//! restricted to records that are new since the last cycle or to a given
//! producer, and release them when done. Floating records whose refcount
//! reaches zero are destroyed by the end-of-cycle sweep; sunk records are
//! destroyed immediately.

pub mod record;
pub mod registry;

pub use record::{Payload, ReclaimFn, RecordFlags, RecordHandle, RecordRef};
pub use registry::{DataRegistry, ReleaseOutcome, SweepReport};
