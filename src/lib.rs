// Allow dead code during development phase
#![allow(dead_code)]

//! # plugbus
//!
//! Process-wide data-exchange and scheduling core for plugin shells.
//! Independent processing units publish refcounted payloads by name,
//! subscribe to names (with priorities and declared run-before
//! dependencies), expose callable entry points to each other, and are
//! driven by a single cooperative cycle loop: pre-hooks, dispatch of every
//! name with new data, post-hooks, then deferred destruction of
//! unreferenced records.
//!
//! The three registries keep independent locks and never hold one while a
//! subscriber or hook callback runs, so callbacks may freely publish, look
//! up, subscribe or call back into the bus. Dispatch works on snapshots;
//! a mutation never invalidates an iteration in progress.

pub mod bus;
pub mod config;
pub mod data;
pub mod function;
pub mod logging;
pub mod observer;
pub mod scheduler;
pub mod unit;

pub use bus::{Bus, BusSettings};
pub use data::{Payload, RecordHandle, RecordRef, ReleaseOutcome};
pub use observer::{ProcessFn, PRIORITY_DEFAULT, PRIORITY_FIRST, PRIORITY_LAST};
pub use scheduler::{BusStats, CyclePhase, CycleReport};
pub use unit::UnitId;
