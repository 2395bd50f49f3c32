//! Subscriber Lists and Dispatch Order
//!
//! The observer side of the bus: who gets told about new data under a
//! name, and in what order. Each observed name has an ordered subscriber
//! list built from priorities (with reserved always-first / always-last
//! sentinels) and refined by declared run-before dependencies, resolved
//! lazily with a capped bubble pass. The registry also keeps the walk
//! cursor of the cycle in progress, so a publish can tell whether its name
//! still lies ahead or must be re-queued at the tail.

pub mod error;
pub mod list;
pub mod registry;
pub mod subscription;

pub use error::{ObserverError, ObserverResult};
pub use list::{ProcessFn, ReorderOutcome, PRIORITY_DEFAULT, PRIORITY_FIRST, PRIORITY_LAST};
pub use registry::ObserverRegistry;
pub use subscription::{parse_subscription, Subscription};
