//! Named Function Chains
//!
//! Direct plugin-to-plugin calls by name, outside the data path.

pub mod error;
pub mod registry;

pub use error::{FunctionError, FunctionResult};
pub use registry::{CallArg, CallableFn, FunctionEntry, FunctionHandle, FunctionRegistry};
