//! Function Registry Error Types

use thiserror::Error;

/// Result type for function registry operations
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Errors raised by function registration management
#[derive(Error, Debug, Clone)]
pub enum FunctionError {
    /// No function chain exists under the name
    #[error("No function registered under '{name}'")]
    FunctionNotFound { name: String },

    /// The chain exists but holds no entry for the owner
    #[error("No function under '{name}' owned by '{owner}'")]
    OwnerNotFound { name: String, owner: String },
}

impl FunctionError {
    /// Create a function not found error
    pub fn function_not_found<S: Into<String>>(name: S) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create an owner not found error
    pub fn owner_not_found<S: Into<String>, T: Into<String>>(name: S, owner: T) -> Self {
        Self::OwnerNotFound {
            name: name.into(),
            owner: owner.into(),
        }
    }
}
