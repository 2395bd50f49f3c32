//! Observer Registry Error Types

use thiserror::Error;

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Errors raised by subscription management
#[derive(Error, Debug, Clone)]
pub enum ObserverError {
    /// The subscription string could not be parsed
    #[error("Invalid subscription: {message}")]
    InvalidSubscription { message: String },

    /// The subscriber is already on the name's list
    #[error("Duplicate subscription to '{name}' by '{subscriber}'")]
    DuplicateSubscription { name: String, subscriber: String },

    /// No matching subscription exists
    #[error("No subscription to '{name}' by '{subscriber}'")]
    SubscriptionNotFound { name: String, subscriber: String },
}

impl ObserverError {
    /// Create an invalid subscription error
    pub fn invalid_subscription<S: Into<String>>(message: S) -> Self {
        Self::InvalidSubscription { message: message.into() }
    }

    /// Create a duplicate subscription error
    pub fn duplicate_subscription<S: Into<String>, T: Into<String>>(name: S, subscriber: T) -> Self {
        Self::DuplicateSubscription {
            name: name.into(),
            subscriber: subscriber.into(),
        }
    }

    /// Create a subscription not found error
    pub fn subscription_not_found<S: Into<String>, T: Into<String>>(name: S, subscriber: T) -> Self {
        Self::SubscriptionNotFound {
            name: name.into(),
            subscriber: subscriber.into(),
        }
    }
}
