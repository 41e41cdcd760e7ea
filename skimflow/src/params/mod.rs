//! Stage parameters.
//!
//! A [`ParameterBag`] is the only configuration a stage receives. Values are a
//! closed tagged variant ([`ParameterValue`]); stages read them through typed
//! accessors that fail with [`ParameterError`] instead of coercing.

mod bag;
mod value;

pub use bag::ParameterBag;
pub use value::{ParameterValue, Scalar};

use thiserror::Error;

/// Errors raised when reading a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// The key is not present in the bag.
    #[error("Parameter '{key}' not found")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// The key holds a value of a different kind.
    #[error("Parameter '{key}' has type {found}, expected {expected}")]
    TypeMismatch {
        /// The key.
        key: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },

    /// The key holds a value of the right kind that cannot be used.
    #[error("Parameter '{key}' is invalid: {reason}")]
    InvalidValue {
        /// The key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ParameterError {
    /// Creates a key-not-found error.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
