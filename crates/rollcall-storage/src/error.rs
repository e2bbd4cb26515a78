//! Store error types.
//!
//! Every backend failure (lost connection, pool exhaustion, constraint
//! violation) surfaces as [`StoreError::Unavailable`]. The caller decides
//! whether to retry.

/// Errors that can occur during membership store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium could not complete the operation.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// The request was rejected before reaching the backend.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of why the input is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Returns `true` if the backend could not be reached or failed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns `true` if the input was rejected.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
