//! Error types for collection views.

/// Result type alias for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Errors raised synchronously by views, sources and settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    /// A descriptor, filter or setting could not be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The underlying source lacks the capability the operation needs.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// The operation is forbidden in the view's current state.
    #[error("'{operation}' is not allowed while {reason}")]
    InvalidState {
        operation: &'static str,
        reason: &'static str,
    },

    /// An index fell outside the projection.
    #[error("Index {index} is out of range for a view of {count} items")]
    OutOfRange { index: isize, count: usize },

    /// An argument was rejected, e.g. the new-item placeholder where an item is required.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The source collection failed the operation.
    #[error("Source error: {0}")]
    Source(String),
}

impl ViewError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state(operation: &'static str, reason: &'static str) -> Self {
        Self::InvalidState { operation, reason }
    }

    /// Create an out-of-range error.
    pub fn out_of_range(index: isize, count: usize) -> Self {
        Self::OutOfRange { index, count }
    }

    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create a source error.
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Returns `true` for [`ViewError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
