//! Error types for tablet transaction tracking
//!
//! This module defines all recoverable error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Programming errors (releasing a transaction twice, releasing one that was
//! never admitted) are not represented here. They corrupt the accounting
//! invariants and are raised as panics at the call site.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for tablet operations
pub type TabletResult<T> = std::result::Result<T, TabletError>;

/// Error types for tablet transaction tracking
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabletError {
    /// Admission rejected because the transaction memory budget is exhausted
    ///
    /// Recoverable: the caller may retry after in-flight transactions finish.
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Human-readable description naming the exceeded limit
        message: String,
    },

    /// Drain wait timed out with transactions still pending
    #[error(
        "Deadline exceeded: timed out waiting for all transactions to finish. \
         {pending} transactions pending. Waited for {waited:?}"
    )]
    DeadlineExceeded {
        /// Number of transactions still pending when the deadline expired
        pending: usize,
        /// How long the caller waited
        waited: Duration,
    },

    /// Operation was aborted during prepare or apply
    #[error("Transaction aborted: {reason}")]
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },

    /// Invalid input or configuration
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what was invalid
        message: String,
    },

    /// Request encoding failed while estimating a footprint
    #[error("Serialization error: {message}")]
    Serialization {
        /// Encoder error message
        message: String,
    },

    /// Unexpected internal failure (I/O on config files, etc.)
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl TabletError {
    /// Create a `ResourceExhausted` error
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        TabletError::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Create an `Aborted` error
    pub fn aborted(reason: impl Into<String>) -> Self {
        TabletError::Aborted {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TabletError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a `Serialization` error
    pub fn serialization(message: impl Into<String>) -> Self {
        TabletError::Serialization {
            message: message.into(),
        }
    }

    /// Create an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        TabletError::Internal {
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            TabletError::ResourceExhausted { .. } => "ResourceExhausted",
            TabletError::DeadlineExceeded { .. } => "DeadlineExceeded",
            TabletError::Aborted { .. } => "Aborted",
            TabletError::InvalidInput { .. } => "InvalidInput",
            TabletError::Serialization { .. } => "Serialization",
            TabletError::Internal { .. } => "Internal",
        }
    }

    /// Whether admission was rejected under memory pressure
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, TabletError::ResourceExhausted { .. })
    }

    /// Whether a drain wait timed out
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, TabletError::DeadlineExceeded { .. })
    }

    /// Whether the operation itself was aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self, TabletError::Aborted { .. })
    }

    /// Whether retrying later may succeed
    ///
    /// Retry policy is the caller's decision; nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TabletError::ResourceExhausted { .. } | TabletError::DeadlineExceeded { .. }
        )
    }
}
