//! Core types for tablet transaction tracking
//!
//! This crate defines the foundational types used throughout the system:
//! - TxnId: Identity of a tracked transaction
//! - TxnKind: Write / schema change / other, used for per-kind metrics
//! - TxnOutcome: Terminal result of a transaction
//! - TabletError: Recoverable error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{TabletError, TabletResult};
pub use types::{TxnId, TxnKind, TxnOutcome, MIB, TXN_BASE_FOOTPRINT};
