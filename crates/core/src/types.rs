//! Core identifier and classification types
//!
//! - TxnId: Process-unique identity of a tracked transaction
//! - TxnKind: Which class of operation a transaction performs (drives metrics)
//! - TxnOutcome: How a finished transaction ended

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed per-transaction overhead charged on top of the encoded request size
///
/// Covers the driver, its tracker entry and bookkeeping. Guarantees every
/// transaction has a non-zero footprint even when its request is empty.
pub const TXN_BASE_FOOTPRINT: u64 = 64;

/// Number of bytes in one mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Unique identifier for a transaction on a tablet
///
/// Identifiers are allocated from a monotonically increasing counter, so
/// ordering by `TxnId` is ordering by admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Class of operation carried by a transaction
///
/// The tracker keeps one in-flight gauge per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnKind {
    /// Row writes (insert/update/delete)
    Write,
    /// Schema change
    AlterSchema,
    /// Anything else (no-ops, heartbeats)
    Other,
}

impl TxnKind {
    /// All kinds, in metric registration order
    pub const ALL: [TxnKind; 3] = [TxnKind::Write, TxnKind::AlterSchema, TxnKind::Other];

    /// Short lowercase name used in logs and descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnKind::Write => "write",
            TxnKind::AlterSchema => "alter_schema",
            TxnKind::Other => "other",
        }
    }
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOutcome {
    /// Operation applied successfully
    Committed,
    /// Operation was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl TxnOutcome {
    /// Whether the transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self, TxnOutcome::Committed)
    }
}
