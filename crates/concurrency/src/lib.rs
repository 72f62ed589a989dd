//! Transaction admission and tracking for a single tablet
//!
//! This crate implements the bookkeeping of which transactions are alive on a
//! tablet and whether one more may be admitted:
//! - TransactionTracker: pending set, memory-bounded admission, drain
//! - TransactionDriver: shared handle for one in-flight operation
//! - Operation: prepare/apply/describe abstraction over writes and schema changes
//! - MemTracker: hierarchical byte budget the tracker reserves against
//! - MetricEntity: per-tablet gauges and counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod mem_tracker;
pub mod metrics;
pub mod operation;
pub mod tracker;

pub use driver::{DriverState, TransactionDriver};
pub use mem_tracker::{MemTracker, MemoryBudget};
pub use metrics::{AtomicGauge, Counter, MetricEntity, MetricValue};
pub use operation::{
    AlterSchemaOperation, AlterSchemaRequest, ColumnChange, NoOpOperation, Operation,
    RowOperation, WriteOperation, WriteRequest,
};
pub use tracker::{TransactionTracker, DEFAULT_COMPLAIN_INTERVAL, TXN_MEM_TRACKER_ID};

/// Shared handle to a tracked transaction
pub type TransactionHandle = std::sync::Arc<TransactionDriver>;
