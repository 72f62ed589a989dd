//! tablet-txn - Per-tablet transaction admission control and tracking
//!
//! Every write or schema change on a tablet is represented by a transaction
//! handle while it is in flight. The tablet's tracker admits a handle only if
//! its memory footprint fits the tablet's budget (and every ancestor budget),
//! reports in-flight counts per kind, and lets shutdown wait for all of them.
//!
//! # Quick Start
//!
//! ```ignore
//! use tablet_txn::{MemTracker, MetricEntity, Tablet, TabletConfig, WriteOperation, RowOperation};
//!
//! let root = MemTracker::root("server", None);
//! let tablet = Tablet::open("tablet-1", TabletConfig::default(),
//!     MetricEntity::new("tablet", "tablet-1"), &root)?;
//!
//! tablet.submit(WriteOperation::new("users", vec![
//!     RowOperation::Insert { key: b"k".to_vec(), value: b"v".to_vec() },
//! ]))?;
//!
//! tablet.close()?;
//! ```
//!
//! # Architecture
//!
//! - `tablet-core`: error type and identifiers
//! - `tablet-concurrency`: tracker, driver, memory and metric accounting
//! - `tablet-engine`: configuration and the `Tablet` facade

pub use tablet_concurrency::{
    metrics, AlterSchemaOperation, ColumnChange, DriverState, MemTracker, MemoryBudget,
    MetricEntity, NoOpOperation, Operation, RowOperation, TransactionDriver, TransactionHandle,
    TransactionTracker, WriteOperation,
};
pub use tablet_core::{TabletError, TabletResult, TxnId, TxnKind, TxnOutcome, MIB, TXN_BASE_FOOTPRINT};
pub use tablet_engine::{Tablet, TabletConfig, CONFIG_FILE_NAME};
