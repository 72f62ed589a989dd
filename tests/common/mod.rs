//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::{Arc, Once};
pub use tablet_txn::metrics::{
    ALL_TRANSACTIONS_INFLIGHT, ALTER_SCHEMA_TRANSACTIONS_INFLIGHT, OTHER_TRANSACTIONS_INFLIGHT,
    TRANSACTION_MEMORY_PRESSURE_REJECTIONS, WRITE_TRANSACTIONS_INFLIGHT,
};
pub use tablet_txn::{
    AlterSchemaOperation, ColumnChange, MemTracker, MetricEntity, NoOpOperation, RowOperation,
    Tablet, TabletConfig, TabletError, TransactionHandle, TxnKind, TxnOutcome, WriteOperation,
};
use tempfile::TempDir;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output through the test harness.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::INFO)
            .try_init();
    });
}

// ============================================================================
// TestTablet - tablet plus the hierarchy it is wired into
// ============================================================================

/// A tablet opened from a temporary directory under a private root tracker.
pub struct TestTablet {
    pub tablet: Arc<Tablet>,
    pub root: Arc<MemTracker>,
    pub dir: TempDir,
}

impl TestTablet {
    /// Open with the default `tablet.toml`.
    pub fn new() -> Self {
        Self::with_root(MemTracker::root("server", None))
    }

    /// Open under an existing root tracker.
    pub fn with_root(root: Arc<MemTracker>) -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let tablet = Tablet::open_dir(
            "test-tablet",
            dir.path(),
            MetricEntity::new("tablet", "test-tablet"),
            &root,
        )
        .unwrap();
        TestTablet { tablet, root, dir }
    }

    /// Open with an explicit config written to `tablet.toml` first.
    pub fn with_config(config: TabletConfig) -> Self {
        init_logging();
        let root = MemTracker::root("server", None);
        let dir = TempDir::new().unwrap();
        config
            .write_to_file(&dir.path().join(tablet_txn::CONFIG_FILE_NAME))
            .unwrap();
        let tablet = Tablet::open_dir(
            "test-tablet",
            dir.path(),
            MetricEntity::new("tablet", "test-tablet"),
            &root,
        )
        .unwrap();
        TestTablet { tablet, root, dir }
    }

    pub fn gauge(&self, name: &str) -> u64 {
        self.tablet
            .metrics()
            .find_gauge(name)
            .map(|g| g.value())
            .unwrap_or(0)
    }

    pub fn rejections(&self) -> u64 {
        self.tablet
            .metrics()
            .find_counter(TRANSACTION_MEMORY_PRESSURE_REJECTIONS)
            .map(|c| c.value())
            .unwrap_or(0)
    }

    /// Assert gauges, pending set and memory agree; only valid when quiescent.
    pub fn assert_consistent(&self) {
        let pending = self.tablet.pending_transactions();
        let count = pending.len() as u64;
        assert_eq!(self.tablet.num_pending() as u64, count);
        assert_eq!(self.gauge(ALL_TRANSACTIONS_INFLIGHT), count);
        assert_eq!(
            self.gauge(WRITE_TRANSACTIONS_INFLIGHT)
                + self.gauge(ALTER_SCHEMA_TRANSACTIONS_INFLIGHT)
                + self.gauge(OTHER_TRANSACTIONS_INFLIGHT),
            count
        );
        let footprints: u64 = pending.iter().map(|d| d.memory_footprint()).sum();
        assert_eq!(self.root.consumption(), footprints);
    }
}

/// A single-row insert into `users`.
pub fn insert(key: impl Into<String>) -> WriteOperation {
    WriteOperation::new(
        "users",
        vec![RowOperation::Insert {
            key: key.into().into_bytes(),
            value: b"value".to_vec(),
        }],
    )
}
