//! Tablet: the transaction-facing surface of one tablet
//!
//! A `Tablet` owns the tablet's `TransactionTracker`, wires it to the caller's
//! metric entity and memory tracker hierarchy, and exposes:
//! - `submit`: admit and execute an operation
//! - `begin`: admit only, for callers that drive completion themselves
//! - `close`: stop accepting work and drain in-flight transactions

use crate::config::{TabletConfig, CONFIG_FILE_NAME};
use std::path::Path;
use std::sync::Arc;
use tablet_concurrency::{
    MemTracker, MetricEntity, Operation, TransactionDriver, TransactionHandle, TransactionTracker,
};
use tablet_core::TabletResult;
use tracing::{info, warn};

/// One tablet's transaction admission and lifecycle
pub struct Tablet {
    tablet_id: String,
    config: TabletConfig,
    tracker: Arc<TransactionTracker>,
    metrics: Arc<MetricEntity>,
}

impl Tablet {
    /// Open a tablet with an explicit configuration
    ///
    /// Transaction memory is accounted in a `txn_tracker` child of
    /// `parent_mem`, limited to `config.memory_limit_bytes()`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration fails validation.
    pub fn open(
        tablet_id: impl Into<String>,
        config: TabletConfig,
        metrics: Arc<MetricEntity>,
        parent_mem: &Arc<MemTracker>,
    ) -> TabletResult<Arc<Self>> {
        config.validate()?;
        let tablet_id = tablet_id.into();

        let tracker =
            TransactionTracker::with_complain_interval(tablet_id.clone(), config.complain_interval());
        tracker.bind_metrics(&metrics);
        tracker.bind_memory_tracking(parent_mem, config.memory_limit_bytes());

        info!(
            target: "tablet::engine",
            tablet_id = %tablet_id,
            memory_limit_bytes = ?config.memory_limit_bytes(),
            drain_timeout_ms = ?config.drain_timeout_ms,
            "Tablet opened"
        );

        Ok(Arc::new(Tablet {
            tablet_id,
            config,
            tracker,
            metrics,
        }))
    }

    /// Open a tablet configured by `tablet.toml` in `dir`
    ///
    /// A default `tablet.toml` is written first if the directory has none.
    pub fn open_dir(
        tablet_id: impl Into<String>,
        dir: &Path,
        metrics: Arc<MetricEntity>,
        parent_mem: &Arc<MemTracker>,
    ) -> TabletResult<Arc<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        TabletConfig::write_default_if_missing(&config_path)?;
        let config = TabletConfig::from_file(&config_path)?;
        Self::open(tablet_id, config, metrics, parent_mem)
    }

    /// Tablet identifier
    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// Configuration the tablet was opened with
    pub fn config(&self) -> &TabletConfig {
        &self.config
    }

    /// The tablet's transaction tracker
    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    /// Metric entity the tracker reports into
    pub fn metrics(&self) -> &Arc<MetricEntity> {
        &self.metrics
    }

    /// Whether the tablet still accepts new transactions
    pub fn is_open(&self) -> bool {
        self.tracker.is_accepting()
    }

    /// Admit `op` and run it to completion
    ///
    /// Returns the finished handle.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the tablet is closing
    /// - `ResourceExhausted` if admission is rejected for memory
    /// - `Aborted` if the operation fails to prepare or apply
    pub fn submit<O: Operation + 'static>(&self, op: O) -> TabletResult<TransactionHandle> {
        let driver = self.begin(op)?;
        driver.execute()?;
        Ok(driver)
    }

    /// Admit `op` without running it
    ///
    /// The caller must eventually call `execute`, `complete` or `abort` on
    /// the returned handle, or `close` will wait on it. Admission is refused
    /// with `InvalidInput` once `close` has begun.
    pub fn begin<O: Operation + 'static>(&self, op: O) -> TabletResult<TransactionHandle> {
        TransactionDriver::init(&self.tracker, Box::new(op))
    }

    /// Transactions currently in flight, ordered by id
    pub fn pending_transactions(&self) -> Vec<TransactionHandle> {
        self.tracker.snapshot()
    }

    /// Number of transactions currently in flight
    pub fn num_pending(&self) -> usize {
        self.tracker.count()
    }

    /// Stop accepting transactions and wait for in-flight ones to finish
    ///
    /// Waits at most `drain_timeout_ms` when configured, otherwise forever.
    /// Calling `close` again retries the drain.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if transactions are still pending when the
    /// timeout expires. The tablet stays closed to new work.
    pub fn close(&self) -> TabletResult<()> {
        // Admission closes under the tracker lock, so nothing can slip in
        // between this and the drain observing an empty set.
        self.tracker.stop_admissions();
        info!(
            target: "tablet::engine",
            tablet_id = %self.tablet_id,
            pending = self.tracker.count(),
            "Closing tablet"
        );

        let result = match self.config.drain_timeout() {
            Some(timeout) => self.tracker.wait_for_all_to_finish_timeout(timeout),
            None => {
                self.tracker.wait_for_all_to_finish();
                Ok(())
            }
        };

        match &result {
            Ok(()) => info!(target: "tablet::engine", tablet_id = %self.tablet_id, "Tablet closed"),
            Err(e) => warn!(
                target: "tablet::engine",
                tablet_id = %self.tablet_id,
                error = %e,
                "Tablet close timed out"
            ),
        }
        result
    }
}

impl std::fmt::Debug for Tablet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tablet")
            .field("tablet_id", &self.tablet_id)
            .field("accepting_transactions", &self.is_open())
            .field("num_pending", &self.num_pending())
            .finish()
    }
}
