//! Transaction tracker: admission control and drain for one tablet
//!
//! The tracker owns the set of transactions currently alive on a tablet.
//!
//! ## Critical Section
//!
//! A single mutex guards the admission flag, the pending set, the bound
//! metrics and the bound memory budget. Admission performs
//! check-reserve-insert-count inside it and release performs
//! remove-count-unreserve-notify inside it, so observers never see the gauges,
//! the pending set and the memory consumption disagree.
//!
//! ## Drain
//!
//! `wait_for_all_to_finish` checks for an empty pending set and parks on the
//! condvar while holding the same mutex that `release` holds when it empties
//! the set and notifies. A waiter is therefore either already parked when the
//! notify fires or has not yet checked and will see the empty set.
//!
//! ## Lock Order
//!
//! Driver state lock, then tracker lock. The tracker never locks a driver.

use crate::driver::TransactionDriver;
use crate::mem_tracker::{MemTracker, MemoryBudget};
use crate::metrics::{MetricEntity, TrackerMetrics};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablet_core::{TabletError, TabletResult, TxnId};
use tracing::{debug, info, warn};

/// Default interval between "still waiting" log lines while draining
pub const DEFAULT_COMPLAIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Name of the memory tracker created by `bind_memory_tracking`
pub const TXN_MEM_TRACKER_ID: &str = "txn_tracker";

struct TrackerState {
    accepting: bool,
    pending: BTreeMap<TxnId, Arc<TransactionDriver>>,
    metrics: Option<TrackerMetrics>,
    mem_budget: Option<Arc<dyn MemoryBudget>>,
}

/// Registry of in-flight transactions on one tablet
pub struct TransactionTracker {
    tablet_id: String,
    complain_interval: Duration,
    next_txn_id: AtomicU64,
    state: Mutex<TrackerState>,
    drained: Condvar,
}

impl TransactionTracker {
    /// Create a tracker with no metrics and no memory limit
    pub fn new(tablet_id: impl Into<String>) -> Arc<Self> {
        Self::with_complain_interval(tablet_id, DEFAULT_COMPLAIN_INTERVAL)
    }

    /// Create a tracker that logs every `complain_interval` while draining
    pub fn with_complain_interval(
        tablet_id: impl Into<String>,
        complain_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(TransactionTracker {
            tablet_id: tablet_id.into(),
            complain_interval: complain_interval.max(Duration::from_millis(1)),
            next_txn_id: AtomicU64::new(1),
            state: Mutex::new(TrackerState {
                accepting: true,
                pending: BTreeMap::new(),
                metrics: None,
                mem_budget: None,
            }),
            drained: Condvar::new(),
        })
    }

    /// Tablet this tracker belongs to
    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// Allocate a transaction identity
    pub fn next_txn_id(&self) -> TxnId {
        TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Refuse every later admission
    ///
    /// Pending transactions are unaffected and may still finish. Returns
    /// `true` if this call closed admission.
    pub fn stop_admissions(&self) -> bool {
        let mut state = self.state.lock();
        let was_accepting = std::mem::replace(&mut state.accepting, false);
        if was_accepting {
            debug!(
                target: "tablet::txn",
                tablet_id = %self.tablet_id,
                pending = state.pending.len(),
                "Admissions stopped"
            );
        }
        was_accepting
    }

    /// Whether `add` may still admit transactions
    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    /// Report in-flight counts and rejections into `entity`
    ///
    /// Gauges are seeded from the transactions already pending. Only the
    /// first call has any effect.
    pub fn bind_metrics(&self, entity: &MetricEntity) {
        let mut state = self.state.lock();
        if state.metrics.is_some() {
            debug!(target: "tablet::txn", tablet_id = %self.tablet_id, "Metrics already bound");
            return;
        }
        let metrics = TrackerMetrics::new(entity);
        metrics.seed(state.pending.values().map(|d| d.kind()));
        state.metrics = Some(metrics);
        debug!(
            target: "tablet::txn",
            tablet_id = %self.tablet_id,
            entity_type = entity.entity_type(),
            entity_id = entity.id(),
            pending = state.pending.len(),
            "Metrics bound"
        );
    }

    /// Account transaction memory in a child of `parent` limited to `limit` bytes
    ///
    /// `None` tracks consumption without limiting admission (ancestor limits
    /// still apply). Only the first binding has any effect.
    pub fn bind_memory_tracking(&self, parent: &Arc<MemTracker>, limit: Option<u64>) {
        let child = MemTracker::child(parent, TXN_MEM_TRACKER_ID, limit);
        self.bind_memory_budget(child);
    }

    /// Account transaction memory against an arbitrary budget
    ///
    /// Footprints of transactions already pending are charged to `budget`
    /// unconditionally, so their later release stays balanced. Only the first
    /// binding has any effect.
    pub fn bind_memory_budget(&self, budget: Arc<dyn MemoryBudget>) {
        let mut state = self.state.lock();
        if state.mem_budget.is_some() {
            debug!(target: "tablet::txn", tablet_id = %self.tablet_id, "Memory tracking already bound");
            return;
        }
        let outstanding: u64 = state.pending.values().map(|d| d.memory_footprint()).sum();
        if outstanding > 0 {
            budget.reserve(outstanding);
        }
        state.mem_budget = Some(budget);
    }

    /// Admit `driver`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` once `stop_admissions` has been called
    /// - `ResourceExhausted` if the bound memory budget cannot hold the
    ///   driver's footprint
    ///
    /// Either way the driver is not tracked and must not be released.
    ///
    /// # Panics
    ///
    /// Panics if a transaction with the same identity is already pending.
    pub fn add(&self, driver: &Arc<TransactionDriver>) -> TabletResult<()> {
        let footprint = driver.memory_footprint();
        let mut state = self.state.lock();

        if state.pending.contains_key(&driver.id()) {
            panic!(
                "transaction {} added twice to tracker for tablet {}",
                driver.id(),
                self.tablet_id
            );
        }

        if !state.accepting {
            return Err(TabletError::invalid_input(format!(
                "Tablet {} is closing; transaction {} not admitted",
                self.tablet_id,
                driver.id()
            )));
        }

        if let Some(budget) = &state.mem_budget {
            if !budget.try_reserve(footprint) {
                if let Some(metrics) = &state.metrics {
                    metrics.record_rejection();
                }
                let consumption = budget.consumption();
                let limit = budget
                    .limit()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unlimited".to_string());
                warn!(
                    target: "tablet::txn",
                    tablet_id = %self.tablet_id,
                    txn = %driver.id(),
                    footprint,
                    consumption,
                    limit = %limit,
                    "Transaction rejected under memory pressure"
                );
                return Err(TabletError::resource_exhausted(format!(
                    "Transaction failed, tablet {} transaction memory consumption ({}) \
                     has exceeded its limit ({}) or the limit of an ancestral tracker",
                    self.tablet_id, consumption, limit
                )));
            }
        }

        state.pending.insert(driver.id(), Arc::clone(driver));
        if let Some(metrics) = &state.metrics {
            metrics.record_admitted(driver.kind());
        }

        debug!(
            target: "tablet::txn",
            tablet_id = %self.tablet_id,
            txn = %driver.id(),
            kind = %driver.kind(),
            footprint,
            pending = state.pending.len(),
            "Transaction admitted"
        );
        Ok(())
    }

    /// Stop tracking `driver`
    ///
    /// Wakes drain waiters when the last pending transaction is released.
    ///
    /// # Panics
    ///
    /// Panics if `driver` is not currently tracked (never admitted, or
    /// already released).
    pub fn release(&self, driver: &TransactionDriver) {
        let removed = {
            let mut state = self.state.lock();
            let removed = match state.pending.remove(&driver.id()) {
                Some(removed) if std::ptr::eq(Arc::as_ptr(&removed), driver) => removed,
                Some(other) => {
                    // Restore the entry before panicking
                    state.pending.insert(other.id(), other);
                    panic!(
                        "transaction {} released but a different transaction holds that id on tablet {}",
                        driver.id(),
                        self.tablet_id
                    );
                }
                None => panic!(
                    "transaction {} released but not tracked by tablet {}",
                    driver.id(),
                    self.tablet_id
                ),
            };

            if let Some(metrics) = &state.metrics {
                metrics.record_released(removed.kind());
            }
            if let Some(budget) = &state.mem_budget {
                budget.release(removed.memory_footprint());
            }

            debug!(
                target: "tablet::txn",
                tablet_id = %self.tablet_id,
                txn = %removed.id(),
                pending = state.pending.len(),
                "Transaction released"
            );

            if state.pending.is_empty() {
                self.drained.notify_all();
            }
            removed
        };
        // The tracker's reference may be the last one; drop it outside the lock.
        drop(removed);
    }

    /// Number of pending transactions
    pub fn count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Pending transactions in admission order, as of the call
    pub fn snapshot(&self) -> Vec<Arc<TransactionDriver>> {
        self.state.lock().pending.values().cloned().collect()
    }

    /// Bytes currently charged to the bound memory budget
    pub fn memory_consumption(&self) -> Option<u64> {
        self.state
            .lock()
            .mem_budget
            .as_ref()
            .map(|budget| budget.consumption())
    }

    /// Block until no transactions are pending
    pub fn wait_for_all_to_finish(&self) {
        if let Err(e) = self.drain(None) {
            unreachable!("drain without a deadline failed: {}", e);
        }
    }

    /// Block until no transactions are pending or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if transactions are still pending at the
    /// deadline. Tracked state is left untouched.
    pub fn wait_for_all_to_finish_timeout(&self, timeout: Duration) -> TabletResult<()> {
        self.drain(Some(timeout))
    }

    fn drain(&self, timeout: Option<Duration>) -> TabletResult<()> {
        let start = Instant::now();
        // A deadline too far out to represent is no deadline
        let deadline = timeout.and_then(|t| start.checked_add(t));
        let mut complaints: u32 = 0;
        let mut state = self.state.lock();

        loop {
            let now = Instant::now();
            let waited = now.saturating_duration_since(start);
            if state.pending.is_empty() {
                info!(
                    target: "tablet::txn",
                    tablet_id = %self.tablet_id,
                    waited_ms = waited.as_millis() as u64,
                    "All transactions finished"
                );
                return Ok(());
            }

            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(TabletError::DeadlineExceeded {
                        pending: state.pending.len(),
                        waited,
                    });
                }
            }

            if self.complaint_due(start, complaints).map_or(false, |due| now >= due) {
                complaints = complaints.saturating_add(1);
                warn!(
                    target: "tablet::txn",
                    tablet_id = %self.tablet_id,
                    outstanding = state.pending.len(),
                    waited_ms = waited.as_millis() as u64,
                    "Waiting for outstanding transactions to complete"
                );
                for driver in state.pending.values() {
                    debug!(
                        target: "tablet::txn",
                        txn = %driver.id(),
                        kind = %driver.kind(),
                        elapsed_ms = driver.elapsed().as_millis() as u64,
                        op = %driver.operation().describe(),
                        "Outstanding transaction"
                    );
                }
            }

            let wake_at = match (deadline, self.complaint_due(start, complaints)) {
                (Some(deadline), Some(due)) => Some(deadline.min(due)),
                (deadline, due) => deadline.or(due),
            };
            match wake_at {
                Some(wake_at) => {
                    self.drained.wait_until(&mut state, wake_at);
                }
                None => self.drained.wait(&mut state),
            }
        }
    }

    /// When complaint number `complaints + 1` is due, if representable
    fn complaint_due(&self, start: Instant, complaints: u32) -> Option<Instant> {
        self.complain_interval
            .checked_mul(complaints.saturating_add(1))
            .and_then(|offset| start.checked_add(offset))
    }
}

impl std::fmt::Debug for TransactionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTracker")
            .field("tablet_id", &self.tablet_id)
            .field("pending", &self.count())
            .finish()
    }
}
