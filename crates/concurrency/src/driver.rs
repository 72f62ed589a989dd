//! Transaction driver: the tracked handle for one in-flight operation
//!
//! A driver is created and admitted in one step (`TransactionDriver::init`),
//! so a driver that exists outside a failed `init` is always tracked until it
//! finishes.
//!
//! State transitions:
//! - `Pending` → `Finished(Committed)` via `complete()`
//! - `Pending` → `Finished(Aborted)` via `abort()`
//!
//! Whichever call performs the transition releases the driver from its
//! tracker; every later call is a no-op.

use crate::operation::Operation;
use crate::tracker::TransactionTracker;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablet_core::{TabletError, TabletResult, TxnId, TxnKind, TxnOutcome, TXN_BASE_FOOTPRINT};
use tracing::debug;

/// Lifecycle state of a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Admitted and tracked
    Pending,
    /// Released from the tracker
    Finished(TxnOutcome),
}

/// Handle for one tracked transaction
///
/// Shared between the caller that drives it and the tracker's pending set.
pub struct TransactionDriver {
    id: TxnId,
    kind: TxnKind,
    memory_footprint: u64,
    started_at: Instant,
    operation: Box<dyn Operation>,
    tracker: Arc<TransactionTracker>,
    state: Mutex<DriverState>,
}

impl TransactionDriver {
    /// Create a driver for `operation` and admit it into `tracker`
    ///
    /// The memory footprint is computed here, once, from the encoded request.
    ///
    /// # Errors
    ///
    /// - `Serialization` if the request cannot be encoded
    /// - `ResourceExhausted` if the tracker rejects admission; the driver is
    ///   discarded
    pub fn init(
        tracker: &Arc<TransactionTracker>,
        operation: Box<dyn Operation>,
    ) -> TabletResult<Arc<Self>> {
        let encoded_len = operation.encoded_request()?.len() as u64;
        let driver = Arc::new(TransactionDriver {
            id: tracker.next_txn_id(),
            kind: operation.kind(),
            memory_footprint: TXN_BASE_FOOTPRINT + encoded_len,
            started_at: Instant::now(),
            operation,
            tracker: Arc::clone(tracker),
            state: Mutex::new(DriverState::Pending),
        });
        tracker.add(&driver)?;
        Ok(driver)
    }

    /// Transaction identity
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Operation kind
    pub fn kind(&self) -> TxnKind {
        self.kind
    }

    /// Bytes charged to the tracker's memory budget while pending
    pub fn memory_footprint(&self) -> u64 {
        self.memory_footprint
    }

    /// Time since the driver was created
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The operation being driven
    pub fn operation(&self) -> &dyn Operation {
        self.operation.as_ref()
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state.lock().clone()
    }

    /// Whether the driver is still tracked
    pub fn is_pending(&self) -> bool {
        *self.state.lock() == DriverState::Pending
    }

    /// Terminal outcome, once finished
    pub fn outcome(&self) -> Option<TxnOutcome> {
        match &*self.state.lock() {
            DriverState::Pending => None,
            DriverState::Finished(outcome) => Some(outcome.clone()),
        }
    }

    /// Run prepare then apply, finishing the driver either way
    ///
    /// # Errors
    ///
    /// Returns `Aborted` carrying the failure reason if prepare or apply fails,
    /// or if the driver had already finished.
    pub fn execute(&self) -> TabletResult<()> {
        if !self.is_pending() {
            return Err(TabletError::aborted(format!(
                "transaction {} already finished",
                self.id
            )));
        }

        match self.operation.prepare().and_then(|_| self.operation.apply()) {
            Ok(()) => {
                self.complete();
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.abort(reason.clone());
                Err(TabletError::aborted(reason))
            }
        }
    }

    /// Finish successfully
    ///
    /// Returns `true` if this call finished the driver.
    pub fn complete(&self) -> bool {
        self.finish(TxnOutcome::Committed)
    }

    /// Finish with an abort
    ///
    /// Returns `true` if this call finished the driver.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.finish(TxnOutcome::Aborted {
            reason: reason.into(),
        })
    }

    fn finish(&self, outcome: TxnOutcome) -> bool {
        let mut state = self.state.lock();
        if *state != DriverState::Pending {
            return false;
        }
        debug!(
            target: "tablet::txn",
            txn = %self.id,
            kind = %self.kind,
            outcome = ?outcome,
            elapsed_us = self.started_at.elapsed().as_micros() as u64,
            "Transaction finished"
        );
        *state = DriverState::Finished(outcome);
        // Still holding the state lock: no observer sees Finished while the
        // tracker holds the driver.
        self.tracker.release(self);
        true
    }
}

impl fmt::Display for TransactionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.kind, self.operation.describe())
    }
}

impl fmt::Debug for TransactionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionDriver")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("memory_footprint", &self.memory_footprint)
            .field("tablet_id", &self.tracker.tablet_id())
            .finish()
    }
}
