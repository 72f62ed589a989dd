//! Hierarchical memory accounting
//!
//! A `MemTracker` counts bytes consumed by one component and forwards every
//! reservation to its ancestors, so a process-wide root can bound the sum of
//! many tablets while each tablet bounds its own transactions.
//!
//! ## Reservation Protocol
//!
//! ```text
//! try_consume(n):
//!   for tracker in [self, parent, grandparent, ...]:
//!     if tracker.consumption + n > tracker.limit:
//!       roll back n on every tracker already charged
//!       return false
//!     tracker.consumption += n
//!   return true
//! ```
//!
//! Each per-tracker step is a single compare-and-swap, so a tracker never
//! observes consumption above its limit as the result of `try_consume`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Byte budget the transaction tracker reserves against
///
/// Implementations must make each `try_reserve`/`release` pair atomic from
/// the caller's point of view. Hierarchy and sharing are the implementor's
/// concern.
pub trait MemoryBudget: Send + Sync {
    /// Reserve `bytes` if doing so keeps every limit satisfied
    fn try_reserve(&self, bytes: u64) -> bool;

    /// Reserve `bytes` regardless of limits
    fn reserve(&self, bytes: u64);

    /// Return `bytes` previously reserved
    fn release(&self, bytes: u64);

    /// Bytes currently reserved
    fn consumption(&self) -> u64;

    /// Configured limit, `None` when unlimited
    fn limit(&self) -> Option<u64>;

    /// Name used in logs and error messages
    fn id(&self) -> &str;
}

/// Hierarchical memory tracker
pub struct MemTracker {
    id: String,
    limit: Option<u64>,
    consumption: AtomicU64,
    peak_consumption: AtomicU64,
    parent: Option<Arc<MemTracker>>,
}

impl MemTracker {
    /// Create a root tracker
    pub fn root(id: impl Into<String>, limit: Option<u64>) -> Arc<Self> {
        Arc::new(Self::build(id.into(), limit, None))
    }

    /// Create a tracker whose reservations also count against `parent`
    pub fn child(parent: &Arc<MemTracker>, id: impl Into<String>, limit: Option<u64>) -> Arc<Self> {
        Arc::new(Self::build(id.into(), limit, Some(Arc::clone(parent))))
    }

    fn build(id: String, limit: Option<u64>, parent: Option<Arc<MemTracker>>) -> Self {
        MemTracker {
            id,
            limit,
            consumption: AtomicU64::new(0),
            peak_consumption: AtomicU64::new(0),
            parent,
        }
    }

    /// Tracker name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configured limit, `None` when unlimited
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Parent tracker, if any
    pub fn parent(&self) -> Option<&Arc<MemTracker>> {
        self.parent.as_ref()
    }

    /// Bytes currently consumed by this tracker and its descendants
    pub fn consumption(&self) -> u64 {
        self.consumption.load(Ordering::SeqCst)
    }

    /// Highest consumption ever observed
    pub fn peak_consumption(&self) -> u64 {
        self.peak_consumption.load(Ordering::Relaxed)
    }

    /// Whether this tracker is at or above its own limit
    pub fn limit_exceeded(&self) -> bool {
        match self.limit {
            Some(limit) => self.consumption() >= limit,
            None => false,
        }
    }

    /// Whether this tracker or any ancestor is at or above its limit
    pub fn any_limit_exceeded(&self) -> bool {
        self.chain().any(|t| t.limit_exceeded())
    }

    /// Try to reserve `bytes` on this tracker and every ancestor
    ///
    /// Returns `false` and leaves every tracker unchanged if any limit on the
    /// chain would be exceeded.
    pub fn try_consume(&self, bytes: u64) -> bool {
        if bytes == 0 {
            return true;
        }

        let chain: Vec<&MemTracker> = self.chain().collect();
        for (i, tracker) in chain.iter().enumerate() {
            if !tracker.try_add(bytes) {
                for charged in &chain[..i] {
                    charged.sub(bytes);
                }
                debug!(
                    target: "tablet::mem",
                    tracker = %self.id,
                    rejected_by = %tracker.id,
                    bytes,
                    consumption = tracker.consumption(),
                    limit = ?tracker.limit,
                    "Memory reservation rejected"
                );
                return false;
            }
        }
        true
    }

    /// Reserve `bytes` on this tracker and every ancestor, ignoring limits
    pub fn consume(&self, bytes: u64) {
        for tracker in self.chain() {
            let now = tracker.consumption.fetch_add(bytes, Ordering::SeqCst) + bytes;
            tracker.peak_consumption.fetch_max(now, Ordering::Relaxed);
        }
    }

    /// Return `bytes` to this tracker and every ancestor
    ///
    /// # Panics
    ///
    /// Panics if any tracker on the chain has less than `bytes` consumed.
    /// Releasing memory that was never reserved breaks accounting for every
    /// sibling sharing the ancestor.
    pub fn release(&self, bytes: u64) {
        for tracker in self.chain() {
            tracker.sub(bytes);
        }
    }

    fn chain(&self) -> impl Iterator<Item = &MemTracker> {
        std::iter::successors(Some(self), |t| t.parent().map(Arc::as_ref))
    }

    fn try_add(&self, bytes: u64) -> bool {
        let limit = self.limit;
        let result = self
            .consumption
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(bytes)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });
        match result {
            Ok(previous) => {
                self.peak_consumption
                    .fetch_max(previous + bytes, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    fn sub(&self, bytes: u64) {
        let result = self
            .consumption
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(bytes)
            });
        if let Err(current) = result {
            panic!(
                "memory tracker '{}' released {} bytes but only {} are consumed",
                self.id, bytes, current
            );
        }
    }
}

impl MemoryBudget for MemTracker {
    fn try_reserve(&self, bytes: u64) -> bool {
        self.try_consume(bytes)
    }

    fn reserve(&self, bytes: u64) {
        self.consume(bytes)
    }

    fn release(&self, bytes: u64) {
        MemTracker::release(self, bytes)
    }

    fn consumption(&self) -> u64 {
        MemTracker::consumption(self)
    }

    fn limit(&self) -> Option<u64> {
        self.limit
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for MemTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTracker")
            .field("id", &self.id)
            .field("limit", &self.limit)
            .field("consumption", &self.consumption())
            .field("peak_consumption", &self.peak_consumption())
            .field("parent", &self.parent().map(|p| p.id()))
            .finish()
    }
}
