//! Metric objects owned by a tablet
//!
//! A `MetricEntity` is a named bag of gauges and counters belonging to one
//! tablet. Entities are constructed explicitly and handed to the components
//! that report into them; there is no process-wide registry.
//!
//! # Memory Ordering
//!
//! Gauges and counters use Relaxed ordering. Consistency between the tracker's
//! gauges and its pending set comes from updating both inside the tracker's
//! critical section, not from the atomics themselves.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tablet_core::TxnKind;

/// Gauge of transactions currently in flight, all kinds
pub const ALL_TRANSACTIONS_INFLIGHT: &str = "all_transactions_inflight";
/// Gauge of write transactions currently in flight
pub const WRITE_TRANSACTIONS_INFLIGHT: &str = "write_transactions_inflight";
/// Gauge of schema-change transactions currently in flight
pub const ALTER_SCHEMA_TRANSACTIONS_INFLIGHT: &str = "alter_schema_transactions_inflight";
/// Gauge of other transactions currently in flight
pub const OTHER_TRANSACTIONS_INFLIGHT: &str = "other_transactions_inflight";
/// Counter of admissions rejected because of memory pressure
pub const TRANSACTION_MEMORY_PRESSURE_REJECTIONS: &str = "transaction_memory_pressure_rejections";

/// Unsigned gauge
#[derive(Debug, Default)]
pub struct AtomicGauge {
    value: AtomicU64,
}

impl AtomicGauge {
    /// Add one
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Subtract one, saturating at zero
    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Overwrite the current value
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Add one
    pub fn increment(&self) {
        self.increment_by(1);
    }

    /// Add `n`
    pub fn increment_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time value of one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricValue {
    /// Metric name
    pub name: String,
    /// `"gauge"` or `"counter"`
    pub metric_type: &'static str,
    /// Value at snapshot time
    pub value: u64,
}

#[derive(Default)]
struct EntityMetrics {
    gauges: FxHashMap<String, Arc<AtomicGauge>>,
    counters: FxHashMap<String, Arc<Counter>>,
}

/// Named collection of metrics for one entity (e.g. one tablet)
pub struct MetricEntity {
    entity_type: String,
    id: String,
    metrics: Mutex<EntityMetrics>,
}

impl MetricEntity {
    /// Create an empty entity
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Arc<Self> {
        Arc::new(MetricEntity {
            entity_type: entity_type.into(),
            id: id.into(),
            metrics: Mutex::new(EntityMetrics::default()),
        })
    }

    /// Entity type, e.g. `"tablet"`
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Entity id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Find or create the gauge called `name`
    pub fn gauge(&self, name: &str) -> Arc<AtomicGauge> {
        let mut metrics = self.metrics.lock();
        Arc::clone(metrics.gauges.entry(name.to_string()).or_default())
    }

    /// Find or create the counter called `name`
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut metrics = self.metrics.lock();
        Arc::clone(metrics.counters.entry(name.to_string()).or_default())
    }

    /// Look up an existing gauge
    pub fn find_gauge(&self, name: &str) -> Option<Arc<AtomicGauge>> {
        self.metrics.lock().gauges.get(name).cloned()
    }

    /// Look up an existing counter
    pub fn find_counter(&self, name: &str) -> Option<Arc<Counter>> {
        self.metrics.lock().counters.get(name).cloned()
    }

    /// All metric values, sorted by name
    pub fn snapshot(&self) -> Vec<MetricValue> {
        let metrics = self.metrics.lock();
        let mut values: Vec<MetricValue> = metrics
            .gauges
            .iter()
            .map(|(name, g)| MetricValue {
                name: name.clone(),
                metric_type: "gauge",
                value: g.value(),
            })
            .chain(metrics.counters.iter().map(|(name, c)| MetricValue {
                name: name.clone(),
                metric_type: "counter",
                value: c.value(),
            }))
            .collect();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        values
    }
}

impl std::fmt::Debug for MetricEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricEntity")
            .field("entity_type", &self.entity_type)
            .field("id", &self.id)
            .finish()
    }
}

/// The gauges and counter a transaction tracker reports into
pub(crate) struct TrackerMetrics {
    all_inflight: Arc<AtomicGauge>,
    write_inflight: Arc<AtomicGauge>,
    alter_schema_inflight: Arc<AtomicGauge>,
    other_inflight: Arc<AtomicGauge>,
    memory_pressure_rejections: Arc<Counter>,
}

impl TrackerMetrics {
    pub(crate) fn new(entity: &MetricEntity) -> Self {
        TrackerMetrics {
            all_inflight: entity.gauge(ALL_TRANSACTIONS_INFLIGHT),
            write_inflight: entity.gauge(WRITE_TRANSACTIONS_INFLIGHT),
            alter_schema_inflight: entity.gauge(ALTER_SCHEMA_TRANSACTIONS_INFLIGHT),
            other_inflight: entity.gauge(OTHER_TRANSACTIONS_INFLIGHT),
            memory_pressure_rejections: entity.counter(TRANSACTION_MEMORY_PRESSURE_REJECTIONS),
        }
    }

    fn kind_gauge(&self, kind: TxnKind) -> &AtomicGauge {
        match kind {
            TxnKind::Write => &self.write_inflight,
            TxnKind::AlterSchema => &self.alter_schema_inflight,
            TxnKind::Other => &self.other_inflight,
        }
    }

    pub(crate) fn record_admitted(&self, kind: TxnKind) {
        self.all_inflight.increment();
        self.kind_gauge(kind).increment();
    }

    pub(crate) fn record_released(&self, kind: TxnKind) {
        self.all_inflight.decrement();
        self.kind_gauge(kind).decrement();
    }

    pub(crate) fn record_rejection(&self) {
        self.memory_pressure_rejections.increment();
    }

    /// Overwrite the gauges from an authoritative count of pending kinds
    pub(crate) fn seed(&self, kinds: impl Iterator<Item = TxnKind>) {
        let pending: Vec<TxnKind> = kinds.collect();
        for kind in TxnKind::ALL {
            let count = pending.iter().filter(|k| **k == kind).count();
            self.kind_gauge(kind).set(count as u64);
        }
        self.all_inflight.set(pending.len() as u64);
    }
}
