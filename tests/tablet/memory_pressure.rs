//! Memory Pressure Tests
//!
//! Admission against the tablet limit and against limits higher up the
//! memory tracker hierarchy.

use crate::common::*;
use tablet_txn::MIB;

/// Fixed-size key so every insert has the same footprint
fn sized_insert(i: usize) -> WriteOperation {
    insert(format!("k{:06}", i))
}

/// Begin inserts until one is rejected; returns the admitted handles
fn fill(t: &TestTablet) -> Vec<TransactionHandle> {
    let mut admitted = Vec::new();
    for i in 0.. {
        match t.tablet.begin(sized_insert(i)) {
            Ok(driver) => admitted.push(driver),
            Err(e) => {
                assert!(e.is_resource_exhausted(), "unexpected error: {}", e);
                return admitted;
            }
        }
    }
    unreachable!()
}

#[test]
fn tablet_limit_rejects_until_release() {
    let t = TestTablet::with_config(TabletConfig {
        transaction_memory_limit_mb: 1,
        ..TabletConfig::default()
    });

    let admitted = fill(&t);
    assert!(!admitted.is_empty());
    assert_eq!(t.rejections(), 1);
    let consumption = t.root.consumption();
    assert!(consumption <= MIB);
    assert!(consumption + admitted[0].memory_footprint() > MIB);
    t.assert_consistent();

    // Still full
    let err = t.tablet.begin(sized_insert(0)).unwrap_err();
    assert!(err.to_string().contains("exceeded its limit"));
    assert_eq!(t.rejections(), 2);

    // One release makes room for exactly one more of the same size
    admitted[0].complete();
    let again = t.tablet.begin(sized_insert(0)).unwrap();
    assert!(t.tablet.begin(sized_insert(1)).is_err());
    assert_eq!(t.rejections(), 3);

    again.complete();
    for driver in &admitted[1..] {
        driver.complete();
    }
    t.assert_consistent();
    assert_eq!(t.root.consumption(), 0);
}

#[test]
fn unlimited_tablet_is_bounded_by_ancestor() {
    init_logging();
    let root = MemTracker::root("server", Some(64 * 1024));
    let tablet = Tablet::open(
        "unlimited",
        TabletConfig {
            transaction_memory_limit_mb: -1,
            ..TabletConfig::default()
        },
        MetricEntity::new("tablet", "unlimited"),
        &root,
    )
    .unwrap();

    let mut admitted = Vec::new();
    let err = loop {
        match tablet.begin(NoOpOperation::default()) {
            Ok(driver) => admitted.push(driver),
            Err(e) => break e,
        }
    };
    assert!(err.is_resource_exhausted());
    assert!(err.to_string().contains("unlimited"));
    assert!(root.consumption() <= 64 * 1024);
    assert!(!admitted.is_empty());

    for driver in &admitted {
        driver.complete();
    }
    assert_eq!(root.consumption(), 0);
}

#[test]
fn sibling_tablets_share_an_ancestor_budget() {
    let root = MemTracker::root("server", Some(32 * 1024));
    let a = TestTablet::with_root(root);
    let b = TestTablet::with_root(std::sync::Arc::clone(&a.root));

    let held = fill(&a);
    assert_eq!(a.rejections(), 1);

    // The sibling sees the shared budget as exhausted
    assert!(b.tablet.begin(sized_insert(0)).unwrap_err().is_resource_exhausted());
    assert_eq!(b.rejections(), 1);
    assert_eq!(b.gauge(ALL_TRANSACTIONS_INFLIGHT), 0);

    held[0].complete();
    let moved = b.tablet.begin(sized_insert(0)).unwrap();
    assert_eq!(b.gauge(ALL_TRANSACTIONS_INFLIGHT), 1);

    moved.complete();
    for driver in &held[1..] {
        driver.complete();
    }
    assert_eq!(a.root.consumption(), 0);
}
