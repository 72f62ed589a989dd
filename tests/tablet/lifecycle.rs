//! Tablet Lifecycle Tests
//!
//! Open from a directory, submit and begin transactions, close with drain.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn open_writes_default_config() {
    let t = TestTablet::new();
    assert!(t.dir.path().join(tablet_txn::CONFIG_FILE_NAME).exists());
    assert_eq!(t.tablet.config(), &TabletConfig::default());
    assert!(t.tablet.is_open());
    assert_eq!(t.tablet.num_pending(), 0);
}

#[test]
fn submitted_transactions_leave_nothing_behind() {
    let t = TestTablet::new();
    for i in 0..10 {
        let driver = t.tablet.submit(insert(format!("key{}", i))).unwrap();
        assert_eq!(driver.outcome(), Some(TxnOutcome::Committed));
    }
    let driver = t
        .tablet
        .submit(AlterSchemaOperation::new(
            "users",
            1,
            2,
            vec![ColumnChange::Add {
                name: "email".to_string(),
                data_type: "string".to_string(),
            }],
        ))
        .unwrap();
    assert_eq!(driver.kind(), TxnKind::AlterSchema);

    t.assert_consistent();
    assert_eq!(t.tablet.num_pending(), 0);
    assert_eq!(t.root.consumption(), 0);
    assert!(t.root.peak_consumption() > 0);
}

#[test]
fn failed_schema_change_is_aborted() {
    let t = TestTablet::new();
    let err = t
        .tablet
        .submit(AlterSchemaOperation::new("users", 3, 3, vec![]))
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(err.to_string().contains("not newer"));
    t.assert_consistent();
}

#[test]
fn begun_transactions_are_visible_by_kind() {
    let t = TestTablet::new();
    let w = t.tablet.begin(insert("a")).unwrap();
    let a = t
        .tablet
        .begin(AlterSchemaOperation::new("users", 1, 2, vec![]))
        .unwrap();
    let o = t.tablet.begin(NoOpOperation::new(TxnKind::Other)).unwrap();

    assert_eq!(t.gauge(ALL_TRANSACTIONS_INFLIGHT), 3);
    assert_eq!(t.gauge(WRITE_TRANSACTIONS_INFLIGHT), 1);
    assert_eq!(t.gauge(ALTER_SCHEMA_TRANSACTIONS_INFLIGHT), 1);
    assert_eq!(t.gauge(OTHER_TRANSACTIONS_INFLIGHT), 1);
    t.assert_consistent();

    let ids: Vec<_> = t
        .tablet
        .pending_transactions()
        .iter()
        .map(|d| d.id())
        .collect();
    assert_eq!(ids, vec![w.id(), a.id(), o.id()]);

    a.execute().unwrap();
    w.abort("client went away");
    o.complete();
    t.assert_consistent();
    assert_eq!(t.gauge(ALL_TRANSACTIONS_INFLIGHT), 0);
}

#[test]
fn close_waits_for_externally_driven_transactions() {
    let t = TestTablet::with_config(TabletConfig {
        drain_complain_interval_ms: 20,
        ..TabletConfig::default()
    });
    let drivers: Vec<TransactionHandle> = (0..5)
        .map(|i| t.tablet.begin(insert(format!("k{}", i))).unwrap())
        .collect();

    let finisher = thread::spawn(move || {
        for driver in drivers {
            thread::sleep(Duration::from_millis(15));
            driver.execute().unwrap();
        }
    });

    let start = Instant::now();
    t.tablet.close().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(t.tablet.num_pending(), 0);
    finisher.join().unwrap();
    t.assert_consistent();
}

#[test]
fn close_with_timeout_reports_pending_and_leaves_state() {
    let t = TestTablet::with_config(TabletConfig {
        drain_complain_interval_ms: 10,
        drain_timeout_ms: Some(40),
        ..TabletConfig::default()
    });
    let stuck = t.tablet.begin(insert("stuck")).unwrap();

    let err = t.tablet.close().unwrap_err();
    match &err {
        TabletError::DeadlineExceeded { pending, waited } => {
            assert_eq!(*pending, 1);
            assert!(*waited >= Duration::from_millis(40));
        }
        other => panic!("expected DeadlineExceeded, got {:?}", other),
    }
    assert!(err.to_string().contains("1 transactions pending"));
    assert!(stuck.is_pending());
    t.assert_consistent();

    // Closed to new work even though the drain failed
    assert!(t.tablet.begin(insert("late")).is_err());

    stuck.complete();
    t.tablet.close().unwrap();
}

#[test]
fn concurrent_submitters_then_close() {
    let t = TestTablet::new();
    let tablet = Arc::clone(&t.tablet);

    let handles: Vec<_> = (0..4)
        .map(|thread_id| {
            let tablet = Arc::clone(&tablet);
            thread::spawn(move || {
                for i in 0..100 {
                    tablet
                        .submit(insert(format!("t{}_{}", thread_id, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    t.tablet.close().unwrap();
    t.assert_consistent();
    assert_eq!(t.root.consumption(), 0);
}

#[test]
fn close_racing_begin_leaves_nothing_pending() {
    for _ in 0..50 {
        let t = TestTablet::new();
        let barrier = Arc::new(std::sync::Barrier::new(5));

        let submitters: Vec<_> = (0..4)
            .map(|thread_id| {
                let tablet = Arc::clone(&t.tablet);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut i = 0u64;
                    loop {
                        match tablet.begin(insert(format!("t{}_{}", thread_id, i))) {
                            Ok(driver) => {
                                driver.complete();
                            }
                            Err(e) => {
                                assert_eq!(e.error_code(), "InvalidInput");
                                return i;
                            }
                        }
                        i += 1;
                    }
                })
            })
            .collect();

        barrier.wait();
        t.tablet.close().unwrap();
        // Nothing admitted after close returned
        assert_eq!(t.tablet.num_pending(), 0);
        assert!(!t.tablet.is_open());

        for h in submitters {
            h.join().unwrap();
        }
        assert_eq!(t.tablet.num_pending(), 0);
        t.assert_consistent();
        assert_eq!(t.root.consumption(), 0);
    }
}
