//! Stress Tests
//!
//! Heavy workloads. All marked #[ignore] for opt-in execution.
//! Run with: cargo test --test tablet stress -- --ignored

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Many threads churn against a tight budget while a closer drains
#[test]
#[ignore]
fn stress_churn_under_memory_pressure_then_close() {
    let t = TestTablet::with_config(TabletConfig {
        transaction_memory_limit_mb: 1,
        drain_complain_interval_ms: 100,
        ..TabletConfig::default()
    });
    let barrier = Arc::new(Barrier::new(8));
    let admitted = Arc::new(AtomicU64::new(0));
    let rejected = Arc::new(AtomicU64::new(0));
    let held: Arc<Mutex<Vec<TransactionHandle>>> = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let tablet = Arc::clone(&t.tablet);
            let barrier = Arc::clone(&barrier);
            let admitted = Arc::clone(&admitted);
            let rejected = Arc::clone(&rejected);
            let held = Arc::clone(&held);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..5000 {
                    match tablet.begin(insert(format!("t{}_{:05}", thread_id, i))) {
                        Ok(driver) => {
                            admitted.fetch_add(1, Ordering::Relaxed);
                            if i % 3 == 0 {
                                held.lock().push(driver);
                            } else {
                                driver.execute().unwrap();
                            }
                        }
                        Err(e) => {
                            assert!(e.is_resource_exhausted());
                            rejected.fetch_add(1, Ordering::Relaxed);
                            if let Some(driver) = held.lock().pop() {
                                driver.complete();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(
        admitted.load(Ordering::Relaxed) + rejected.load(Ordering::Relaxed),
        8 * 5000
    );
    assert_eq!(t.rejections(), rejected.load(Ordering::Relaxed));
    t.assert_consistent();

    let leftovers = std::mem::take(&mut *held.lock());
    let closer = {
        let tablet = Arc::clone(&t.tablet);
        thread::spawn(move || tablet.close())
    };
    thread::sleep(Duration::from_millis(20));
    for driver in leftovers {
        driver.abort("shutdown");
    }
    closer.join().unwrap().unwrap();
    t.assert_consistent();
    assert_eq!(t.root.consumption(), 0);
}

/// Repeated open/submit/close cycles leave every root balanced
#[test]
#[ignore]
fn stress_repeated_open_close() {
    let root = MemTracker::root("server", Some(8 * 1024 * 1024));
    for cycle in 0..200 {
        let t = TestTablet::with_root(Arc::clone(&root));
        for i in 0..50 {
            t.tablet.submit(insert(format!("c{}_{}", cycle, i))).unwrap();
        }
        t.tablet.close().unwrap();
        assert_eq!(root.consumption(), 0);
    }
}
