//! Concurrency E2E tests.
//!
//! Many threads append through one shared handle while others query; every
//! append must be visible exactly once afterwards.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::Duration;
use pretty_assertions::assert_eq;

use e2e_tests::{message, TestHarness};

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

#[test]
fn test_concurrent_appends_are_all_visible() {
    let harness = TestHarness::with_limit(THREADS * PER_THREAD * 2);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let index = Arc::clone(&harness.index);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        let offset = Duration::seconds((i * THREADS + t) as i64);
                        let body = format!("concurrent writer{} item{}", t, i);
                        index
                            .append_record(&message(offset, &format!("writer{}", t), &body))
                            .unwrap()
                    })
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut positions = HashSet::new();
    for handle in handles {
        for position in handle.join().unwrap() {
            assert!(positions.insert(position), "position {} assigned twice", position);
        }
    }
    let total = THREADS * PER_THREAD;
    assert_eq!(positions.len(), total);
    assert_eq!(positions, (0..total as u64).collect::<HashSet<_>>());

    let response = harness.index.index_query("concurrent").unwrap();
    assert_eq!(response.len(), total);

    let bodies: HashSet<_> = response.results.iter().map(|d| d.body.clone()).collect();
    assert_eq!(bodies.len(), total);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            assert!(bodies.contains(&format!("concurrent writer{} item{}", t, i)));
        }
    }
    assert!(response.results.windows(2).all(|w| w[0].ts <= w[1].ts));
}

#[test]
fn test_readers_see_consistent_state_during_appends() {
    let harness = TestHarness::with_limit(1000);

    let writer = {
        let index = Arc::clone(&harness.index);
        thread::spawn(move || {
            for i in 0..200 {
                index
                    .append_record(&message(Duration::seconds(i), "alice", "steady stream"))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&harness.index);
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..50 {
                    let seen = index.index_query("steady AND stream").unwrap().len();
                    // Appends are never observed half-applied or rolled back
                    assert!(seen >= last);
                    last = seen;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(harness.index.index_query("stream").unwrap().len(), 200);
}
