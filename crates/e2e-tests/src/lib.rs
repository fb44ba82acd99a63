//! End-to-end test infrastructure for timemachine.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full append-to-query path, including reopening an index
//! from disk.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use timemachine_search::{IndexConfig, TimeMachineIndex};
use timemachine_types::{Address, MessageRecord};

/// Senders used by generated corpora
pub const SENDERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// Vocabulary used by generated corpora
pub const WORDS: [&str; 12] = [
    "deploy", "build", "release", "lunch", "coffee", "review", "merge", "rollback", "meeting",
    "standup", "ticket", "hotfix",
];

/// Shared test harness for E2E tests.
///
/// Owns a temp directory holding one index and an open handle to it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Location of the index directory
    pub index_path: PathBuf,
    /// Open index handle
    pub index: Arc<TimeMachineIndex>,
    config: IndexConfig,
}

impl TestHarness {
    /// Create a harness with the default result limit.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Create a harness with a custom result limit.
    pub fn with_limit(limit: usize) -> Self {
        Self::with_config(|config| config.with_limit(limit))
    }

    fn with_config(adjust: impl FnOnce(IndexConfig) -> IndexConfig) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_path = temp_dir.path().join("timemachine_index");
        // Tests do not need fsync per append
        let config = adjust(IndexConfig::new(&index_path).with_sync_writes(false));
        let index =
            Arc::new(TimeMachineIndex::open(config.clone()).expect("Failed to open test index"));

        Self {
            _temp_dir: temp_dir,
            index_path,
            index,
            config,
        }
    }

    /// Close the current handle and open a fresh one on the same directory.
    pub fn reopen(&mut self) {
        self.index.close().expect("Failed to close index");
        self.index = Arc::new(
            TimeMachineIndex::open(self.config.clone()).expect("Failed to reopen index"),
        );
    }

    /// Append records, returning their positions.
    pub fn ingest(&self, records: &[MessageRecord]) -> Vec<u64> {
        records
            .iter()
            .map(|r| self.index.append_record(r).expect("Failed to append record"))
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed reference time for deterministic tests (2012-08-26 09:00:00 UTC).
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 8, 26, 9, 0, 0).unwrap()
}

/// Address of a user on the test domain.
pub fn user(node: &str) -> Address {
    Address::new(node, "example.org", "laptop")
}

/// The shared chat room address.
pub fn room() -> Address {
    Address::new("room", "conference.example.org", "")
}

/// A message from `from` to the room at `base_time() + offset`.
pub fn message(offset: Duration, from: &str, body: &str) -> MessageRecord {
    MessageRecord::new(base_time() + offset, user(from), room(), body)
}

/// Create N messages one minute apart with bodies `"{base_text} {i}"`.
pub fn create_test_messages(count: usize, from: &str, base_text: &str) -> Vec<MessageRecord> {
    (0..count)
        .map(|i| {
            message(
                Duration::minutes(i as i64),
                from,
                &format!("{} {}", base_text, i),
            )
        })
        .collect()
}

/// Deterministic random corpus.
///
/// Timestamps are spread over 48 hours and deliberately not in append
/// order; bodies are three words from `WORDS`.
pub fn random_corpus(seed: u64, count: usize) -> Vec<MessageRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let offset = Duration::seconds(rng.random_range(0..48 * 3600));
            let from = SENDERS[rng.random_range(0..SENDERS.len())];
            let body = (0..3)
                .map(|_| WORDS[rng.random_range(0..WORDS.len())])
                .collect::<Vec<_>>()
                .join(" ");
            message(offset, from, &body)
        })
        .collect()
}
