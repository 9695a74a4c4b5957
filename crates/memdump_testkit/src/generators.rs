//! Property-based test generators using proptest.
//!
//! Provides strategies for generating event streams and producer/job
//! operation sequences.

use memdump_core::EventRecord;
use proptest::prelude::*;

/// Strategy for generating event payloads.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max_len)
}

/// Strategy for generating a single event record.
pub fn record_strategy() -> impl Strategy<Value = EventRecord> {
    (any::<u64>(), 0u64..64, payload_strategy(256))
        .prop_map(|(ts, tid, payload)| EventRecord::event(ts, tid, payload))
}

/// Strategy for generating a stream of events with strictly increasing
/// timestamps starting at 1.
pub fn event_stream_strategy(
    min_len: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<EventRecord>> {
    prop::collection::vec((1u64..1_000, 0u64..8, payload_strategy(64)), min_len..max_len)
        .prop_map(|items| {
            let mut ts = 0u64;
            items
                .into_iter()
                .map(|(step, tid, payload)| {
                    ts += step;
                    EventRecord::event(ts, tid, payload)
                })
                .collect()
        })
}

/// An operation against a dumper.
#[derive(Debug, Clone)]
pub enum DumperOp {
    /// Ingest an event.
    Ingest {
        /// Thread id.
        tid: u64,
        /// Payload.
        payload: Vec<u8>,
    },
    /// Rotate segments.
    Rotate,
    /// Claim the oldest segment, as a job would.
    Claim,
    /// Release the oldest claim.
    Release,
    /// Run a retroactive job.
    Job {
        /// Look-back span in ticks.
        look_back: u64,
    },
}

/// Strategy for generating dumper operations.
pub fn dumper_op_strategy() -> impl Strategy<Value = DumperOp> {
    prop_oneof![
        6 => (0u64..4, payload_strategy(48))
            .prop_map(|(tid, payload)| DumperOp::Ingest { tid, payload }),
        2 => Just(DumperOp::Rotate),
        1 => Just(DumperOp::Claim),
        1 => Just(DumperOp::Release),
        1 => (0u64..50).prop_map(|look_back| DumperOp::Job { look_back }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DumperOp>> {
    prop::collection::vec(dumper_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
