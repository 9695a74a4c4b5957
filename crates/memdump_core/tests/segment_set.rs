//! Segment and segment set behavior through the public API.

use memdump_core::{
    EventRecord, IngestOutcome, MemdumpConfig, MemoryDumper, RotationOutcome, Segment,
    SegmentSet, ShmNamespace, SlotId, MAX_SEGMENTS, NOMINAL_SEGMENTS,
};
use memdump_testkit::{op_sequence_strategy, DumperOp, PropTestConfig, TestDumper};
use proptest::prelude::*;

/// Builds a record whose framed size is exactly `size` bytes.
fn sized_record(ts: u64, size: usize) -> EventRecord {
    let overhead = 4 + EventRecord::MIN_ENCODED_SIZE;
    EventRecord::event(ts, 1, vec![0xAB; size - overhead])
}

#[test]
fn ring_overwrite_keeps_newest_whole_records() {
    let mut segment = Segment::new(ShmNamespace::new(), "/ring", 1000);
    segment.open().unwrap();

    for ts in 0..15 {
        assert!(segment.append(&sized_record(ts, 100)));
    }
    segment.flush();

    assert_eq!(segment.bytes_written(), 1000);
    let reader = segment.open_reader().unwrap();
    let mut frames = reader.read_from(0);
    let ts: Vec<u64> = frames
        .by_ref()
        .map(|f| EventRecord::decode(&f.unwrap().payload).unwrap().ts)
        .collect();
    assert_eq!(ts, (5..15).collect::<Vec<_>>());
    assert_eq!(frames.skipped(), 500);
}

#[test]
fn unflushed_tail_is_invisible() {
    let mut segment = Segment::new(ShmNamespace::new(), "/tail", 1000);
    segment.open().unwrap();
    segment.append(&sized_record(0, 100));
    segment.flush();
    segment.append(&sized_record(1, 100));

    let reader = segment.open_reader().unwrap();
    assert_eq!(reader.read_from(0).count(), 1);
    segment.flush();
    assert_eq!(reader.read_from(0).count(), 2);
}

#[test]
fn allocation_failure_disables_capture() {
    let config = MemdumpConfig::new().buffer_size(3 * 4096);
    let t = TestDumper::with_namespace(config, ShmNamespace::with_limit(4096));

    assert!(t.is_capture_disabled());
    assert!(t.status().capture_disabled);
    assert_eq!(t.ingest(1, 1, b"dropped"), IngestOutcome::Disabled);
    assert!(t.rotate(2).is_err());

    let job = t.submit_job(&memdump_core::JobRequest::new(t.output("j")), None);
    assert_eq!(job.state(), memdump_core::JobState::DoneError);
}

#[test]
fn segment_names_use_prefix() {
    let config = MemdumpConfig::new()
        .buffer_size(3 * 4096)
        .segment_name_prefix("/unit-");
    let t = TestDumper::with_config(config);
    let names: Vec<_> = t.status().segments.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["/unit-0", "/unit-1"]);
    assert!(t.namespace.contains("/unit-0"));
}

#[test]
fn rotation_moves_the_active_segment() {
    let t = TestDumper::new(4096);
    t.ingest_range(0..3, 1);
    let before = t.status().segments;
    assert!(before[0].active);
    assert_eq!(before[0].records, 3);

    let outcome = t.rotate(3).unwrap();
    assert_eq!(
        outcome,
        RotationOutcome::Rotated {
            grew: false,
            resolved: None
        }
    );
    let after = t.status().segments;
    assert_eq!(after[1].name, before[0].name);
    assert_eq!(after[1].records, 3);
    assert!(after[0].active && !after[1].active);
    assert_eq!(after[0].records, 0);
}

#[test]
fn invalid_config_is_rejected() {
    let err = MemoryDumper::new(MemdumpConfig::new().buffer_size(0)).unwrap_err();
    assert!(matches!(err, memdump_core::CoreError::InvalidConfig { .. }));
}

fn check_invariants(set: &SegmentSet, claims: &[SlotId]) -> Result<(), TestCaseError> {
    let infos = set.infos();
    prop_assert!(infos.len() >= NOMINAL_SEGMENTS && infos.len() <= MAX_SEGMENTS);
    prop_assert_eq!(infos.iter().filter(|i| i.active).count(), 1);
    prop_assert!(infos[0].active);
    for &slot in claims {
        let segment = set.segment(slot);
        prop_assert!(segment.is_some_and(Segment::is_open));
        prop_assert!(set.is_claimed(slot));
    }
    Ok(())
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn set_invariants_hold_for_any_sequence(ops in op_sequence_strategy(1, 120)) {
        let mut set = SegmentSet::new(ShmNamespace::new(), "/prop-", 512);
        set.open_all().unwrap();
        let mut claims: Vec<SlotId> = Vec::new();
        let mut ts = 0u64;

        for op in ops {
            match op {
                DumperOp::Ingest { tid, payload } => {
                    ts += 1;
                    if let Some(writer) = set.active_writer() {
                        writer.append(&EventRecord::event(ts, tid, payload));
                    }
                }
                DumperOp::Rotate => {
                    let outcome = set.rotate().unwrap();
                    if outcome == RotationOutcome::Deferred {
                        prop_assert_eq!(set.len(), MAX_SEGMENTS);
                    }
                }
                DumperOp::Claim => claims.push(set.claim_oldest()),
                DumperOp::Release => {
                    if let Some(slot) = claims.pop() {
                        set.release(slot);
                        set.shrink();
                    }
                }
                DumperOp::Job { .. } => {
                    let mut slot = set.claim_oldest();
                    let mut visited = 1;
                    while let Some(next) = set.advance_claim(slot) {
                        slot = next;
                        visited += 1;
                    }
                    prop_assert_eq!(visited, set.len());
                    set.shrink();
                }
            }
            check_invariants(&set, &claims)?;
        }

        for slot in claims.drain(..) {
            set.release(slot);
        }
        set.shrink();
        prop_assert_eq!(set.len(), NOMINAL_SEGMENTS);
        prop_assert!(set.reader().is_none());
    }
}
