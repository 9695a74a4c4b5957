//! Continuous dump sessions: persistence, quota and backoff.

use memdump_core::{
    CloseReason, DumpReader, IngestOutcome, MemdumpConfig, StartOutcome,
};
use memdump_testkit::TestDumper;
use std::path::PathBuf;
use std::time::Duration;

const SEC: u64 = 1_000_000_000;

fn started(outcome: StartOutcome) -> PathBuf {
    match outcome {
        StartOutcome::Started(path) => path,
        other => panic!("expected a new session, got {other:?}"),
    }
}

#[test]
fn quota_close_then_backoff() {
    let t = TestDumper::new(1000);
    t.configure_continuous_dump(2 * 1000, 5 * SEC);
    started(t.start_continuous_dump("quota", 0).unwrap());

    t.rotate(SEC).unwrap();
    assert_eq!(t.status().continuous.cumulative_bytes, 1000);
    t.rotate(2 * SEC).unwrap();
    let status = t.status().continuous;
    assert!(status.open_path.is_none());
    assert_eq!(status.saturated_since, Some(2 * SEC));
    t.rotate(3 * SEC).unwrap();

    assert!(matches!(
        t.start_continuous_dump("quota", 3 * SEC).unwrap(),
        StartOutcome::Saturated { .. }
    ));
    started(t.start_continuous_dump("quota", 8 * SEC).unwrap());

    let snap = t.stats().snapshot();
    assert_eq!(snap.dump_sessions, 2);
    assert_eq!(snap.dump_saturations, 1);
}

#[test]
fn each_rotation_persists_the_retired_segment() {
    let config = MemdumpConfig::new()
        .buffer_size(3 * 64 * 1024)
        .max_disk_size(u64::MAX);
    let t = TestDumper::with_config(config);
    t.ingest_range(0..5, 1);
    let path = started(t.start_continuous_dump("persist", 1_700_000_000 * SEC).unwrap());
    assert!(path.starts_with(t.dir()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("sd_dump_persist_11-14_22_13_20_"));

    t.rotate(SEC).unwrap();
    t.ingest_range(5..8, 1);
    t.rotate(2 * SEC).unwrap();

    assert!(t.status().continuous.open_path.is_none());
    assert_eq!(TestDumper::output_ts(&path), (0..8).collect::<Vec<_>>());

    let reader = DumpReader::open(&path).unwrap();
    assert_eq!(reader.header().name, "persist");
    assert!(t.stats().snapshot().dump_bytes_written > 0);
}

#[test]
fn rotation_returns_after_the_segment_is_on_disk() {
    let config = MemdumpConfig::new()
        .buffer_size(3 * 64 * 1024)
        .max_disk_size(u64::MAX);
    let t = TestDumper::with_config(config);
    let path = started(t.start_continuous_dump("sync", 0).unwrap());
    t.ingest_range(0..6, 2);

    t.rotate(SEC).unwrap();

    assert_eq!(t.status().continuous.open_path.as_deref(), Some(path.as_path()));
    assert_eq!(TestDumper::output_ts(&path), (0..6).collect::<Vec<_>>());
}

#[test]
fn restart_rearms_the_rotation_budget() {
    let t = TestDumper::new(64 * 1024);
    let path = started(t.start_continuous_dump("rearm", 0).unwrap());
    t.rotate(1).unwrap();
    assert_eq!(t.status().continuous.rotations_to_go, 1);

    assert_eq!(
        t.start_continuous_dump("rearm", 2).unwrap(),
        StartOutcome::Rearmed
    );
    assert_eq!(t.status().continuous.rotations_to_go, 2);
    t.rotate(3).unwrap();
    assert_eq!(
        t.status().continuous.open_path.as_deref(),
        Some(path.as_path())
    );
}

#[test]
fn stop_closes_the_session() {
    let t = TestDumper::new(64 * 1024);
    started(t.start_continuous_dump("stop", 0).unwrap());
    let closed = t.stop_continuous_dump().unwrap();
    assert_eq!(closed.reason, CloseReason::Stopped);
    assert!(t.stop_continuous_dump().is_none());
}

#[test]
fn close_flushes_the_last_segment() {
    let config = MemdumpConfig::new()
        .buffer_size(3 * 64 * 1024)
        .saturation_backoff(Duration::from_secs(1));
    let t = TestDumper::with_config(config);
    let path = started(t.start_continuous_dump("final", 0).unwrap());
    t.ingest_range(0..4, 1);

    t.close(10);

    let status = t.status();
    assert!(!status.dumping);
    assert!(status.continuous.open_path.is_none());
    assert_eq!(TestDumper::output_ts(&path), vec![0, 1, 2, 3]);
    assert_eq!(t.ingest(11, 1, b"late"), IngestOutcome::Disabled);
}

#[test]
fn rotation_charges_the_segment_capacity() {
    let t = TestDumper::new(4096);
    started(t.start_continuous_dump("idle", 0).unwrap());
    let before = t.status().continuous.cumulative_bytes;
    assert_eq!(before, 0);
    t.rotate(1).unwrap();
    assert_eq!(t.status().continuous.cumulative_bytes, 4096);
}
