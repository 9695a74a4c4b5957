//! Dumper statistics.
//!
//! Counters the embedding agent can poll to see whether capture is keeping
//! up: dropped events, deferred rotations, failed jobs and so on.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = dumper.stats().snapshot();
//! println!("Ingested: {}", stats.events_ingested);
//! println!("Missed while deferred: {}", stats.events_missed);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dumper statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct DumperStats {
    // Ingestion
    /// Records stored in a segment.
    events_ingested: AtomicU64,
    /// Records dropped because they could not fit in a segment.
    events_oversized: AtomicU64,
    /// Records dropped while a rotation was deferred.
    events_missed: AtomicU64,

    // Rotation
    /// Completed rotations.
    rotations: AtomicU64,
    /// Rotation requests dropped while a rotation was deferred.
    rotations_deferred: AtomicU64,
    /// Temporary third segments created to protect a reader.
    segments_grown: AtomicU64,

    // Jobs
    /// Jobs submitted.
    jobs_submitted: AtomicU64,
    /// Jobs that ended in error.
    jobs_failed: AtomicU64,
    /// Records written by all jobs.
    job_events_written: AtomicU64,

    // Continuous dump
    /// Continuous sessions opened.
    dump_sessions: AtomicU64,
    /// Continuous sessions closed because of the quota.
    dump_saturations: AtomicU64,
    /// Bytes written to continuous dump files.
    dump_bytes_written: AtomicU64,
}

impl DumperStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_ingest(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oversized(&self) {
        self.events_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_missed(&self) {
        self.events_missed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation_deferred(&self) {
        self.rotations_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_grown(&self) {
        self.segments_grown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_job_events(&self, events: u64) {
        self.job_events_written.fetch_add(events, Ordering::Relaxed);
    }

    pub(crate) fn record_dump_session(&self) {
        self.dump_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dump_saturation(&self) {
        self.dump_saturations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dump_bytes(&self, bytes: u64) {
        self.dump_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns the number of records stored.
    pub fn events_ingested(&self) -> u64 {
        self.events_ingested.load(Ordering::Relaxed)
    }

    /// Returns the number of records dropped while a rotation was deferred.
    pub fn events_missed(&self) -> u64 {
        self.events_missed.load(Ordering::Relaxed)
    }

    /// Returns the number of completed rotations.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Returns the number of rotation requests dropped while deferred.
    pub fn rotations_deferred(&self) -> u64 {
        self.rotations_deferred.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_ingested: self.events_ingested(),
            events_oversized: self.events_oversized.load(Ordering::Relaxed),
            events_missed: self.events_missed(),
            rotations: self.rotations(),
            rotations_deferred: self.rotations_deferred(),
            segments_grown: self.segments_grown.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            job_events_written: self.job_events_written.load(Ordering::Relaxed),
            dump_sessions: self.dump_sessions.load(Ordering::Relaxed),
            dump_saturations: self.dump_saturations.load(Ordering::Relaxed),
            dump_bytes_written: self.dump_bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of dumper statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Records stored in a segment.
    pub events_ingested: u64,
    /// Records too large for a segment.
    pub events_oversized: u64,
    /// Records dropped while a rotation was deferred.
    pub events_missed: u64,
    /// Completed rotations.
    pub rotations: u64,
    /// Rotation requests dropped while deferred.
    pub rotations_deferred: u64,
    /// Temporary segments created.
    pub segments_grown: u64,
    /// Jobs submitted.
    pub jobs_submitted: u64,
    /// Jobs that failed.
    pub jobs_failed: u64,
    /// Records written by jobs.
    pub job_events_written: u64,
    /// Continuous sessions opened.
    pub dump_sessions: u64,
    /// Continuous sessions closed by the quota.
    pub dump_saturations: u64,
    /// Bytes written by continuous sessions.
    pub dump_bytes_written: u64,
}
