//! # Memdump Core
//!
//! Always-on capture buffer and extraction engine.
//!
//! A single producer appends event records to the active one of two
//! fixed-capacity segments; rotation retires it and recycles the older one.
//! Extraction jobs read the retained history while the producer keeps
//! writing and copy a filtered, time-bounded slice into a dump file.
//!
//! This crate provides:
//! - [`Segment`] and [`SegmentSet`] with reader-protected rotation
//! - Extraction jobs with a two-pass drain of the active segment
//! - A continuous dump governor with a disk quota and saturation backoff
//! - [`DumpReader`] for reading output artifacts back
//! - The [`MemoryDumper`] facade tying them together
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use memdump_core::{JobRequest, MemdumpConfig, MemoryDumper};
//!
//! let dumper = MemoryDumper::new(MemdumpConfig::default())?;
//! dumper.ingest(1_000, 7, b"connect 10.0.0.1:443");
//! dumper.rotate(2_000)?;
//!
//! let job = dumper.submit_job(
//!     &JobRequest::new("/tmp/alert.scap").trigger(2_000).look_back(5_000),
//!     None,
//! );
//! println!("{:?}", dumper.job_status(&job));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod dump;
mod dumper;
mod error;
mod filter;
mod job;
mod segment;
mod stats;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{MemdumpConfig, MAX_SEGMENTS, NOMINAL_SEGMENTS};
pub use dump::{
    CloseReason, ContinuousDump, ContinuousDumpStatus, DumpReader, DumpRecords, DumpSummary,
    DumpWriter, SessionClosed, StartOutcome,
};
pub use dumper::{IngestOutcome, MemdumpStatus, MemoryDumper, MemoryDumperBuilder};
pub use error::{CoreError, CoreResult};
pub use filter::{FilterCompiler, JobFilter, NoFilterCompiler, Predicate};
pub use job::{CaptureWindow, Job, JobHandle, JobId, JobRequest, JobState, JobStatus};
pub use segment::{
    DeferredRotation, RotationOutcome, Segment, SegmentInfo, SegmentSet, SegmentWriter, SlotId,
};
pub use stats::{DumperStats, StatsSnapshot};

// Re-export the codec types that appear in the public API.
pub use memdump_codec::{DumpHeader, EventRecord, Notification, RecordKind};
pub use memdump_storage::ShmNamespace;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
