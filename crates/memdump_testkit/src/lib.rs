//! # Memdump Testkit
//!
//! Test utilities for the memory dumper.
//!
//! This crate provides:
//! - Fixtures: temp-dir dumpers driven by a manual clock, record builders
//!   and a small filter compiler
//! - Property-based test generators using proptest
//! - Stress helpers running a producer against concurrent jobs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memdump_testkit::prelude::*;
//!
//! #[test]
//! fn job_sees_ingested_events() {
//!     let t = TestDumper::new(4096);
//!     t.ingest_range(0..10, 1);
//!     let job = t.submit_job(&JobRequest::new(t.output("job")).trigger(10), None);
//!     assert_eq!(job.events_written(), 10);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use memdump_core::{
        EventRecord, IngestOutcome, JobRequest, JobState, MemdumpConfig, MemoryDumper,
        RotationOutcome, StartOutcome,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
