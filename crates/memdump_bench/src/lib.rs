//! Shared helpers for the memdump benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use memdump_core::{EventRecord, MemdumpConfig, MemoryDumper};
use std::path::Path;

/// Deterministic payload of the given size.
#[must_use]
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Event records with consecutive timestamps starting at 0.
#[must_use]
pub fn records(count: usize, payload_size: usize) -> Vec<EventRecord> {
    let data = payload(payload_size);
    (0..count as u64)
        .map(|ts| EventRecord::event(ts, ts % 8, data.clone()))
        .collect()
}

/// A dumper writing into `dir`, with `count` events already ingested.
///
/// # Panics
///
/// Panics if the dumper cannot be built.
#[must_use]
pub fn filled_dumper(dir: &Path, buffer_size: u64, count: usize) -> MemoryDumper {
    let config = MemdumpConfig::new().buffer_size(buffer_size).dump_dir(dir);
    let dumper = MemoryDumper::new(config).expect("bench dumper");
    for record in records(count, 64) {
        dumper.ingest_record(&record);
    }
    dumper
}
