//! Test fixtures and dumper helpers.
//!
//! Provides a dumper wired to a temp directory and a manual clock, plus
//! record builders and a toy filter compiler.

use memdump_core::{
    DumpReader, EventRecord, FilterCompiler, IngestOutcome, ManualClock, MemdumpConfig,
    MemoryDumper, Predicate, ShmNamespace, MAX_SEGMENTS,
};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test dumper with automatic cleanup.
pub struct TestDumper {
    /// The dumper instance.
    pub dumper: MemoryDumper,
    /// The clock the dumper reads when no time is given.
    pub clock: Arc<ManualClock>,
    /// The shared namespace holding the segment regions.
    pub namespace: ShmNamespace,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestDumper {
    /// Creates a dumper whose segments hold `segment_capacity` bytes each.
    pub fn new(segment_capacity: u64) -> Self {
        Self::with_config(MemdumpConfig::new().buffer_size(segment_capacity * MAX_SEGMENTS as u64))
    }

    /// Creates a dumper from `config`, redirecting its dump directory to a
    /// temp dir.
    pub fn with_config(config: MemdumpConfig) -> Self {
        Self::with_namespace(config, ShmNamespace::new())
    }

    /// Creates a dumper whose segments live in `namespace`.
    pub fn with_namespace(config: MemdumpConfig, namespace: ShmNamespace) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(0));
        let dumper = MemoryDumper::builder(config.dump_dir(dir.path().join("dumps")))
            .namespace(namespace.clone())
            .compiler(TestCompiler)
            .clock(clock.clone())
            .build()
            .expect("Failed to build dumper");
        Self {
            dumper,
            clock,
            namespace,
            dir,
        }
    }

    /// Returns the temp directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a fresh output path for a job.
    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.scap"))
    }

    /// Ingests one record per timestamp in `range`, all from `tid`.
    ///
    /// Returns how many were stored.
    pub fn ingest_range(&self, range: Range<u64>, tid: u64) -> usize {
        range
            .filter(|&ts| self.dumper.ingest_record(&record(ts, tid)) == IngestOutcome::Stored)
            .count()
    }

    /// Returns the timestamps of the records in a dump file.
    pub fn output_ts(path: &Path) -> Vec<u64> {
        read_records(path).into_iter().map(|r| r.ts).collect()
    }
}

impl std::ops::Deref for TestDumper {
    type Target = MemoryDumper;

    fn deref(&self) -> &Self::Target {
        &self.dumper
    }
}

/// Builds an event record with a payload derived from `ts`.
pub fn record(ts: u64, tid: u64) -> EventRecord {
    EventRecord::event(ts, tid, format!("evt-{ts}").into_bytes())
}

/// Reads every record of a dump file, panicking on corruption.
pub fn read_records(path: &Path) -> Vec<EventRecord> {
    DumpReader::open(path)
        .expect("Failed to open dump file")
        .records()
        .map(|r| r.expect("Corrupted dump record"))
        .collect()
}

/// A toy filter language for tests.
///
/// - `tid=<n>` matches one thread
/// - `tid!=<n>` matches every other thread
/// - `payload~<text>` matches payloads containing `text`
#[derive(Debug, Default, Clone, Copy)]
pub struct TestCompiler;

impl FilterCompiler for TestCompiler {
    fn compile(&self, expression: &str) -> Result<Box<dyn Predicate>, String> {
        if let Some(value) = expression.strip_prefix("tid!=") {
            let tid = parse_tid(value)?;
            return Ok(Box::new(move |r: &EventRecord| r.tid != tid));
        }
        if let Some(value) = expression.strip_prefix("tid=") {
            let tid = parse_tid(value)?;
            return Ok(Box::new(move |r: &EventRecord| r.tid == tid));
        }
        if let Some(text) = expression.strip_prefix("payload~") {
            let needle = text.as_bytes().to_vec();
            return Ok(Box::new(move |r: &EventRecord| {
                r.payload.windows(needle.len().max(1)).any(|w| w == needle)
            }));
        }
        Err(format!("unexpected token in '{expression}'"))
    }
}

fn parse_tid(value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid thread id '{value}'"))
}
