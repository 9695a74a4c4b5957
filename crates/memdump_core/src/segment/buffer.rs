//! A single capture segment.

use crate::error::{CoreError, CoreResult};
use memdump_codec::EventRecord;
use memdump_storage::{AppendOutcome, ReaderHandle, ShmNamespace, WriterHandle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Write side of an open segment.
///
/// The ingestion path holds an `Arc` to this outside the segment set lock;
/// appends after the segment is closed are dropped by the region.
#[derive(Debug)]
pub struct SegmentWriter {
    handle: WriterHandle,
    end_ts: AtomicU64,
    records: AtomicU64,
}

impl SegmentWriter {
    /// Appends a record. Returns `false` if it was dropped.
    pub fn append(&self, record: &EventRecord) -> bool {
        match self.handle.append(&record.encode()) {
            AppendOutcome::Stored { .. } => {
                self.end_ts.fetch_max(record.ts, Ordering::AcqRel);
                self.records.fetch_add(1, Ordering::AcqRel);
                true
            }
            AppendOutcome::TooLarge | AppendOutcome::Closed => false,
        }
    }

    /// Publishes appended records to readers; returns the readable bytes.
    pub fn flush(&self) -> u64 {
        self.handle.flush()
    }

    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// A fixed-capacity, named capture log.
///
/// A segment is created closed. [`Segment::open`] allocates a fresh backing
/// region (dropping the previous contents) and [`Segment::close`] releases
/// it. Readers attach independently through [`Segment::open_reader`].
#[derive(Debug)]
pub struct Segment {
    name: String,
    capacity: usize,
    namespace: ShmNamespace,
    writer: Option<Arc<SegmentWriter>>,
}

impl Segment {
    /// Creates a closed segment.
    #[must_use]
    pub fn new(namespace: ShmNamespace, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            namespace,
            writer: None,
        }
    }

    /// Allocates a fresh, empty backing region.
    ///
    /// Any previous region is closed first; readers still attached to it
    /// keep their view.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Allocation`] if the region cannot be created.
    pub fn open(&mut self) -> CoreResult<()> {
        self.close();
        let handle = self
            .namespace
            .create(&self.name, self.capacity)
            .map_err(|e| CoreError::allocation(&self.name, e))?;
        self.writer = Some(Arc::new(SegmentWriter {
            handle,
            end_ts: AtomicU64::new(0),
            records: AtomicU64::new(0),
        }));
        Ok(())
    }

    /// Releases the backing region.
    pub fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.handle.close();
        }
    }

    /// Returns whether a backing region is attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the write capability, if open.
    #[must_use]
    pub fn writer(&self) -> Option<Arc<SegmentWriter>> {
        self.writer.clone()
    }

    /// Appends a record. Returns `false` if it was dropped.
    pub fn append(&self, record: &EventRecord) -> bool {
        self.writer.as_ref().is_some_and(|w| w.append(record))
    }

    /// Publishes appended records to readers; returns the readable bytes.
    pub fn flush(&self) -> u64 {
        self.writer.as_ref().map_or(0, |w| w.flush())
    }

    /// Returns the bytes written, capped at the capacity.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.writer.as_ref().map_or(0, |w| w.handle.bytes_written())
    }

    /// Returns the timestamp of the newest record, or 0 if empty.
    #[must_use]
    pub fn end_ts(&self) -> u64 {
        self.writer
            .as_ref()
            .map_or(0, |w| w.end_ts.load(Ordering::Acquire))
    }

    /// Returns the number of records appended since the last open.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.writer
            .as_ref()
            .map_or(0, |w| w.records.load(Ordering::Acquire))
    }

    /// Attaches an independent read-only handle by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Read`] if the region is not linked.
    pub fn open_reader(&self) -> CoreResult<ReaderHandle> {
        self.namespace.open_read(&self.name).map_err(|e| {
            CoreError::read(
                &self.name,
                format!("could not open shared memory region for reading: {e}"),
            )
        })
    }

    pub(crate) fn info(&self, active: bool, claimed: bool) -> SegmentInfo {
        SegmentInfo {
            name: self.name.clone(),
            capacity: self.capacity as u64,
            open: self.is_open(),
            bytes_written: self.bytes_written(),
            records: self.records_written(),
            end_ts: self.end_ts(),
            active,
            claimed,
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        self.close();
    }
}

/// Point-in-time description of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    /// Segment name.
    pub name: String,
    /// Capacity in bytes.
    pub capacity: u64,
    /// Whether a backing region is attached.
    pub open: bool,
    /// Bytes written, capped at the capacity.
    pub bytes_written: u64,
    /// Records appended since the last open.
    pub records: u64,
    /// Timestamp of the newest record.
    pub end_ts: u64,
    /// Whether this segment receives writes.
    pub active: bool,
    /// Whether a job is reading this segment.
    pub claimed: bool,
}
