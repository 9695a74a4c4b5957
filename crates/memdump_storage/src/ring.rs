//! Framed byte ring backing a shared region.
//!
//! Every append stores one opaque frame:
//!
//! ```text
//! | frame_len (4, LE, payload bytes only) | payload (N) |
//! ```
//!
//! Positions are logical byte offsets that only ever grow. The physical
//! position of a logical offset is `offset % capacity`. When an append would
//! exceed the capacity, whole frames are evicted from the front so that the
//! retained range `[start, end)` always starts on a frame boundary and never
//! contains a torn frame.
//!
//! Writes become visible to readers only after [`WriterHandle::flush`].
//!
//! Readers take the region lock for one frame copy at a time and never hold
//! it between frames, so a reader delays the writer by at most one copy.

use crate::error::{StorageError, StorageResult};
use crate::namespace::ShmNamespace;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Size of the length prefix in front of every frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Result of appending a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The frame was stored at this logical offset.
    Stored {
        /// Logical offset of the frame header.
        offset: u64,
        /// Number of older frames evicted to make room.
        evicted: usize,
    },
    /// The frame is larger than the whole region and was dropped.
    TooLarge,
    /// The region was closed and the frame was dropped.
    Closed,
}

#[derive(Debug)]
struct RingState {
    data: Vec<u8>,
    /// Logical offset of the oldest retained frame.
    start: u64,
    /// Logical offset one past the newest frame.
    end: u64,
    /// Logical offsets of retained frames, oldest first.
    frames: VecDeque<u64>,
    /// Bytes ever appended, including frame headers.
    total_appended: u64,
}

impl RingState {
    fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    fn copy_in(&mut self, offset: u64, bytes: &[u8]) {
        let cap = self.data.len();
        let pos = (offset % cap as u64) as usize;
        let first = bytes.len().min(cap - pos);
        self.data[pos..pos + first].copy_from_slice(&bytes[..first]);
        if first < bytes.len() {
            let rest = bytes.len() - first;
            self.data[..rest].copy_from_slice(&bytes[first..]);
        }
    }

    fn copy_out(&self, offset: u64, out: &mut [u8]) {
        let cap = self.data.len();
        let pos = (offset % cap as u64) as usize;
        let first = out.len().min(cap - pos);
        out[..first].copy_from_slice(&self.data[pos..pos + first]);
        if first < out.len() {
            let rest = out.len() - first;
            out[first..].copy_from_slice(&self.data[..rest]);
        }
    }
}

/// The storage behind one named region.
///
/// Regions are reference counted: unlinking the name from its namespace does
/// not free the memory while a reader or writer handle still points at it.
#[derive(Debug)]
pub(crate) struct Region {
    name: String,
    state: RwLock<RingState>,
    /// Logical offset up to which frames are visible to readers.
    flushed: AtomicU64,
    closed: AtomicBool,
}

impl Region {
    pub(crate) fn allocate(name: &str, capacity: usize) -> StorageResult<Self> {
        if capacity <= FRAME_HEADER_SIZE {
            return Err(StorageError::InvalidCapacity { capacity });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| StorageError::ResourceExhausted {
                name: name.to_string(),
                requested: capacity as u64,
            })?;
        data.resize(capacity, 0);

        Ok(Self {
            name: name.to_string(),
            state: RwLock::new(RingState {
                data,
                start: 0,
                end: 0,
                frames: VecDeque::new(),
                total_appended: 0,
            }),
            flushed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.state.read().capacity()
    }
}

/// Write capability over a region.
///
/// Only the namespace hands these out, and only on creation, so a region has
/// exactly one writer.
#[derive(Debug)]
pub struct WriterHandle {
    region: Arc<Region>,
    namespace: ShmNamespace,
}

impl WriterHandle {
    pub(crate) fn new(region: Arc<Region>, namespace: ShmNamespace) -> Self {
        Self { region, namespace }
    }

    /// Returns the region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.region.name
    }

    /// Returns the region capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.region.capacity()
    }

    /// Appends one frame. Never blocks on readers for longer than a copy.
    ///
    /// Frames that cannot fit even in an empty region are dropped. Otherwise
    /// the oldest frames are evicted until the new one fits.
    pub fn append(&self, payload: &[u8]) -> AppendOutcome {
        if self.region.closed.load(Ordering::Acquire) {
            return AppendOutcome::Closed;
        }

        let frame_len = (FRAME_HEADER_SIZE + payload.len()) as u64;
        let Ok(len_prefix) = u32::try_from(payload.len()) else {
            return AppendOutcome::TooLarge;
        };

        let mut state = self.region.state.write();
        if frame_len > state.capacity() {
            return AppendOutcome::TooLarge;
        }

        let offset = state.end;
        let new_end = offset + frame_len;
        let mut evicted = 0;
        while new_end - state.start > state.capacity() {
            state.frames.pop_front();
            state.start = state.frames.front().copied().unwrap_or(offset);
            evicted += 1;
        }

        state.copy_in(offset, &len_prefix.to_le_bytes());
        state.copy_in(offset + FRAME_HEADER_SIZE as u64, payload);
        state.frames.push_back(offset);
        state.end = new_end;
        state.total_appended += frame_len;

        AppendOutcome::Stored { offset, evicted }
    }

    /// Publishes all appended frames to readers.
    ///
    /// Returns the number of bytes now readable, which never exceeds the
    /// capacity. Safe to call from any thread.
    pub fn flush(&self) -> u64 {
        let state = self.region.state.read();
        self.region.flushed.store(state.end, Ordering::Release);
        state.end - state.start
    }

    /// Returns the bytes written so far, capped at the capacity.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        let state = self.region.state.read();
        state.total_appended.min(state.capacity())
    }

    /// Returns the logical offset of the oldest retained frame.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        self.region.state.read().start
    }

    /// Returns whether the region has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.region.closed.load(Ordering::Acquire)
    }

    /// Closes the region and unlinks its name.
    ///
    /// Existing reader handles keep working on the frames already flushed;
    /// new opens by name fail.
    pub fn close(&self) {
        if !self.region.closed.swap(true, Ordering::AcqRel) {
            self.namespace.unlink_region(&self.region);
        }
    }
}

/// One frame read back from a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical offset of the frame header.
    pub offset: u64,
    /// Logical offset of the next frame.
    pub next_offset: u64,
    /// The opaque payload.
    pub payload: Vec<u8>,
}

/// Read-only capability over a region.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    region: Arc<Region>,
}

impl ReaderHandle {
    pub(crate) fn new(region: Arc<Region>) -> Self {
        Self { region }
    }

    /// Returns the region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.region.name
    }

    /// Returns the logical offset of the last flush.
    #[must_use]
    pub fn flushed_offset(&self) -> u64 {
        self.region.flushed.load(Ordering::Acquire)
    }

    /// Iterates frames from `offset` up to the flush point observed now.
    ///
    /// Frames written after this call, or after the observed flush point, are
    /// not returned. If `offset` has already been overwritten the iterator
    /// resumes at the oldest retained frame and reports the skipped bytes via
    /// [`Frames::skipped`].
    #[must_use]
    pub fn read_from(&self, offset: u64) -> Frames<'_> {
        Frames {
            region: &self.region,
            cursor: offset,
            limit: self.flushed_offset(),
            skipped: 0,
        }
    }
}

/// Iterator over flushed frames of a region.
#[derive(Debug)]
pub struct Frames<'a> {
    region: &'a Region,
    cursor: u64,
    limit: u64,
    skipped: u64,
}

impl Frames<'_> {
    /// Returns the logical offset the next read starts from.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Returns the bytes skipped because the writer overwrote them.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Iterator for Frames<'_> {
    type Item = StorageResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        // Released at return; the writer may append between frames.
        let state = self.region.state.read();

        if self.cursor < state.start {
            self.skipped += state.start - self.cursor;
            self.cursor = state.start;
        }

        let limit = self.limit.min(state.end);
        if self.cursor >= limit {
            return None;
        }

        if limit - self.cursor < FRAME_HEADER_SIZE as u64 {
            return Some(Err(StorageError::corrupted(format!(
                "truncated frame header at offset {} in {}",
                self.cursor, self.region.name
            ))));
        }

        let mut len_bytes = [0u8; FRAME_HEADER_SIZE];
        state.copy_out(self.cursor, &mut len_bytes);
        let len = u64::from(u32::from_le_bytes(len_bytes));
        let next_offset = self.cursor + FRAME_HEADER_SIZE as u64 + len;

        if next_offset > limit {
            return Some(Err(StorageError::corrupted(format!(
                "frame at offset {} extends past flushed end {} in {}",
                self.cursor, limit, self.region.name
            ))));
        }

        let mut payload = vec![0u8; len as usize];
        state.copy_out(self.cursor + FRAME_HEADER_SIZE as u64, &mut payload);

        let frame = Frame {
            offset: self.cursor,
            next_offset,
            payload,
        };
        self.cursor = next_offset;
        Some(Ok(frame))
    }
}
