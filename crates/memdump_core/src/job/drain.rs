//! Two-pass drain of one segment.
//!
//! Pass one reads up to the flush point observed when it starts, without
//! any lock, while the producer keeps appending. On the active segment a
//! second pass runs under the pause lock: the producer is quiesced, the
//! writer is flushed again, and reading resumes exactly where pass one
//! stopped, so no record is missed or read twice.

use crate::error::{CoreError, CoreResult};
use crate::job::Job;
use crate::segment::SegmentWriter;
use memdump_codec::EventRecord;
use memdump_storage::{Frames, ReaderHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// What the job needs to read one segment.
#[derive(Debug)]
pub(crate) struct SegmentView {
    pub reader: ReaderHandle,
    pub writer: Option<Arc<SegmentWriter>>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainProgress {
    Completed,
    Stopped,
}

pub(crate) fn drain_segment(
    job: &Job,
    view: &SegmentView,
    pause: &Mutex<()>,
) -> CoreResult<DrainProgress> {
    if let Some(writer) = &view.writer {
        writer.flush();
    }
    let mut frames = view.reader.read_from(0);
    if copy_frames(job, view.reader.name(), &mut frames)? == DrainProgress::Stopped {
        return Ok(DrainProgress::Stopped);
    }
    let resume = frames.position();
    let mut skipped = frames.skipped();

    if view.active {
        let _paused = pause.lock();
        if let Some(writer) = &view.writer {
            writer.flush();
        }
        let mut tail = view.reader.read_from(resume);
        let progress = copy_frames(job, view.reader.name(), &mut tail)?;
        skipped += tail.skipped();
        if progress == DrainProgress::Stopped {
            return Ok(progress);
        }
    }

    if skipped > 0 {
        debug!(
            job = %job.id(),
            segment = view.reader.name(),
            skipped_bytes = skipped,
            "segment wrapped while reading"
        );
    }
    Ok(DrainProgress::Completed)
}

fn copy_frames(job: &Job, segment: &str, frames: &mut Frames<'_>) -> CoreResult<DrainProgress> {
    for frame in frames {
        if job.stop_requested() {
            return Ok(DrainProgress::Stopped);
        }
        let frame = frame.map_err(|e| CoreError::read(segment, e))?;
        let record = EventRecord::decode(&frame.payload)
            .map_err(|e| CoreError::read(segment, e))?;
        if job.wants(&record) {
            job.write(&record)?;
        }
    }
    Ok(DrainProgress::Completed)
}
