//! Extraction jobs.
//!
//! A job materializes a filtered, time-bounded slice of the buffered
//! history into a dump file. Jobs are shared as [`JobHandle`]s: the caller
//! keeps one, the dumper keeps another while the job is tracked.

mod drain;

pub(crate) use drain::{drain_segment, DrainProgress, SegmentView};

use crate::dump::DumpWriter;
use crate::error::{CoreError, CoreResult};
use crate::filter::JobFilter;
use memdump_codec::{DumpHeader, EventRecord};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to a job.
pub type JobHandle = Arc<Job>;

/// Job identifier, unique per dumper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl JobId {
    /// Creates an id from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Job lifecycle.
///
/// ```text
/// Pending -> Reading -> DoneOk | DoneError | Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, not yet reading.
    Pending,
    /// Draining segments, or tracked and waiting for its forward window.
    Reading,
    /// Finished successfully.
    DoneOk,
    /// Failed; the job carries the cause.
    DoneError,
    /// Cancelled by the caller.
    Stopped,
}

impl JobState {
    /// Returns whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::DoneOk | Self::DoneError | Self::Stopped)
    }
}

/// Time bounds of a job, in nanoseconds. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureWindow {
    /// Lower bound; 0 means the start of retained history.
    pub start: u64,
    /// Upper bound; 0 means unbounded.
    pub end: u64,
}

impl CaptureWindow {
    /// Derives the window from a trigger time and look-back/forward spans.
    #[must_use]
    pub const fn around(trigger: u64, look_back: u64, look_forward: u64) -> Self {
        let start = if look_back > 0 {
            trigger.saturating_sub(look_back)
        } else {
            0
        };
        let end = if look_forward > 0 {
            trigger.saturating_add(look_forward)
        } else {
            0
        };
        Self { start, end }
    }

    /// Returns whether a record at `ts` falls in the window.
    #[must_use]
    pub const fn contains(&self, ts: u64) -> bool {
        ts >= self.start && (self.end == 0 || ts <= self.end)
    }

    /// Returns whether a segment whose newest record is at `end_ts` can
    /// hold records in the window.
    #[must_use]
    pub const fn reaches(&self, end_ts: u64) -> bool {
        self.start == 0 || end_ts >= self.start
    }

    /// Returns whether the window has a forward part.
    #[must_use]
    pub const fn has_future(&self) -> bool {
        self.end != 0
    }
}

/// Parameters of a job submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Name written to the dump header.
    pub name: String,
    /// Trigger time; `None` means now.
    pub trigger_ns: Option<u64>,
    /// Look-back span; 0 means from the start of retained history.
    pub look_back_ns: u64,
    /// Look-forward span; 0 means no forward capture.
    pub look_forward_ns: u64,
    /// Filter expression; empty matches everything.
    pub filter: String,
    /// Output file.
    pub output: PathBuf,
    /// Keep the job registered until its forward window elapses.
    pub track: bool,
}

impl JobRequest {
    /// Creates a request writing to `output` with an empty filter and no
    /// window bounds.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            name: String::new(),
            trigger_ns: None,
            look_back_ns: 0,
            look_forward_ns: 0,
            filter: String::new(),
            output: output.into(),
            track: false,
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the trigger time.
    #[must_use]
    pub const fn trigger(mut self, ts: u64) -> Self {
        self.trigger_ns = Some(ts);
        self
    }

    /// Sets the look-back span.
    #[must_use]
    pub const fn look_back(mut self, ns: u64) -> Self {
        self.look_back_ns = ns;
        self
    }

    /// Sets the look-forward span.
    #[must_use]
    pub const fn look_forward(mut self, ns: u64) -> Self {
        self.look_forward_ns = ns;
        self
    }

    /// Sets the filter expression.
    #[must_use]
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = expression.into();
        self
    }

    /// Sets whether the job is tracked.
    #[must_use]
    pub const fn track(mut self, track: bool) -> Self {
        self.track = track;
        self
    }
}

/// Status reported by [`Job::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    /// Job id.
    pub id: JobId,
    /// Current state.
    pub state: JobState,
    /// Records written to the output.
    pub events_written: u64,
    /// Cause of a `DoneError` state.
    pub error: Option<String>,
}

enum Output {
    Unopened,
    Open(DumpWriter),
    Closed,
}

/// One extraction job.
pub struct Job {
    id: JobId,
    name: String,
    window: CaptureWindow,
    filter: Option<JobFilter>,
    filter_expression: String,
    output_path: PathBuf,
    tracked: bool,
    state: Mutex<JobState>,
    last_error: Mutex<Option<String>>,
    events: AtomicU64,
    stop: AtomicBool,
    drained: AtomicBool,
    output: Mutex<Output>,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        request: &JobRequest,
        window: CaptureWindow,
        filter: Option<JobFilter>,
    ) -> Self {
        let name = if request.name.is_empty() {
            id.to_string()
        } else {
            request.name.clone()
        };
        Self {
            id,
            name,
            window,
            filter,
            filter_expression: request.filter.clone(),
            output_path: request.output.clone(),
            tracked: request.track,
            state: Mutex::new(JobState::Pending),
            last_error: Mutex::new(None),
            events: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            output: Mutex::new(Output::Unopened),
        }
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capture window.
    #[must_use]
    pub fn window(&self) -> CaptureWindow {
        self.window
    }

    /// Returns the output path.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Returns whether the job was submitted as tracked.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Returns the number of records written.
    #[must_use]
    pub fn events_written(&self) -> u64 {
        self.events.load(Ordering::Acquire)
    }

    /// Returns the last error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Returns state, counters and error together.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id,
            state: self.state(),
            events_written: self.events_written(),
            error: self.last_error(),
        }
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Marks the buffered history as fully read.
    pub(crate) fn mark_drained(&self) {
        self.drained.store(true, Ordering::Release);
    }

    /// Returns whether the job has read its history and only waits for its
    /// forward window to elapse.
    pub(crate) fn awaits_forward_window(&self) -> bool {
        self.drained.load(Ordering::Acquire) && self.state() == JobState::Reading
    }

    pub(crate) fn start_reading(&self) -> bool {
        let mut state = self.state.lock();
        if *state == JobState::Pending {
            *state = JobState::Reading;
            true
        } else {
            false
        }
    }

    /// Moves the job to a terminal state and closes its output.
    ///
    /// Returns `false` if the job was already terminal.
    pub(crate) fn finish(&self, terminal: JobState) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = terminal;
        }
        let previous = std::mem::replace(&mut *self.output.lock(), Output::Closed);
        if let Output::Open(writer) = previous {
            if let Err(e) = writer.finish() {
                tracing::warn!(job = %self.id, error = %e, "could not sync job output");
            }
        }
        true
    }

    /// Records `error` and moves the job to `DoneError`.
    pub(crate) fn fail(&self, error: &CoreError) -> bool {
        *self.last_error.lock() = Some(error.to_string());
        self.finish(JobState::DoneError)
    }

    /// Returns whether `record` belongs in the output.
    pub(crate) fn wants(&self, record: &EventRecord) -> bool {
        self.window.contains(record.ts)
            && self.filter.as_ref().map_or(true, |f| f.matches(record))
    }

    /// Writes `record` to the output, opening it on first use.
    ///
    /// Records arriving after the job finished are discarded.
    pub(crate) fn write(&self, record: &EventRecord) -> CoreResult<()> {
        let mut output = self.output.lock();
        if matches!(*output, Output::Unopened) {
            let header = DumpHeader {
                name: self.name.clone(),
                start_ns: self.window.start,
                end_ns: self.window.end,
                filter: self.filter_expression.clone(),
            };
            *output = Output::Open(DumpWriter::create(&self.output_path, &header)?);
        }
        if let Output::Open(writer) = &mut *output {
            writer.write_record(record)?;
            self.events.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("window", &self.window)
            .field("filter", &self.filter_expression)
            .field("state", &self.state())
            .field("events", &self.events_written())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::DumpReader;
    use tempfile::tempdir;

    fn job(output: &Path, window: CaptureWindow) -> Job {
        Job::new(JobId::new(1), &JobRequest::new(output), window, None)
    }

    #[test]
    fn window_from_trigger() {
        assert_eq!(
            CaptureWindow::around(100, 30, 0),
            CaptureWindow { start: 70, end: 0 }
        );
        assert_eq!(
            CaptureWindow::around(100, 0, 20),
            CaptureWindow { start: 0, end: 120 }
        );
        assert_eq!(CaptureWindow::around(10, 30, 0).start, 0);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = CaptureWindow { start: 10, end: 20 };
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(9));
        assert!(!window.contains(21));
        assert!(CaptureWindow { start: 10, end: 0 }.contains(u64::MAX));
    }

    #[test]
    fn window_reaches_segments() {
        let window = CaptureWindow { start: 10, end: 0 };
        assert!(window.reaches(10));
        assert!(!window.reaches(9));
        assert!(CaptureWindow { start: 0, end: 0 }.reaches(0));
    }

    #[test]
    fn terminal_states_are_final() {
        let dir = tempdir().unwrap();
        let job = job(&dir.path().join("out"), CaptureWindow::around(0, 0, 0));
        assert!(job.start_reading());
        assert!(job.finish(JobState::Stopped));
        assert!(!job.finish(JobState::DoneOk));
        assert!(!job.fail(&CoreError::CaptureDisabled));
        assert_eq!(job.state(), JobState::Stopped);
    }

    #[test]
    fn forward_wait_starts_after_the_drain() {
        let dir = tempdir().unwrap();
        let job = job(&dir.path().join("out"), CaptureWindow::around(50, 0, 10));
        assert!(job.start_reading());
        assert!(!job.awaits_forward_window());

        job.mark_drained();
        assert!(job.awaits_forward_window());
        assert!(job.finish(JobState::DoneOk));
        assert!(!job.awaits_forward_window());
    }

    #[test]
    fn output_is_opened_lazily() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.scap");
        let job = job(&path, CaptureWindow::around(0, 0, 0));
        assert!(!path.exists());

        job.write(&EventRecord::event(1, 1, b"x".to_vec())).unwrap();
        assert!(job.finish(JobState::DoneOk));
        assert_eq!(job.events_written(), 1);

        let reader = DumpReader::open(&path).unwrap();
        assert_eq!(reader.header().name, "job-1");
        assert_eq!(reader.verify().unwrap().events, 1);
    }

    #[test]
    fn writes_after_finish_are_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.scap");
        let job = job(&path, CaptureWindow::around(0, 0, 0));
        job.finish(JobState::Stopped);

        job.write(&EventRecord::event(1, 1, b"x".to_vec())).unwrap();
        assert_eq!(job.events_written(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn failure_records_the_cause() {
        let dir = tempdir().unwrap();
        let job = job(&dir.path().join("out"), CaptureWindow::around(0, 0, 0));
        job.fail(&CoreError::read("/memdump-0", "boom"));
        let status = job.status();
        assert_eq!(status.state, JobState::DoneError);
        assert!(status.error.unwrap().contains("/memdump-0"));
    }
}
