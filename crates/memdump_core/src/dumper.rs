//! Memory dumper facade.

use crate::clock::{Clock, MonotonicClock};
use crate::config::MemdumpConfig;
use crate::dump::{CloseReason, ContinuousDump, ContinuousDumpStatus, SessionClosed, StartOutcome};
use crate::error::{CoreError, CoreResult};
use crate::filter::{FilterCompiler, JobFilter, NoFilterCompiler};
use crate::job::{
    drain_segment, CaptureWindow, DrainProgress, Job, JobHandle, JobId, JobRequest, JobState,
    JobStatus, SegmentView,
};
use crate::segment::{
    DeferredRotation, RotationOutcome, SegmentInfo, SegmentSet, SegmentWriter, SlotId,
};
use crate::stats::{DumperStats, StatsSnapshot};
use memdump_codec::{EventRecord, Notification, FRAME_LEN_SIZE};
use memdump_storage::{ReaderHandle, ShmNamespace};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of ingesting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored in the active segment.
    Stored,
    /// Dropped because a rotation is deferred behind a reader.
    Missed,
    /// Dropped because it does not fit in a segment.
    Dropped,
    /// Capture is disabled or the dumper is closed.
    Disabled,
}

/// Point-in-time state of a [`MemoryDumper`].
#[derive(Debug, Clone, Serialize)]
pub struct MemdumpStatus {
    /// Capture was disabled by an allocation failure.
    pub capture_disabled: bool,
    /// The dumper has not been closed.
    pub dumping: bool,
    /// Segments, newest first.
    pub segments: Vec<SegmentInfo>,
    /// A rotation waiting for a reader to finish.
    pub deferred_rotation: Option<DeferredRotation>,
    /// Continuous dump state.
    pub continuous: ContinuousDumpStatus,
    /// Jobs kept in the registry.
    pub tracked_jobs: usize,
    /// Counters.
    pub stats: StatsSnapshot,
}

/// A segment retired by a rotation, ready to be persisted.
struct Retired {
    reader: ReaderHandle,
    capacity: u64,
}

/// The capture buffer and extraction engine.
///
/// One producer thread calls [`MemoryDumper::ingest`] and
/// [`MemoryDumper::rotate`]; any number of threads may submit jobs
/// concurrently.
///
/// # Locking
///
/// The segment set lock is only held for structural changes and is never
/// held while waiting on the pause lock. A caller that supplies its own
/// pause lock must hold it around `ingest` and never call into the dumper
/// while holding it from a job thread.
///
/// While a continuous dump session is open, [`MemoryDumper::rotate`] copies
/// the retired segment (up to `buffer_size / 3` bytes) to the session file
/// before returning. The copy runs on the rotating thread under the
/// continuous dump lock, so a producer that rotates also pays for the disk
/// write, and `status` and `start_continuous_dump` wait for it.
///
/// # Example
///
/// ```rust,ignore
/// use memdump_core::{JobRequest, MemdumpConfig, MemoryDumper};
///
/// let dumper = MemoryDumper::new(MemdumpConfig::default())?;
/// dumper.ingest(1_000, 42, b"open /etc/passwd");
///
/// let job = dumper.submit_job(&JobRequest::new("/tmp/alert.scap").trigger(1_000), None);
/// assert_eq!(job.events_written(), 1);
/// ```
pub struct MemoryDumper {
    config: MemdumpConfig,
    segment_capacity: u64,
    set: Mutex<SegmentSet>,
    active: RwLock<Option<Arc<SegmentWriter>>>,
    append_lock: Mutex<()>,
    deferred: AtomicBool,
    disabled: AtomicBool,
    dumping: AtomicBool,
    continuous: Mutex<ContinuousDump>,
    jobs: Mutex<BTreeMap<JobId, JobHandle>>,
    next_job_id: AtomicU64,
    compiler: Box<dyn FilterCompiler>,
    clock: Arc<dyn Clock>,
    stats: DumperStats,
}

/// Builder for [`MemoryDumper`].
pub struct MemoryDumperBuilder {
    config: MemdumpConfig,
    namespace: Option<ShmNamespace>,
    compiler: Option<Box<dyn FilterCompiler>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MemoryDumperBuilder {
    /// Uses `namespace` for segment regions instead of a private one.
    #[must_use]
    pub fn namespace(mut self, namespace: ShmNamespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Uses `compiler` for job filters.
    #[must_use]
    pub fn compiler(mut self, compiler: impl FilterCompiler + 'static) -> Self {
        self.compiler = Some(Box::new(compiler));
        self
    }

    /// Uses `clock` wherever a time is not given explicitly.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Creates the dumper and opens its segments.
    ///
    /// A segment allocation failure does not fail the build: capture is
    /// disabled instead and reported by [`MemoryDumper::is_capture_disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> CoreResult<MemoryDumper> {
        self.config.validate()?;
        let segment_capacity = self.config.segment_capacity();
        let capacity = usize::try_from(segment_capacity)
            .map_err(|_| CoreError::invalid_config("segment capacity does not fit in memory"))?;

        let mut set = SegmentSet::new(
            self.namespace.unwrap_or_default(),
            self.config.segment_name_prefix.clone(),
            capacity,
        );
        let opened = set.open_all();

        let dumper = MemoryDumper {
            continuous: Mutex::new(ContinuousDump::new(&self.config)),
            active: RwLock::new(set.active_writer()),
            set: Mutex::new(set),
            config: self.config,
            segment_capacity,
            append_lock: Mutex::new(()),
            deferred: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            dumping: AtomicBool::new(true),
            jobs: Mutex::new(BTreeMap::new()),
            next_job_id: AtomicU64::new(1),
            compiler: self.compiler.unwrap_or_else(|| Box::new(NoFilterCompiler)),
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            stats: DumperStats::new(),
        };

        match opened {
            Ok(()) => info!(
                segment_capacity,
                prefix = %dumper.config.segment_name_prefix,
                "memory dumper initialized"
            ),
            Err(e) => dumper.disable(&e),
        }
        Ok(dumper)
    }
}

impl MemoryDumper {
    /// Creates a dumper with a private namespace, no filter compiler and a
    /// monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: MemdumpConfig) -> CoreResult<Self> {
        Self::builder(config).build()
    }

    /// Starts building a dumper.
    #[must_use]
    pub fn builder(config: MemdumpConfig) -> MemoryDumperBuilder {
        MemoryDumperBuilder {
            config,
            namespace: None,
            compiler: None,
            clock: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MemdumpConfig {
        &self.config
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &DumperStats {
        &self.stats
    }

    /// Returns the dumper clock reading.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now_ns()
    }

    /// Returns whether capture was disabled by an allocation failure.
    #[must_use]
    pub fn is_capture_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Returns the lock `ingest` holds while appending.
    ///
    /// Jobs submitted without a pause lock of their own use this one.
    #[must_use]
    pub fn pause_lock(&self) -> &Mutex<()> {
        &self.append_lock
    }

    fn disable(&self, cause: &CoreError) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            error!(error = %cause, "disabling capture");
        }
        *self.active.write() = None;
    }

    // ---- ingestion ----

    /// Ingests an event.
    pub fn ingest(&self, ts: u64, tid: u64, payload: &[u8]) -> IngestOutcome {
        self.ingest_record(&EventRecord::event(ts, tid, payload.to_vec()))
    }

    /// Ingests a prepared record.
    ///
    /// Never fails: when capture is disabled, the dumper closed or a
    /// rotation deferred, the record is dropped and the outcome says why.
    pub fn ingest_record(&self, record: &EventRecord) -> IngestOutcome {
        if self.is_capture_disabled() || !self.dumping.load(Ordering::Acquire) {
            return IngestOutcome::Disabled;
        }

        if self.deferred.load(Ordering::Acquire) && !self.retry_deferred(record.ts) {
            self.stats.record_missed();
            return IngestOutcome::Missed;
        }

        if FRAME_LEN_SIZE + record.encoded_size() > self.segment_capacity as usize {
            self.stats.record_oversized();
            return IngestOutcome::Dropped;
        }

        let Some(writer) = self.active.read().clone() else {
            return IngestOutcome::Disabled;
        };
        let stored = {
            let _guard = self.append_lock.lock();
            writer.append(record)
        };
        if stored {
            self.stats.record_ingest();
            IngestOutcome::Stored
        } else {
            self.stats.record_oversized();
            IngestOutcome::Dropped
        }
    }

    /// Runs the deferred rotation if its reader is gone. Returns whether
    /// ingestion may proceed.
    fn retry_deferred(&self, now: u64) -> bool {
        let rotated = {
            let mut set = self.set.lock();
            if !set.deferred_ready() {
                set.record_missed_event();
                return false;
            }
            self.rotate_locked(&mut set)
        };
        match rotated {
            Ok((_, retired)) => {
                if let Some(retired) = retired {
                    self.persist_retired(&retired, now);
                }
                !self.deferred.load(Ordering::Acquire)
            }
            Err(_) => false,
        }
    }

    /// Ingests a notification record.
    ///
    /// Notifications pass every job filter.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the notification cannot be encoded.
    pub fn push_notification(
        &self,
        ts: u64,
        tid: u64,
        id: &str,
        description: &str,
    ) -> CoreResult<IngestOutcome> {
        let record = Notification::new(id, description).into_record(ts, tid)?;
        Ok(self.ingest_record(&record))
    }

    // ---- rotation ----

    /// Retires the active segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CaptureDisabled`] if capture is disabled, or the
    /// allocation error that just disabled it.
    pub fn rotate(&self, now: u64) -> CoreResult<RotationOutcome> {
        if self.is_capture_disabled() {
            return Err(CoreError::CaptureDisabled);
        }
        let (outcome, retired) = self.rotate_locked(&mut self.set.lock())?;
        if let Some(retired) = retired {
            self.persist_retired(&retired, now);
        }
        Ok(outcome)
    }

    /// Rotates the set. Returns the retired segment when a rotation took
    /// place.
    fn rotate_locked(
        &self,
        set: &mut SegmentSet,
    ) -> CoreResult<(RotationOutcome, Option<Retired>)> {
        let outcome = match set.rotate() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.disable(&e);
                return Err(e);
            }
        };

        match outcome {
            RotationOutcome::Deferred => {
                self.deferred.store(true, Ordering::Release);
                self.stats.record_rotation_deferred();
                Ok((outcome, None))
            }
            RotationOutcome::Rotated { grew, resolved } => {
                self.deferred.store(false, Ordering::Release);
                self.stats.record_rotation();
                if grew {
                    self.stats.record_segment_grown();
                }
                if let Some(report) = resolved {
                    warn!(
                        missed_events = report.missed_events,
                        dropped_rotations = report.dropped_requests,
                        "resuming event processing"
                    );
                }
                *self.active.write() = set.active_writer();

                let previous = set.previous();
                let retired = set.segment(previous).and_then(|segment| {
                    segment.flush();
                    segment.open_reader().ok().map(|reader| Retired {
                        reader,
                        capacity: segment.capacity() as u64,
                    })
                });
                debug!(
                    active = set.segment(set.active()).map_or("", |s| s.name()),
                    segments = set.len(),
                    "rotated capture segments"
                );
                Ok((outcome, retired))
            }
        }
    }

    /// Copies the retired segment into the open session, on this thread.
    fn persist_retired(&self, retired: &Retired, now: u64) {
        let mut dump = self.continuous.lock();
        if !dump.is_open() {
            return;
        }
        match dump.persist(&retired.reader) {
            Ok(bytes) => self.stats.record_dump_bytes(bytes),
            Err(e) => {
                error!(error = %e, "continuous dump failed");
                dump.abort();
                return;
            }
        }
        if let Some(closed) = dump.on_rotation(retired.capacity, now) {
            if closed.reason == CloseReason::Quota {
                self.stats.record_dump_saturation();
            }
        }
    }

    // ---- jobs ----

    /// Submits an extraction job and drains the buffered history into its
    /// output on the calling thread.
    ///
    /// `pause` is the lock the producer holds around its appends; `None`
    /// uses [`MemoryDumper::pause_lock`]. Failures are reported through
    /// the returned job, never as an error.
    pub fn submit_job(&self, request: &JobRequest, pause: Option<&Mutex<()>>) -> JobHandle {
        self.stats.record_job_submitted();
        let id = JobId::new(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        let trigger = request.trigger_ns.unwrap_or_else(|| self.now());
        let window = CaptureWindow::around(trigger, request.look_back_ns, request.look_forward_ns);

        let filter = match JobFilter::compile(self.compiler.as_ref(), &request.filter) {
            Ok(filter) => Some(filter),
            Err(e) => {
                let job = Arc::new(Job::new(id, request, window, None));
                self.fail_job(&job, &e);
                return job;
            }
        };
        let job = Arc::new(Job::new(id, request, window, filter));

        if self.is_capture_disabled() {
            self.fail_job(&job, &CoreError::CaptureDisabled);
            return job;
        }

        let tracked = request.track && window.has_future();
        if tracked {
            self.jobs.lock().insert(id, Arc::clone(&job));
        }

        debug!(job = %id, start = window.start, end = window.end, "starting capture job");
        job.start_reading();
        let result = self.drain(&job, pause.unwrap_or(&self.append_lock));
        self.stats.record_job_events(job.events_written());

        match result {
            Err(e) => self.fail_job(&job, &e),
            Ok(DrainProgress::Stopped) => {
                job.finish(JobState::Stopped);
            }
            Ok(DrainProgress::Completed) if !tracked => {
                job.finish(JobState::DoneOk);
            }
            Ok(DrainProgress::Completed) => {
                job.mark_drained();
                debug!(job = %id, end = window.end, "job waiting for its forward window");
            }
        }
        job
    }

    fn fail_job(&self, job: &Job, cause: &CoreError) {
        error!(job = %job.id(), error = %cause, "capture job failed");
        self.stats.record_job_failed();
        job.fail(cause);
    }

    /// Walks segments oldest to newest with hand-over-hand claims.
    fn drain(&self, job: &Job, pause: &Mutex<()>) -> CoreResult<DrainProgress> {
        let mut slot = self.set.lock().claim_oldest();
        let mut held = true;

        let result = loop {
            match self.view(job, slot) {
                Ok(Some(view)) => match drain_segment(job, &view, pause) {
                    Ok(DrainProgress::Completed) => {}
                    other => break other,
                },
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            if job.stop_requested() {
                break Ok(DrainProgress::Stopped);
            }
            match self.set.lock().advance_claim(slot) {
                Some(next) => slot = next,
                None => {
                    held = false;
                    break Ok(DrainProgress::Completed);
                }
            }
        };

        let mut set = self.set.lock();
        if held {
            set.release(slot);
        }
        set.shrink();
        result
    }

    /// Snapshots what the job needs to read `slot`, or `None` to skip it.
    fn view(&self, job: &Job, slot: SlotId) -> CoreResult<Option<SegmentView>> {
        let set = self.set.lock();
        let Some(segment) = set.segment(slot) else {
            return Ok(None);
        };
        if !segment.is_open()
            || segment.records_written() == 0
            || !job.window().reaches(segment.end_ts())
        {
            return Ok(None);
        }
        Ok(Some(SegmentView {
            reader: segment.open_reader()?,
            writer: segment.writer(),
            active: set.active() == slot,
        }))
    }

    /// Requests cancellation.
    ///
    /// A job draining on another thread stops at the next record; a tracked
    /// job waiting for its forward window stops now.
    pub fn stop_job(&self, job: &JobHandle) {
        job.request_stop();
        if job.finish(JobState::Stopped) {
            info!(job = %job.id(), "capture job stopped");
        }
    }

    /// Returns the status of `job`.
    #[must_use]
    pub fn job_status(&self, job: &JobHandle) -> JobStatus {
        job.status()
    }

    /// Drops a finished job from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the job is not terminal.
    pub fn remove_job(&self, job: &JobHandle) -> CoreResult<()> {
        if !job.state().is_terminal() {
            return Err(CoreError::invalid_operation(format!(
                "{} is still running",
                job.id()
            )));
        }
        self.jobs.lock().remove(&job.id());
        Ok(())
    }

    /// Returns the registered jobs.
    #[must_use]
    pub fn tracked_jobs(&self) -> Vec<JobHandle> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Completes tracked jobs whose forward window ended by `now`.
    ///
    /// Jobs still draining their history are left alone; they become
    /// eligible once `submit_job` has returned them.
    ///
    /// Returns how many jobs completed.
    pub fn tick(&self, now: u64) -> usize {
        let jobs = self.jobs.lock();
        jobs.values()
            .filter(|job| job.awaits_forward_window() && now >= job.window().end)
            .filter(|job| job.finish(JobState::DoneOk))
            .inspect(|job| debug!(job = %job.id(), "capture job completed"))
            .count()
    }

    // ---- continuous dump ----

    /// Sets the continuous dump quota and backoff.
    pub fn configure_continuous_dump(&self, max_disk_bytes: u64, saturation_backoff_ns: u64) {
        self.continuous
            .lock()
            .configure(max_disk_bytes, saturation_backoff_ns);
    }

    /// Opens a continuous dump session, or re-arms the open one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CaptureDisabled`] if capture is disabled, or
    /// [`CoreError::Write`] if the session file cannot be created.
    pub fn start_continuous_dump(&self, name: &str, ts: u64) -> CoreResult<StartOutcome> {
        if self.is_capture_disabled() {
            return Err(CoreError::CaptureDisabled);
        }
        let outcome = self.continuous.lock().start(name, ts)?;
        if matches!(outcome, StartOutcome::Started(_)) {
            self.stats.record_dump_session();
        }
        Ok(outcome)
    }

    /// Closes the continuous dump session.
    pub fn stop_continuous_dump(&self) -> Option<SessionClosed> {
        self.continuous.lock().stop()
    }

    // ---- lifecycle ----

    /// Performs a final rotation, closes any continuous session and stops
    /// accepting events.
    pub fn close(&self, ts: u64) {
        if !self.dumping.swap(false, Ordering::AcqRel) {
            return;
        }
        if !self.is_capture_disabled() {
            if let Err(e) = self.rotate(ts) {
                warn!(error = %e, "final rotation failed");
            }
        }
        self.stop_continuous_dump();
        info!("memory dumper closed");
    }

    /// Returns a snapshot of the dumper state.
    #[must_use]
    pub fn status(&self) -> MemdumpStatus {
        let (segments, deferred_rotation) = {
            let set = self.set.lock();
            (set.infos(), set.deferred())
        };
        MemdumpStatus {
            capture_disabled: self.is_capture_disabled(),
            dumping: self.dumping.load(Ordering::Acquire),
            segments,
            deferred_rotation,
            continuous: self.continuous.lock().status(),
            tracked_jobs: self.jobs.lock().len(),
            stats: self.stats.snapshot(),
        }
    }
}

impl std::fmt::Debug for MemoryDumper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDumper")
            .field("config", &self.config)
            .field("capture_disabled", &self.is_capture_disabled())
            .finish_non_exhaustive()
    }
}
