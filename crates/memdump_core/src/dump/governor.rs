//! Continuous dump sessions and their disk quota.
//!
//! While a session is open every rotation persists the retired segment to
//! the session file and charges the segment capacity against the quota. A
//! session closes when its rotation budget runs out or the quota is
//! reached; a quota close starts a saturation backoff during which new
//! sessions are refused.

use crate::config::MemdumpConfig;
use crate::dump::file::DumpWriter;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use memdump_codec::DumpHeader;
use memdump_storage::ReaderHandle;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result of [`ContinuousDump::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session file was opened.
    Started(PathBuf),
    /// A session was already open; its rotation budget was reset.
    Rearmed,
    /// Refused: the last session hit the quota too recently.
    Saturated {
        /// Nanoseconds until a session may start again.
        retry_after_ns: u64,
    },
}

/// Why a session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The rotation budget ran out.
    Budget,
    /// The disk quota was reached.
    Quota,
    /// Stopped by the caller.
    Stopped,
    /// Writing the session file failed.
    Failed,
}

/// A session that just closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClosed {
    /// Session file.
    pub path: PathBuf,
    /// Why it closed.
    pub reason: CloseReason,
    /// Bytes charged against the quota.
    pub accounted_bytes: u64,
    /// Records persisted to the file.
    pub records: u64,
}

/// Point-in-time state of the continuous dump governor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinuousDumpStatus {
    /// File of the open session.
    pub open_path: Option<PathBuf>,
    /// Bytes charged against the quota by the open session.
    pub cumulative_bytes: u64,
    /// Rotations left before the open session closes.
    pub rotations_to_go: u32,
    /// When the last quota close happened.
    pub saturated_since: Option<u64>,
    /// Configured quota.
    pub max_disk_size: u64,
    /// Configured backoff.
    pub saturation_backoff_ns: u64,
}

#[derive(Debug)]
struct Session {
    writer: DumpWriter,
    cur_size: u64,
}

/// The continuous dump governor.
#[derive(Debug)]
pub struct ContinuousDump {
    dir: PathBuf,
    max_size: u64,
    backoff_ns: u64,
    rotation_budget: u32,
    switches_to_go: u32,
    session: Option<Session>,
    saturation_start: Option<u64>,
}

impl ContinuousDump {
    /// Creates an idle governor.
    #[must_use]
    pub fn new(config: &MemdumpConfig) -> Self {
        Self {
            dir: config.dump_dir.clone(),
            max_size: config.max_disk_size,
            backoff_ns: duration_ns(config.saturation_backoff),
            rotation_budget: config.continuous_rotations,
            switches_to_go: 0,
            session: None,
            saturation_start: None,
        }
    }

    /// Sets the quota and backoff for this and future sessions.
    pub fn configure(&mut self, max_disk_bytes: u64, saturation_backoff_ns: u64) {
        self.max_size = max_disk_bytes;
        self.backoff_ns = saturation_backoff_ns;
    }

    /// Returns whether a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Opens a session, or re-arms the open one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] if the session file cannot be created.
    pub fn start(&mut self, name: &str, ts: u64) -> CoreResult<StartOutcome> {
        if let Some(since) = self.saturation_start {
            let elapsed = ts.saturating_sub(since);
            if elapsed < self.backoff_ns {
                debug!(
                    elapsed_ns = elapsed,
                    backoff_ns = self.backoff_ns,
                    "refusing continuous dump during saturation backoff"
                );
                return Ok(StartOutcome::Saturated {
                    retry_after_ns: self.backoff_ns - elapsed,
                });
            }
        }

        self.switches_to_go = self.rotation_budget;
        if self.session.is_some() {
            return Ok(StartOutcome::Rearmed);
        }

        let path = self.dir.join(file_name(name, ts));
        let header = DumpHeader {
            name: name.to_string(),
            start_ns: ts,
            end_ns: 0,
            filter: String::new(),
        };
        let writer = DumpWriter::create(&path, &header)?;
        info!(path = %path.display(), "opened continuous dump file");
        self.session = Some(Session {
            writer,
            cur_size: 0,
        });
        Ok(StartOutcome::Started(path))
    }

    /// Appends every record readable through `reader` to the session file.
    ///
    /// Returns the bytes written, 0 when no session is open.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Read`] or [`CoreError::Write`].
    pub fn persist(&mut self, reader: &ReaderHandle) -> CoreResult<u64> {
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        let mut written = 0;
        for frame in reader.read_from(0) {
            let frame = frame.map_err(|e| CoreError::read(reader.name(), e))?;
            written += session.writer.write_body(&frame.payload)?;
        }
        session.writer.flush()?;
        Ok(written)
    }

    /// Charges one retired segment of `capacity` bytes to the open session.
    ///
    /// Returns the session if this closed it.
    pub fn on_rotation(&mut self, capacity: u64, now: u64) -> Option<SessionClosed> {
        let session = self.session.as_mut()?;
        session.cur_size = session.cur_size.saturating_add(capacity);
        self.switches_to_go = self.switches_to_go.saturating_sub(1);

        let reason = if session.cur_size >= self.max_size {
            info!(
                used = session.cur_size,
                limit = self.max_size,
                "{}",
                CoreError::QuotaExceeded {
                    used: session.cur_size,
                    limit: self.max_size,
                }
            );
            self.saturation_start = Some(now);
            CloseReason::Quota
        } else if self.switches_to_go == 0 {
            CloseReason::Budget
        } else {
            return None;
        };
        self.close(reason)
    }

    /// Closes the open session.
    pub fn stop(&mut self) -> Option<SessionClosed> {
        self.close(CloseReason::Stopped)
    }

    /// Closes the open session after a write failure.
    pub fn abort(&mut self) -> Option<SessionClosed> {
        self.close(CloseReason::Failed)
    }

    fn close(&mut self, reason: CloseReason) -> Option<SessionClosed> {
        let session = self.session.take()?;
        self.switches_to_go = 0;
        let path = session.writer.path().to_path_buf();
        let records = match session.writer.finish() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not sync continuous dump file");
                0
            }
        };
        info!(path = %path.display(), ?reason, "closed continuous dump file");
        Some(SessionClosed {
            path,
            reason,
            accounted_bytes: session.cur_size,
            records,
        })
    }

    /// Returns the governor state.
    #[must_use]
    pub fn status(&self) -> ContinuousDumpStatus {
        ContinuousDumpStatus {
            open_path: self.session.as_ref().map(|s| s.writer.path().to_path_buf()),
            cumulative_bytes: self.session.as_ref().map_or(0, |s| s.cur_size),
            rotations_to_go: self.switches_to_go,
            saturated_since: self.saturation_start,
            max_disk_size: self.max_size,
            saturation_backoff_ns: self.backoff_ns,
        }
    }
}

fn duration_ns(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Builds `sd_dump_<name>_<MM-DD_HH_MM_SS_nnnnnnnnn>.scap` from a UTC
/// nanosecond timestamp.
pub(crate) fn file_name(name: &str, ts: u64) -> String {
    let secs = i64::try_from(ts / 1_000_000_000).unwrap_or(i64::MAX);
    let nanos = (ts % 1_000_000_000) as u32;
    let stamp = DateTime::<Utc>::from_timestamp(secs, nanos)
        .map_or_else(|| "00-00_00_00_00".to_string(), |t| t.format("%m-%d_%H_%M_%S").to_string());
    let name = name.replace(['/', '\\'], "_");
    format!("sd_dump_{name}_{stamp}_{nanos:09}.scap")
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdump_storage::ShmNamespace;
    use memdump_codec::EventRecord;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    const SEC: u64 = 1_000_000_000;

    fn governor(dir: &Path, max: u64) -> ContinuousDump {
        let config = MemdumpConfig::new()
            .dump_dir(dir)
            .max_disk_size(max)
            .saturation_backoff(Duration::from_secs(5));
        ContinuousDump::new(&config)
    }

    #[test]
    fn file_name_format() {
        assert_eq!(
            file_name("alert", 1_700_000_000 * SEC + 123_456_789),
            "sd_dump_alert_11-14_22_13_20_123456789.scap"
        );
        assert_eq!(file_name("a/b", 0), "sd_dump_a_b_01-01_00_00_00_000000000.scap");
    }

    #[test]
    fn start_opens_then_rearms() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 10_000);

        let StartOutcome::Started(path) = dump.start("s", SEC).unwrap() else {
            panic!("expected a new session");
        };
        assert!(path.exists());
        dump.on_rotation(100, 2 * SEC);
        assert_eq!(dump.status().rotations_to_go, 1);

        assert_eq!(dump.start("s", 3 * SEC).unwrap(), StartOutcome::Rearmed);
        assert_eq!(dump.status().rotations_to_go, 2);
        assert_eq!(dump.status().cumulative_bytes, 100);
    }

    #[test]
    fn budget_close() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 10_000);
        dump.start("s", 0).unwrap();

        assert!(dump.on_rotation(100, 1).is_none());
        let closed = dump.on_rotation(100, 2).unwrap();
        assert_eq!(closed.reason, CloseReason::Budget);
        assert_eq!(closed.accounted_bytes, 200);
        assert!(!dump.is_open());
        assert_eq!(dump.status().saturated_since, None);
    }

    #[test]
    fn quota_close_starts_backoff() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 2000);
        dump.start("s", 0).unwrap();

        assert!(dump.on_rotation(1000, SEC).is_none());
        let closed = dump.on_rotation(1000, 2 * SEC).unwrap();
        assert_eq!(closed.reason, CloseReason::Quota);

        assert_eq!(
            dump.start("s", 3 * SEC).unwrap(),
            StartOutcome::Saturated {
                retry_after_ns: 4 * SEC
            }
        );
        assert!(matches!(
            dump.start("s", 8 * SEC).unwrap(),
            StartOutcome::Started(_)
        ));
    }

    #[test]
    fn rotation_without_session_is_ignored() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 1);
        assert!(dump.on_rotation(1000, 0).is_none());
        assert!(dump.stop().is_none());
    }

    #[test]
    fn persist_writes_segment_records() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 10_000);
        let StartOutcome::Started(path) = dump.start("p", 0).unwrap() else {
            panic!("expected a new session");
        };

        let ns = ShmNamespace::new();
        let writer = ns.create("/persist", 4096).unwrap();
        for i in 0..3u64 {
            writer.append(&EventRecord::event(i, 1, vec![i as u8]).encode());
        }
        writer.flush();
        let written = dump.persist(&ns.open_read("/persist").unwrap()).unwrap();
        assert!(written > 0);

        let closed = dump.stop().unwrap();
        assert_eq!(closed.reason, CloseReason::Stopped);
        assert_eq!(closed.records, 3);

        let reader = crate::dump::DumpReader::open(&path).unwrap();
        assert_eq!(reader.header().name, "p");
        assert_eq!(reader.verify().unwrap().events, 3);
    }

    #[test]
    fn configure_changes_limits() {
        let dir = tempdir().unwrap();
        let mut dump = governor(dir.path(), 1);
        dump.configure(5000, 7);
        let status = dump.status();
        assert_eq!(status.max_disk_size, 5000);
        assert_eq!(status.saturation_backoff_ns, 7);
    }
}
