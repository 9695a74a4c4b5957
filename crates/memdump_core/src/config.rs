//! Memory dumper configuration.

use crate::error::{CoreError, CoreResult};
use memdump_codec::{EventRecord, FRAME_LEN_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum number of segments that can coexist.
pub const MAX_SEGMENTS: usize = 3;

/// Number of segments kept when no reader forces a temporary one.
pub const NOMINAL_SEGMENTS: usize = 2;

/// Configuration for a [`crate::MemoryDumper`].
#[derive(Debug, Clone)]
pub struct MemdumpConfig {
    /// Total memory budget for capture segments.
    ///
    /// Each segment gets a third of it, because a third segment may be
    /// created while a job is reading.
    pub buffer_size: u64,

    /// Cumulative bytes a continuous dump session may account before it is
    /// closed and saturation backoff starts.
    pub max_disk_size: u64,

    /// How long a new continuous session is refused after a quota close.
    pub saturation_backoff: Duration,

    /// Rotations a continuous session lasts before it closes on its own.
    pub continuous_rotations: u32,

    /// Directory continuous dump files are written to.
    pub dump_dir: PathBuf,

    /// Prefix of segment names; a monotonically increasing number follows.
    pub segment_name_prefix: String,
}

impl Default for MemdumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: 300 * 1024 * 1024,         // 300 MB
            max_disk_size: 100 * 1024 * 1024,       // 100 MB
            saturation_backoff: Duration::from_secs(30),
            continuous_rotations: 2,
            dump_dir: std::env::temp_dir(),
            segment_name_prefix: "/memdump-".to_string(),
        }
    }
}

impl MemdumpConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total segment memory budget.
    #[must_use]
    pub const fn buffer_size(mut self, size: u64) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the continuous dump disk quota.
    #[must_use]
    pub const fn max_disk_size(mut self, size: u64) -> Self {
        self.max_disk_size = size;
        self
    }

    /// Sets the saturation backoff interval.
    #[must_use]
    pub const fn saturation_backoff(mut self, backoff: Duration) -> Self {
        self.saturation_backoff = backoff;
        self
    }

    /// Sets the rotation budget of a continuous session.
    #[must_use]
    pub const fn continuous_rotations(mut self, rotations: u32) -> Self {
        self.continuous_rotations = rotations;
        self
    }

    /// Sets the continuous dump directory.
    #[must_use]
    pub fn dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = dir.into();
        self
    }

    /// Sets the segment name prefix.
    #[must_use]
    pub fn segment_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_name_prefix = prefix.into();
        self
    }

    /// Returns the capacity of a single segment.
    #[must_use]
    pub const fn segment_capacity(&self) -> u64 {
        self.buffer_size / MAX_SEGMENTS as u64
    }

    /// Checks that a segment can hold at least one record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> CoreResult<()> {
        let smallest = (FRAME_LEN_SIZE + EventRecord::MIN_ENCODED_SIZE) as u64;
        if self.segment_capacity() < smallest {
            return Err(CoreError::invalid_config(format!(
                "buffer_size {} leaves segments of {} bytes, smaller than one record ({smallest})",
                self.buffer_size,
                self.segment_capacity()
            )));
        }
        if usize::try_from(self.segment_capacity()).is_err() {
            return Err(CoreError::invalid_config(
                "segment capacity does not fit in memory",
            ));
        }
        if self.segment_name_prefix.is_empty() {
            return Err(CoreError::invalid_config("segment name prefix is empty"));
        }
        Ok(())
    }
}
