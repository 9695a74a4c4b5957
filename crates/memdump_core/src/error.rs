//! Error types for the memory dumper core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in memory dumper operations.
///
/// Segment-level failures never reach the ingestion path as errors; they
/// disable capture instead. Job-level failures are recorded on the job.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] memdump_storage::StorageError),

    /// Record or header codec error.
    #[error("codec error: {0}")]
    Codec(#[from] memdump_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment's backing store could not be created.
    #[error("cannot allocate segment {segment}: {source}")]
    Allocation {
        /// Segment name.
        segment: String,
        /// Underlying storage failure.
        #[source]
        source: memdump_storage::StorageError,
    },

    /// A filter expression failed to compile.
    #[error("error compiling capture job filter ({expression}): {message}")]
    Compile {
        /// The rejected expression.
        expression: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// Reading a segment failed.
    #[error("error reading events from {segment}: {message}")]
    Read {
        /// Segment name.
        segment: String,
        /// Description of the failure.
        message: String,
    },

    /// Writing an output artifact failed.
    #[error("could not write dump file {}: {message}", path.display())]
    Write {
        /// Output path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Continuous dump quota reached.
    #[error("dump quota exceeded: {used} of {limit} bytes")]
    QuotaExceeded {
        /// Bytes accounted so far.
        used: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Capture has been disabled after an allocation failure.
    #[error("capture is disabled")]
    CaptureDisabled,

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an allocation error.
    pub fn allocation(segment: impl Into<String>, source: memdump_storage::StorageError) -> Self {
        Self::Allocation {
            segment: segment.into(),
            source,
        }
    }

    /// Creates a filter compile error.
    pub fn compile(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Creates a segment read error.
    pub fn read(segment: impl Into<String>, message: impl ToString) -> Self {
        Self::Read {
            segment: segment.into(),
            message: message.to_string(),
        }
    }

    /// Creates an output write error.
    pub fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
