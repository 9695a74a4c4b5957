//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A region with this name is already linked in the namespace.
    #[error("shared region already exists: {name}")]
    AlreadyExists {
        /// The colliding region name.
        name: String,
    },

    /// No region with this name is linked in the namespace.
    #[error("shared region not found: {name}")]
    NotFound {
        /// The requested region name.
        name: String,
    },

    /// The region could not be allocated.
    #[error("cannot allocate {requested} bytes for shared region {name}")]
    ResourceExhausted {
        /// The region name.
        name: String,
        /// The requested capacity in bytes.
        requested: u64,
    },

    /// A region must hold at least one frame header.
    #[error("invalid region capacity: {capacity}")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },

    /// The ring contents are inconsistent.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The region has been closed by its writer.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns whether this error means the backing store could not be created.
    #[must_use]
    pub fn is_allocation_failure(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::ResourceExhausted { .. } | Self::InvalidCapacity { .. }
        )
    }
}
