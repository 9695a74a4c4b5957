//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input: needed {needed} bytes, had {available}")]
    UnexpectedEof {
        /// Bytes required to continue.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Unknown record kind byte.
    #[error("unknown record kind: {0:#04x}")]
    UnknownKind(u8),

    /// The dump file does not start with the expected magic bytes.
    #[error("bad magic: {found:02x?}")]
    BadMagic {
        /// The bytes found instead.
        found: [u8; 4],
    },

    /// The dump file was written by a newer format.
    #[error("unsupported format version {found}, max supported {supported}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u16,
        /// Highest version this build reads.
        supported: u16,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    pub(crate) fn eof(needed: usize, available: usize) -> Self {
        Self::UnexpectedEof { needed, available }
    }
}
