//! Dump file header.
//!
//! Every output artifact starts with:
//!
//! ```text
//! | magic "MDMP" (4) | version (2) | header_len (4) | header (CBOR, header_len) |
//! ```
//!
//! followed by length-prefixed [`crate::EventRecord`] bodies in write order.

use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a dump file.
pub const DUMP_MAGIC: [u8; 4] = *b"MDMP";

/// Current dump format version.
pub const DUMP_VERSION: u16 = 1;

const PREFIX_SIZE: usize = 10;

/// Describes the capture window and filter an artifact was produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpHeader {
    /// Name of the job or continuous session.
    pub name: String,
    /// Inclusive lower bound in nanoseconds; 0 means the start of history.
    pub start_ns: u64,
    /// Inclusive upper bound in nanoseconds; 0 means unbounded.
    pub end_ns: u64,
    /// Filter expression, empty when every record matched.
    pub filter: String,
}

impl DumpHeader {
    /// Encodes the header with its magic/version prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        let len = u32::try_from(cbor.len())
            .map_err(|_| CodecError::encoding_failed("dump header too large"))?;

        let mut buf = Vec::with_capacity(PREFIX_SIZE + cbor.len());
        buf.put_slice(&DUMP_MAGIC);
        buf.put_u16_le(DUMP_VERSION);
        buf.put_u32_le(len);
        buf.put_slice(&cbor);
        Ok(buf)
    }

    /// Decodes a header from the front of `data`.
    ///
    /// Returns the header and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns an error on bad magic, a newer version, truncation, or
    /// malformed CBOR.
    pub fn decode(data: &[u8]) -> CodecResult<(Self, usize)> {
        if data.len() < PREFIX_SIZE {
            return Err(CodecError::eof(PREFIX_SIZE, data.len()));
        }

        let mut cursor = data;
        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if magic != DUMP_MAGIC {
            return Err(CodecError::BadMagic { found: magic });
        }

        let version = cursor.get_u16_le();
        if version > DUMP_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: version,
                supported: DUMP_VERSION,
            });
        }

        let len = cursor.get_u32_le() as usize;
        let total = PREFIX_SIZE + len;
        if data.len() < total {
            return Err(CodecError::eof(total, data.len()));
        }

        let header = ciborium::from_reader(&data[PREFIX_SIZE..total])
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        Ok((header, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DumpHeader {
        DumpHeader {
            name: "alert-17".to_string(),
            start_ns: 1_000,
            end_ns: 0,
            filter: "proc.name=sshd".to_string(),
        }
    }

    #[test]
    fn header_starts_with_magic() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[..4], b"MDMP");
        assert_eq!(&bytes[4..6], &DUMP_VERSION.to_le_bytes());
    }

    #[test]
    fn header_decode_reports_consumed_length() {
        let mut bytes = sample().encode().unwrap();
        let header_len = bytes.len();
        bytes.extend_from_slice(b"records follow");

        let (header, used) = DumpHeader::decode(&bytes).unwrap();
        assert_eq!(header, sample());
        assert_eq!(used, header_len);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            DumpHeader::decode(&bytes),
            Err(CodecError::BadMagic { .. })
        ));
    }

    #[test]
    fn header_rejects_future_version() {
        let mut bytes = sample().encode().unwrap();
        bytes[4..6].copy_from_slice(&(DUMP_VERSION + 1).to_le_bytes());
        assert!(matches!(
            DumpHeader::decode(&bytes),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }
}
