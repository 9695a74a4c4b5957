//! Event record encoding.
//!
//! The record body is:
//!
//! ```text
//! | kind (1) | timestamp_ns (8) | tid (8) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers everything before it.
//! When records are stored back to back (in a capture region or a dump
//! file) each body is preceded by a 4-byte little-endian length.

use crate::crc::compute_crc32;
use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut};

/// Size of the fixed fields before the payload.
const HEADER_SIZE: usize = 17;
/// CRC size.
const CRC_SIZE: usize = 4;
/// Size of the length prefix used when records are stored back to back.
pub const FRAME_LEN_SIZE: usize = 4;

/// Kind of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A traced kernel event; the payload is opaque.
    Event,
    /// An annotation injected by the agent; the payload is a
    /// [`crate::Notification`].
    Notification,
}

impl RecordKind {
    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Event => 0x01,
            Self::Notification => 0x02,
        }
    }

    /// Parses a wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownKind`] for unassigned values.
    pub const fn from_byte(b: u8) -> CodecResult<Self> {
        match b {
            0x01 => Ok(Self::Event),
            0x02 => Ok(Self::Notification),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

/// One captured event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Monotonic timestamp in nanoseconds.
    pub ts: u64,
    /// Thread or task that produced the event.
    pub tid: u64,
    /// Record kind.
    pub kind: RecordKind,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl EventRecord {
    /// Smallest possible encoded body.
    pub const MIN_ENCODED_SIZE: usize = HEADER_SIZE + CRC_SIZE;

    /// Creates a traced-event record.
    #[must_use]
    pub fn event(ts: u64, tid: u64, payload: Vec<u8>) -> Self {
        Self {
            ts,
            tid,
            kind: RecordKind::Event,
            payload,
        }
    }

    /// Returns whether this is a notification record.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.kind == RecordKind::Notification
    }

    /// Returns the encoded body size.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CRC_SIZE
    }

    /// Encodes the record body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the record preceded by its body length.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not fit a 32-bit length.
    pub fn encode_framed(&self) -> CodecResult<Vec<u8>> {
        let len = u32::try_from(self.encoded_size())
            .map_err(|_| CodecError::encoding_failed("record exceeds 4 GiB"))?;
        let mut buf = Vec::with_capacity(FRAME_LEN_SIZE + self.encoded_size());
        buf.put_u32_le(len);
        self.encode_into(&mut buf);
        Ok(buf)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        let body_start = buf.len();
        buf.put_u8(self.kind.as_byte());
        buf.put_u64_le(self.ts);
        buf.put_u64_le(self.tid);
        buf.put_slice(&self.payload);
        let crc = compute_crc32(&buf[body_start..]);
        buf.put_u32_le(crc);
    }

    /// Decodes a record body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is too short, the checksum does not
    /// match, or the kind byte is unknown.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        if data.len() < Self::MIN_ENCODED_SIZE {
            return Err(CodecError::eof(Self::MIN_ENCODED_SIZE, data.len()));
        }

        let (body, mut crc_bytes) = data.split_at(data.len() - CRC_SIZE);
        let expected = crc_bytes.get_u32_le();
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        let mut cursor = body;
        let kind = RecordKind::from_byte(cursor.get_u8())?;
        let ts = cursor.get_u64_le();
        let tid = cursor.get_u64_le();

        Ok(Self {
            ts,
            tid,
            kind,
            payload: cursor.to_vec(),
        })
    }

    /// Decodes one length-prefixed record from the front of `data`.
    ///
    /// Returns the record and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if `data` ends mid-record, or
    /// any error of [`EventRecord::decode`].
    pub fn decode_framed(data: &[u8]) -> CodecResult<(Self, usize)> {
        if data.len() < FRAME_LEN_SIZE {
            return Err(CodecError::eof(FRAME_LEN_SIZE, data.len()));
        }
        let mut len_bytes = &data[..FRAME_LEN_SIZE];
        let len = len_bytes.get_u32_le() as usize;
        let total = FRAME_LEN_SIZE + len;
        if data.len() < total {
            return Err(CodecError::eof(total, data.len()));
        }
        let record = Self::decode(&data[FRAME_LEN_SIZE..total])?;
        Ok((record, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let record = EventRecord::event(0x0102, 7, vec![0xAA, 0xBB]);
        let bytes = record.encode();

        assert_eq!(bytes.len(), record.encoded_size());
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..9], &0x0102u64.to_le_bytes());
        assert_eq!(&bytes[9..17], &7u64.to_le_bytes());
        assert_eq!(&bytes[17..19], &[0xAA, 0xBB]);
    }

    #[test]
    fn decode_detects_corruption() {
        let mut bytes = EventRecord::event(1, 2, vec![1, 2, 3]).encode();
        bytes[18] ^= 0xFF;
        assert!(matches!(
            EventRecord::decode(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(matches!(
            EventRecord::decode(&[0u8; 10]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn framed_records_decode_back_to_back() {
        let a = EventRecord::event(10, 1, b"open".to_vec());
        let b = EventRecord::event(20, 2, Vec::new());
        let mut data = a.encode_framed().unwrap();
        data.extend(b.encode_framed().unwrap());

        let (first, used) = EventRecord::decode_framed(&data).unwrap();
        assert_eq!(first, a);
        let (second, rest) = EventRecord::decode_framed(&data[used..]).unwrap();
        assert_eq!(second, b);
        assert_eq!(used + rest, data.len());
    }

    #[test]
    fn framed_truncation_is_eof() {
        let data = EventRecord::event(10, 1, b"open".to_vec())
            .encode_framed()
            .unwrap();
        assert!(matches!(
            EventRecord::decode_framed(&data[..data.len() - 1]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut record = EventRecord::event(1, 1, Vec::new()).encode();
        record[0] = 0x7F;
        let body_len = record.len() - CRC_SIZE;
        let crc = compute_crc32(&record[..body_len]);
        record[body_len..].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(
            EventRecord::decode(&record),
            Err(CodecError::UnknownKind(0x7F))
        );
    }
}
