//! # Memdump Codec
//!
//! Encodings shared by the capture buffers and their output artifacts.
//!
//! - [`EventRecord`] - a captured event: timestamp, thread id, kind and an
//!   opaque payload, protected by a CRC32
//! - [`Notification`] - the CBOR payload of agent-injected annotations
//! - [`DumpHeader`] - the CBOR header at the front of every dump file
//!
//! ## Usage
//!
//! ```
//! use memdump_codec::EventRecord;
//!
//! let record = EventRecord::event(1_000, 42, b"read fd=3".to_vec());
//! let bytes = record.encode();
//! assert_eq!(EventRecord::decode(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crc;
mod error;
mod header;
mod notification;
mod record;

pub use crc::compute_crc32;
pub use error::{CodecError, CodecResult};
pub use header::{DumpHeader, DUMP_MAGIC, DUMP_VERSION};
pub use notification::Notification;
pub use record::{EventRecord, RecordKind, FRAME_LEN_SIZE};
