//! # Memdump Storage
//!
//! Backing stores for the memory dumper.
//!
//! This crate provides the lowest-level storage for capture segments and
//! their output artifacts. Like every layer below the core, it stores
//! **opaque bytes** and knows nothing about event records.
//!
//! ## Design Principles
//!
//! - Regions are named, fixed-capacity rings of length-prefixed frames
//! - One writer per region, any number of independent readers
//! - Capabilities are split by type: [`WriterHandle`] appends, flushes and
//!   closes; [`ReaderHandle`] only reads
//! - Closing unlinks the name but attached readers keep working
//!
//! ## Components
//!
//! - [`ShmNamespace`] - shared-memory style create / open / unlink
//! - [`WriterHandle`] / [`ReaderHandle`] - the two capabilities on a region
//! - [`FileSink`] - append-only file for output artifacts
//!
//! ## Example
//!
//! ```rust
//! use memdump_storage::ShmNamespace;
//!
//! let ns = ShmNamespace::new();
//! let writer = ns.create("/capture-0", 1024).unwrap();
//! writer.append(b"hello world");
//! assert_eq!(writer.flush(), 15);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod namespace;
mod ring;

pub use error::{StorageError, StorageResult};
pub use file::FileSink;
pub use namespace::ShmNamespace;
pub use ring::{AppendOutcome, Frame, Frames, ReaderHandle, WriterHandle, FRAME_HEADER_SIZE};
