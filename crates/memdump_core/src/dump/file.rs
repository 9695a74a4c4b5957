//! Dump files: the output artifacts of jobs and continuous sessions.
//!
//! A dump file is a [`DumpHeader`] followed by length-prefixed
//! [`EventRecord`] bodies in write order.

use crate::error::{CoreError, CoreResult};
use memdump_codec::{DumpHeader, EventRecord, FRAME_LEN_SIZE};
use memdump_storage::FileSink;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Appends records to a dump file.
#[derive(Debug)]
pub struct DumpWriter {
    sink: FileSink,
    records: u64,
}

impl DumpWriter {
    /// Creates the file (and missing parent directories) and writes the
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] if the file cannot be created or the
    /// header cannot be written.
    pub fn create(path: &Path, header: &DumpHeader) -> CoreResult<Self> {
        let mut sink = FileSink::create_with_dirs(path).map_err(|e| CoreError::write(path, e))?;
        let encoded = header.encode()?;
        sink.append(&encoded).map_err(|e| CoreError::write(path, e))?;
        Ok(Self { sink, records: 0 })
    }

    /// Appends one record. Returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] on I/O failure.
    pub fn write_record(&mut self, record: &EventRecord) -> CoreResult<u64> {
        self.write_body(&record.encode())
    }

    /// Appends an already encoded record body. Returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] on I/O failure.
    pub fn write_body(&mut self, body: &[u8]) -> CoreResult<u64> {
        let len = u32::try_from(body.len())
            .map_err(|_| CoreError::write(self.sink.path(), "record exceeds 4 GiB"))?;
        let path = self.sink.path().to_path_buf();
        self.sink
            .append(&len.to_le_bytes())
            .and_then(|_| self.sink.append(body))
            .map_err(|e| CoreError::write(path, e))?;
        self.records += 1;
        Ok((FRAME_LEN_SIZE + body.len()) as u64)
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    /// Returns the number of records written.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Returns the file size so far, header included.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.sink.size()
    }

    /// Flushes buffered bytes to the OS.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] on I/O failure.
    pub fn flush(&mut self) -> CoreResult<()> {
        let path = self.sink.path().to_path_buf();
        self.sink.flush().map_err(|e| CoreError::write(path, e))
    }

    /// Syncs the file and consumes the writer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Write`] on I/O failure.
    pub fn finish(mut self) -> CoreResult<u64> {
        let path = self.sink.path().to_path_buf();
        self.sink.sync().map_err(|e| CoreError::write(path, e))?;
        Ok(self.records)
    }
}

/// Reads a dump file back.
///
/// The whole file is loaded; every record's checksum is verified as it is
/// iterated.
#[derive(Debug)]
pub struct DumpReader {
    path: PathBuf,
    header: DumpHeader,
    data: Vec<u8>,
    body_start: usize,
}

impl DumpReader {
    /// Opens `path` and decodes its header.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a codec error if
    /// the header is invalid.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let data = std::fs::read(path)?;
        let (header, body_start) = DumpHeader::decode(&data)?;
        Ok(Self {
            path: path.to_path_buf(),
            header,
            data,
            body_start,
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the decoded header.
    #[must_use]
    pub fn header(&self) -> &DumpHeader {
        &self.header
    }

    /// Iterates the records in write order.
    ///
    /// Iteration stops after the first error.
    #[must_use]
    pub fn records(&self) -> DumpRecords<'_> {
        DumpRecords {
            data: &self.data[self.body_start..],
            failed: false,
        }
    }

    /// Reads every record and summarizes the file.
    ///
    /// # Errors
    ///
    /// Returns the first codec error (truncation or checksum mismatch).
    pub fn verify(&self) -> CoreResult<DumpSummary> {
        let mut summary = DumpSummary {
            header: self.header.clone(),
            file_size: self.data.len() as u64,
            ..DumpSummary::default()
        };
        for record in self.records() {
            let record = record?;
            if record.is_notification() {
                summary.notifications += 1;
            } else {
                summary.events += 1;
            }
            summary.first_ts = Some(summary.first_ts.map_or(record.ts, |t| t.min(record.ts)));
            summary.last_ts = Some(summary.last_ts.map_or(record.ts, |t| t.max(record.ts)));
        }
        Ok(summary)
    }
}

/// Iterator over the records of a [`DumpReader`].
#[derive(Debug)]
pub struct DumpRecords<'a> {
    data: &'a [u8],
    failed: bool,
}

impl Iterator for DumpRecords<'_> {
    type Item = CoreResult<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        match EventRecord::decode_framed(self.data) {
            Ok((record, used)) => {
                self.data = &self.data[used..];
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Summary of a verified dump file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpSummary {
    /// The file header.
    pub header: DumpHeader,
    /// File size in bytes.
    pub file_size: u64,
    /// Event records.
    pub events: u64,
    /// Notification records.
    pub notifications: u64,
    /// Smallest record timestamp.
    pub first_ts: Option<u64>,
    /// Largest record timestamp.
    pub last_ts: Option<u64>,
}

impl Default for DumpSummary {
    fn default() -> Self {
        Self {
            header: DumpHeader {
                name: String::new(),
                start_ns: 0,
                end_ns: 0,
                filter: String::new(),
            },
            file_size: 0,
            events: 0,
            notifications: 0,
            first_ts: None,
            last_ts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdump_codec::Notification;
    use tempfile::tempdir;

    fn header() -> DumpHeader {
        DumpHeader {
            name: "job-1".to_string(),
            start_ns: 100,
            end_ns: 0,
            filter: String::new(),
        }
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.scap");

        let mut writer = DumpWriter::create(&path, &header()).unwrap();
        writer.write_record(&EventRecord::event(100, 1, b"a".to_vec())).unwrap();
        writer.write_record(&EventRecord::event(200, 2, b"b".to_vec())).unwrap();
        let note = Notification::new("n", "alert").into_record(150, 0).unwrap();
        writer.write_record(&note).unwrap();
        let written = writer.size();
        assert_eq!(writer.finish().unwrap(), 3);

        let reader = DumpReader::open(&path).unwrap();
        assert_eq!(reader.header(), &header());
        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].payload, b"b");

        let summary = reader.verify().unwrap();
        assert_eq!(summary.file_size, written);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.notifications, 1);
        assert_eq!(summary.first_ts, Some(100));
        assert_eq!(summary.last_ts, Some(200));
    }

    #[test]
    fn header_only_file_is_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.scap");
        DumpWriter::create(&path, &header()).unwrap().finish().unwrap();

        let summary = DumpReader::open(&path).unwrap().verify().unwrap();
        assert_eq!(summary.events, 0);
        assert_eq!(summary.first_ts, None);
    }

    #[test]
    fn corrupted_record_fails_verification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.scap");
        let mut writer = DumpWriter::create(&path, &header()).unwrap();
        writer.write_record(&EventRecord::event(1, 1, b"payload".to_vec())).unwrap();
        writer.finish().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let reader = DumpReader::open(&path).unwrap();
        assert!(reader.verify().is_err());
        assert_eq!(reader.records().count(), 1);
    }

    #[test]
    fn truncated_file_fails_verification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.scap");
        let mut writer = DumpWriter::create(&path, &header()).unwrap();
        writer.write_record(&EventRecord::event(1, 1, b"payload".to_vec())).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(DumpReader::open(&path).unwrap().verify().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(DumpReader::open(&dir.path().join("nope.scap")).is_err());
    }

    #[test]
    fn create_in_unwritable_location_is_a_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = DumpWriter::create(&blocker.join("out.scap"), &header()).unwrap_err();
        assert!(matches!(err, CoreError::Write { .. }));
    }
}
