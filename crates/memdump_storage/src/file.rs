//! Append-only file sink for output artifacts.

use crate::error::StorageResult;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// An append-only file used as a durable output artifact.
///
/// The file is created fresh (truncating any previous content) and written
/// through a buffer.
///
/// # Durability
///
/// - `flush()` pushes buffered bytes to the OS
/// - `sync()` additionally calls `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use memdump_storage::FileSink;
/// use std::path::Path;
///
/// let mut sink = FileSink::create(Path::new("capture.scap")).unwrap();
/// sink.append(b"header").unwrap();
/// sink.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: BufWriter<File>,
    size: u64,
}

impl FileSink {
    /// Creates the file, truncating it if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            size: 0,
        })
    }

    /// Creates the file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn create_with_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::create(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends bytes, returning the offset they were written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    pub fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        self.file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    /// Returns the bytes appended so far.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flushes buffered bytes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    pub fn flush(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flushes and syncs data and metadata to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let sink = FileSink::create(&path).unwrap();
        assert_eq!(sink.size(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_returns_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut sink = FileSink::create(&path).unwrap();
        assert_eq!(sink.append(b"hello").unwrap(), 0);
        assert_eq!(sink.append(b" world").unwrap(), 5);
        sink.flush().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn file_create_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");
        std::fs::write(&path, b"stale content").unwrap();

        let mut sink = FileSink::create(&path).unwrap();
        sink.append(b"new").unwrap();
        sink.sync().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.bin");

        let sink = FileSink::create_with_dirs(&path).unwrap();
        assert_eq!(sink.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn file_create_in_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("test.bin");
        assert!(FileSink::create(&path).is_err());
    }
}
