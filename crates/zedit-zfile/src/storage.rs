//! The backing file of an archive.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, trace};

use crate::{Error, Result};

/// How the backing file is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Closed,
    OpenReadOnly,
    OpenReadWrite,
}

/// What the file looked like when we last let go of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
    crc32: u32,
}

impl Fingerprint {
    fn capture(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let metadata = std::fs::metadata(path)?;
        let (crc32, _) = zedit_common::crc::hash_reader(File::open(path)?)?;
        Ok(Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            crc32,
        }))
    }
}

/// Handle on the archive file that opens and closes lazily.
///
/// Reads open the file read-only on demand. Writes require the file to have
/// been reopened read-write first. When the file is first opened and every
/// time it is closed, its length, modification time and checksum are
/// recorded; reopening for writing refuses to proceed if any of them changed.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    state: FileState,
    handle: Option<File>,
    fingerprint: Option<Fingerprint>,
}

impl ArchiveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: FileState::Closed,
            handle: None,
            fingerprint: None,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn state(&self) -> FileState {
        self.state
    }

    /// Whether the file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Open the file for reading, if it is not already open.
    pub fn open_read_only(&mut self) -> Result<()> {
        if self.state != FileState::Closed {
            return Ok(());
        }

        trace!("opening {} read-only", self.path.display());
        self.handle = Some(File::open(&self.path)?);
        self.state = FileState::OpenReadOnly;
        if self.fingerprint.is_none() {
            self.fingerprint = Fingerprint::capture(&self.path)?;
        }
        Ok(())
    }

    /// Make sure the file is open for writing, creating it if needed.
    ///
    /// Returns `true` if the file was closed before the call.
    pub fn reopen_rw(&mut self) -> Result<bool> {
        let was_closed = match self.state {
            FileState::OpenReadWrite => return Ok(false),
            FileState::OpenReadOnly => {
                self.release();
                false
            }
            FileState::Closed => true,
        };

        if let Some(fingerprint) = self.fingerprint {
            if Fingerprint::capture(&self.path)? != Some(fingerprint) {
                return Err(Error::ExternallyModified(self.path.clone()));
            }
        }

        debug!("opening {} read-write", self.path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        self.handle = Some(file);
        self.state = FileState::OpenReadWrite;
        Ok(was_closed)
    }

    /// Release the file and fingerprint it.
    pub fn close(&mut self) -> Result<()> {
        if self.state == FileState::Closed {
            return Ok(());
        }

        if let Some(file) = self.handle.take() {
            if self.state == FileState::OpenReadWrite {
                file.sync_all()?;
            }
        }
        self.state = FileState::Closed;
        self.fingerprint = Fingerprint::capture(&self.path)?;
        Ok(())
    }

    fn release(&mut self) {
        self.handle = None;
        self.state = FileState::Closed;
    }

    fn handle(&mut self) -> Result<&mut File> {
        self.open_read_only()?;
        match self.handle.as_mut() {
            Some(file) => Ok(file),
            None => unreachable!("open file without a handle"),
        }
    }

    /// Current length of the file, zero if it does not exist.
    pub fn len(&mut self) -> Result<u64> {
        if self.state == FileState::Closed && !self.exists() {
            return Ok(0);
        }
        Ok(self.handle()?.metadata()?.len())
    }

    /// Fill `buf` from `offset`, opening the file read-only if needed.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Read up to `len` bytes from `offset`; fewer if the file ends first.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut out = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Write `data` at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the file is not open for writing.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        assert_eq!(
            self.state,
            FileState::OpenReadWrite,
            "{} is not open for writing",
            self.path.display()
        );
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Truncate or extend the file.
    ///
    /// # Panics
    ///
    /// Panics if the file is not open for writing.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        assert_eq!(
            self.state,
            FileState::OpenReadWrite,
            "{} is not open for writing",
            self.path.display()
        );
        self.handle()?.set_len(len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut file = ArchiveFile::new(&path);
        assert_eq!(file.state(), FileState::Closed);

        let mut buf = [0u8; 3];
        file.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(&buf, b"456");
        assert_eq!(file.state(), FileState::OpenReadOnly);
        assert_eq!(file.read_at(8, 10).unwrap(), b"89");
    }

    #[test]
    fn test_missing_file_has_zero_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ArchiveFile::new(dir.path().join("none.zip"));
        assert_eq!(file.len().unwrap(), 0);

        assert!(file.reopen_rw().unwrap());
        assert!(!file.reopen_rw().unwrap());
        file.write_at(0, b"abc").unwrap();
        assert_eq!(file.len().unwrap(), 3);
        file.close().unwrap();
    }

    #[test]
    fn test_external_modification_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");

        let mut file = ArchiveFile::new(&path);
        file.reopen_rw().unwrap();
        file.write_at(0, b"abc").unwrap();
        file.close().unwrap();

        std::fs::write(&path, b"abcd").unwrap();
        assert!(matches!(
            file.reopen_rw(),
            Err(Error::ExternallyModified(p)) if p == path
        ));
    }

    #[test]
    #[should_panic(expected = "not open for writing")]
    fn test_write_requires_rw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"x").unwrap();

        let mut file = ArchiveFile::new(&path);
        file.open_read_only().unwrap();
        let _ = file.write_at(0, b"y");
    }
}
