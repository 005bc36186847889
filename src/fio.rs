//! Positional file I/O backends.
//!
//! Segments read and write through a small trait so the engine can replay
//! data files via a read-only memory map on startup, then fall back to
//! standard file I/O before accepting writes.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Which backend a segment file opens with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoType {
    /// Buffered read/write file I/O.
    Standard,
    /// Read-only memory map; used to speed up startup replay.
    Mmap,
}

/// A byte-addressable file. Reads are positional; writes always append.
pub(crate) trait IoBackend: Send + Sync {
    /// Fills `buf` starting at `offset`, failing with `UnexpectedEof` when
    /// the file ends first.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Appends `buf` at the end of the file and returns the bytes written.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flushes written data to stable storage.
    fn sync(&self) -> Result<()>;

    /// Current file size in bytes.
    fn size(&self) -> Result<u64>;
}

/// Opens `path` with the requested backend, creating the file if absent.
pub(crate) fn new_io_backend(path: &Path, io_type: IoType) -> Result<Box<dyn IoBackend>> {
    match io_type {
        IoType::Standard => Ok(Box::new(StdIo::open(path)?)),
        IoType::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}

/// Standard file I/O. The file cursor is shared between positional reads
/// and appends, so it hides behind a mutex.
struct StdIo {
    file: Mutex<File>,
}

impl StdIo {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl IoBackend for StdIo {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// Read-only memory-mapped I/O. Zero-length files cannot be mapped, so an
/// empty segment carries no map and every read reports end-of-file.
struct MmapIo {
    map: Option<Mmap>,
}

impl MmapIo {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let map = match file.metadata()?.len() {
            0 => None,
            // Safety: segments below the active one are immutable, and the
            // engine swaps back to standard I/O before accepting writes.
            _ => Some(unsafe { Mmap::map(&file)? }),
        };
        Ok(Self { map })
    }
}

fn eof() -> Error {
    Error::Io(std::io::Error::new(ErrorKind::UnexpectedEof, "read past end of mapped file"))
}

impl IoBackend for MmapIo {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let map = self.map.as_ref().ok_or_else(eof)?;
        let offset = usize::try_from(offset).map_err(|_| eof())?;
        let end = offset.checked_add(buf.len()).ok_or_else(eof)?;
        if end > map.len() {
            return Err(eof());
        }
        buf.copy_from_slice(&map[offset..end]);
        Ok(())
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Io(std::io::Error::new(
            ErrorKind::Unsupported,
            "memory-mapped segments are read-only",
        )))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.map.as_ref().map_or(0, |m| m.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_io_roundtrip() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let path = dir.path().join("io");
        let io = StdIo::open(&path)?;

        assert_eq!(io.write(b"hello")?, 5);
        assert_eq!(io.write(b" world")?, 6);
        assert_eq!(io.size()?, 11);

        let mut buf = [0u8; 5];
        io.read_exact_at(&mut buf, 6)?;
        assert_eq!(&buf, b"world");

        // Reading past the end reports UnexpectedEof.
        let err = io.read_exact_at(&mut buf, 8).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
        io.sync()?;
        Ok(())
    }

    #[test]
    fn std_io_appends_across_reopen() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let path = dir.path().join("io");
        StdIo::open(&path)?.write(b"abc")?;

        let io = StdIo::open(&path)?;
        io.write(b"def")?;
        let mut buf = [0u8; 6];
        io.read_exact_at(&mut buf, 0)?;
        assert_eq!(&buf, b"abcdef");
        Ok(())
    }

    #[test]
    fn mmap_reads_what_std_wrote() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let path = dir.path().join("io");
        StdIo::open(&path)?.write(b"mapped bytes")?;

        let io = MmapIo::open(&path)?;
        assert_eq!(io.size()?, 12);
        let mut buf = [0u8; 5];
        io.read_exact_at(&mut buf, 7)?;
        assert_eq!(&buf, b"bytes");

        let err = io.read_exact_at(&mut buf, 10).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
        Ok(())
    }

    #[test]
    fn mmap_of_empty_file() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let io = MmapIo::open(&dir.path().join("empty"))?;
        assert_eq!(io.size()?, 0);

        let mut buf = [0u8; 1];
        assert!(io.read_exact_at(&mut buf, 0).is_err());
        assert!(io.write(b"x").is_err());
        Ok(())
    }
}
