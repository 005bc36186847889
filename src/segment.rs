//! Append-only segment files.
//!
//! A segment owns one on-disk file of concatenated records. Data files are
//! named by their zero-padded id; the hint, merge-marker and sequence
//! number files reuse the same record framing under fixed names.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fio::{new_io_backend, IoBackend, IoType};
use crate::record::{self, Record, RecordLocation, MAX_HEADER_SIZE};

pub(crate) const DATA_FILE_SUFFIX: &str = ".data";
pub(crate) const HINT_FILE_NAME: &str = "hint-index";
pub(crate) const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
pub(crate) const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Path of the data file with the given id, e.g. `000000042.data`.
pub(crate) fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{file_id:09}{DATA_FILE_SUFFIX}"))
}

/// One append-only file plus its local write offset. At most one segment
/// per directory is open for append; all lower-id segments are immutable.
pub(crate) struct SegmentFile {
    file_id: u32,
    path: PathBuf,
    write_off: u64,
    io: Box<dyn IoBackend>,
}

impl SegmentFile {
    /// Opens the data file with the given id, creating it if absent.
    pub fn open(dir: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        Self::open_path(data_file_path(dir, file_id), file_id, io_type)
    }

    /// Opens the hint index file written by merge.
    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_path(dir.join(HINT_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens the marker file recording a completed merge.
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_path(dir.join(MERGE_FINISHED_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens the file persisting the transaction id counter across restarts.
    pub fn open_seq_no_file(dir: &Path) -> Result<Self> {
        Self::open_path(dir.join(SEQ_NO_FILE_NAME), 0, IoType::Standard)
    }

    fn open_path(path: PathBuf, file_id: u32, io_type: IoType) -> Result<Self> {
        let io = new_io_backend(&path, io_type)?;
        Ok(Self { file_id, path, write_off: 0, io })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    pub fn set_write_off(&mut self, off: u64) {
        self.write_off = off;
    }

    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Reads the record starting at `offset`, returning it with its encoded
    /// size, or `None` at the end of the segment. Truncated tails (torn
    /// writes) and all-zero holes also read as `None`; a checksum mismatch
    /// on an intact record is [`Error::InvalidCrc`].
    pub fn read_record(&self, offset: u64) -> Result<Option<(Record, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // The header is variable-length; read up to its maximum, clamped to
        // what the file still holds.
        let header_bound = MAX_HEADER_SIZE.min((file_size - offset) as usize);
        let mut header_buf = vec![0u8; header_bound];
        self.io.read_exact_at(&mut header_buf, offset)?;

        let Some((header, header_size)) = record::decode_header(&header_buf) else {
            return Ok(None);
        };
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Ok(None);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let mut payload = vec![0u8; key_size + value_size];
        if !payload.is_empty() {
            match self.io.read_exact_at(&mut payload, offset + header_size as u64) {
                Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                other => other?,
            }
        }
        let value = payload.split_off(key_size);
        let key = payload;

        if record::record_crc(&header_buf[4..header_size], &key, &value) != header.crc {
            return Err(Error::InvalidCrc);
        }
        let kind = header.kind.try_into()?;
        let size = (header_size + key_size + value_size) as u64;
        Ok(Some((Record { key, value, kind }, size)))
    }

    /// Appends encoded bytes and advances the write offset.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.write(buf)?;
        self.write_off += n as u64;
        Ok(())
    }

    /// Appends a hint entry mapping a user key to an encoded location.
    pub fn write_hint_record(&mut self, key: &[u8], loc: &RecordLocation) -> Result<()> {
        let record = Record {
            key: key.to_vec(),
            value: loc.encode(),
            kind: record::RecordKind::Normal,
        };
        self.append(&record.encode())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Replaces the I/O backend, reopening the same file. Used after an
    /// mmap-assisted startup to restore standard file I/O.
    pub fn set_io(&mut self, io_type: IoType) -> Result<()> {
        self.io = new_io_backend(&self.path, io_type)?;
        Ok(())
    }
}
