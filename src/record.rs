//! On-disk record framing.
//!
//! Every write, including tombstones, transaction markers, hint entries and
//! the bookkeeping files, is one record:
//!
//! - CRC32 (IEEE) of everything after this field, as a little-endian u32.
//! - Kind tag as a single byte.
//! - Key length as a signed varint.
//! - Value length as a signed varint.
//! - Key as raw bytes.
//! - Value as raw bytes.
//!
//! Varints are zig-zag encoded, so a zero length costs a single byte and
//! the two length fields never exceed five bytes each.

use integer_encoding::VarInt;

use crate::error::{Error, Result};

/// Upper bound on the encoded header: crc (4) + kind (1) + two varints of
/// at most 5 bytes each.
pub(crate) const MAX_HEADER_SIZE: usize = 15;

/// What a record represents in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    /// A live key/value pair.
    Normal = 0,
    /// A deletion marker; the value is empty.
    Tombstone = 1,
    /// The commit marker terminating a batch with the same sequence number.
    TxnFinished = 2,
}

impl TryFrom<u8> for RecordKind {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0 => Ok(RecordKind::Normal),
            1 => Ok(RecordKind::Tombstone),
            2 => Ok(RecordKind::TxnFinished),
            _ => Err(Error::DataDirectoryCorrupted),
        }
    }
}

/// A single log record. The key here is the stored key, i.e. the user key
/// prefixed with its varint sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub kind: RecordKind,
}

/// Decoded header fields. The kind byte stays raw until the CRC has been
/// verified, so corrupt tags surface as checksum failures rather than
/// decode errors.
#[derive(Debug)]
pub(crate) struct RecordHeader {
    pub crc: u32,
    pub kind: u8,
    pub key_size: u32,
    pub value_size: u32,
}

impl Record {
    /// Encodes the record into its on-disk form. The returned buffer's
    /// length is the record's size for location accounting.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HEADER_SIZE + self.key.len() + self.value.len());
        buf.extend_from_slice(&[0; 4]); // crc placeholder
        buf.push(self.kind as u8);

        let mut lengths = [0u8; 5];
        let n = (self.key.len() as u32 as i64).encode_var(&mut lengths);
        buf.extend_from_slice(&lengths[..n]);
        let n = (self.value.len() as u32 as i64).encode_var(&mut lengths);
        buf.extend_from_slice(&lengths[..n]);

        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_le_bytes());
        buf
    }
}

/// Decodes a header from the front of `buf`, returning it along with its
/// encoded size. Returns `None` when the buffer cannot hold a header, which
/// callers treat as end-of-file.
pub(crate) fn decode_header(buf: &[u8]) -> Option<(RecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let kind = buf[4];

    let mut index = 5;
    let (key_size, n) = i64::decode_var(&buf[index..])?;
    index += n;
    let (value_size, n) = i64::decode_var(&buf[index..])?;
    index += n;

    Some((RecordHeader { crc, kind, key_size: key_size as u32, value_size: value_size as u32 }, index))
}

/// Computes the checksum of a decoded record: the header bytes past the CRC
/// field, then the key, then the value.
pub(crate) fn record_crc(header: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Where a record lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordLocation {
    /// Id of the segment file holding the record.
    pub file_id: u32,
    /// Byte offset at which the record begins.
    pub offset: u64,
    /// Encoded size of the record, used for reclaim accounting.
    pub size: u32,
}

impl RecordLocation {
    /// Compact varint form, stored as hint-file values and as the
    /// disk-backed index's values.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = [0u8; 20];
        let mut index = (self.file_id as i64).encode_var(&mut buf);
        index += (self.offset as i64).encode_var(&mut buf[index..]);
        index += (self.size as i64).encode_var(&mut buf[index..]);
        buf[..index].to_vec()
    }

    /// Inverse of [`RecordLocation::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut index = 0;
        let (file_id, n) = i64::decode_var(&buf[index..]).ok_or(Error::DataDirectoryCorrupted)?;
        index += n;
        let (offset, n) = i64::decode_var(&buf[index..]).ok_or(Error::DataDirectoryCorrupted)?;
        index += n;
        let (size, _) = i64::decode_var(&buf[index..]).ok_or(Error::DataDirectoryCorrupted)?;
        Ok(Self { file_id: file_id as u32, offset: offset as u64, size: size as u32 })
    }
}
