//! Atomic write batches.
//!
//! A batch buffers puts and deletes on the caller's side, then commits them
//! under a fresh transaction id. Every committed record carries the id in
//! its stored key, and a trailing TxnFinished record is the commit point:
//! recovery replays a batch only after seeing that marker, so a crash
//! mid-commit leaves the whole batch invisible.

use std::sync::atomic::Ordering;

use indexmap::IndexMap;
use integer_encoding::VarInt;
use parking_lot::Mutex;

use crate::db::Bitsack;
use crate::error::{Error, Result};
use crate::options::{IndexType, WriteBatchOptions};
use crate::record::{Record, RecordKind};

/// Sequence number marking non-transactional (auto-committed) records.
pub(crate) const NON_TXN_SEQ_NO: u64 = 0;

/// Prepends the varint sequence number to a user key, forming the key as
/// stored on disk.
pub(crate) fn wrap_record_key(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut seq = [0u8; 10];
    let n = (seq_no as i64).encode_var(&mut seq);
    let mut stored = Vec::with_capacity(n + key.len());
    stored.extend_from_slice(&seq[..n]);
    stored.extend_from_slice(key);
    stored
}

/// Splits a stored key back into the user key and its sequence number.
pub(crate) fn parse_record_key(stored: &[u8]) -> Result<(Vec<u8>, u64)> {
    let (seq_no, n) = i64::decode_var(stored).ok_or(Error::DataDirectoryCorrupted)?;
    Ok((stored[n..].to_vec(), seq_no as u64))
}

/// A buffered group of writes that commits atomically.
///
/// Operations stage in insertion order, with later operations replacing
/// earlier ones for the same key. Nothing is visible, on disk or in the
/// index, until [`WriteBatch::commit`] returns; a crash before the commit
/// marker reaches disk discards the whole batch on restart.
pub struct WriteBatch<'a> {
    db: &'a Bitsack,
    pending: Mutex<IndexMap<Vec<u8>, Record>>,
    options: WriteBatchOptions,
}

impl Bitsack {
    /// Creates an empty write batch.
    ///
    /// With the disk-backed index the transaction id counter can only be
    /// recovered from the `seq-no` file; if a restart found none, new
    /// batches are refused.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if options.max_batch_num == 0 {
            return Err(Error::InvalidOptions("max_batch_num must be positive"));
        }
        if self.options.index_type == IndexType::BPlusTree
            && !self.seq_file_exists
            && !self.is_initial
        {
            return Err(Error::BatchNotAvailable);
        }
        Ok(WriteBatch { db: self, pending: Mutex::new(IndexMap::new()), options })
    }
}

impl WriteBatch<'_> {
    /// Stages a put.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let record =
            Record { key: key.to_vec(), value: value.to_vec(), kind: RecordKind::Normal };
        self.pending.lock().insert(key.to_vec(), record);
        Ok(())
    }

    /// Stages a delete. Deleting a key unknown to both the store and the
    /// batch just drops any staged write for it.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let mut pending = self.pending.lock();
        if self.db.index.get(key)?.is_none() {
            pending.shift_remove(key);
            return Ok(());
        }
        let record = Record { key: key.to_vec(), value: Vec::new(), kind: RecordKind::Tombstone };
        pending.insert(key.to_vec(), record);
        Ok(())
    }

    /// Commits every staged operation under one transaction id. An empty
    /// batch is a no-op. The batch can be reused after a commit.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num as usize {
            return Err(Error::ExceedMaxBatchNum);
        }

        let _commit_guard = self.db.batch_lock.lock();
        let seq_no = self.db.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut locations = Vec::with_capacity(pending.len());
        for record in pending.values() {
            let staged = Record {
                key: wrap_record_key(&record.key, seq_no),
                value: record.value.clone(),
                kind: record.kind,
            };
            locations.push(self.db.append_record(&staged)?);
        }

        // The commit point. Recovery discards the batch without this record.
        let finish = Record {
            key: wrap_record_key(&[], seq_no),
            value: Vec::new(),
            kind: RecordKind::TxnFinished,
        };
        self.db.append_record(&finish)?;

        if self.options.sync_writes {
            self.db.sync()?;
        }

        // Only now does the batch become visible to readers.
        for (record, loc) in pending.values().zip(locations) {
            match record.kind {
                RecordKind::Normal => {
                    if let Some(old) = self.db.index.put(record.key.clone(), loc)? {
                        self.db.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
                    }
                }
                RecordKind::Tombstone => {
                    let mut reclaimed = loc.size as u64;
                    if let Some(old) = self.db.index.delete(&record.key)? {
                        reclaimed += old.size as u64;
                    }
                    self.db.reclaim_size.fetch_add(reclaimed, Ordering::SeqCst);
                }
                RecordKind::TxnFinished => {}
            }
        }
        pending.clear();
        Ok(())
    }
}
