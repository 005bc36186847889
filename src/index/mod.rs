//! Key-to-location indexes.
//!
//! The engine talks to its index through the [`Index`] trait so the map
//! structure is pluggable: an ordered tree (default), a path-compressed
//! radix tree, or a disk-backed B+ tree that survives restarts. Operations
//! are fallible because the disk-backed variant does real I/O.

mod art;
mod bptree;
mod btree;

use std::path::Path;

use crate::error::Result;
use crate::options::IndexType;
use crate::record::RecordLocation;

pub(crate) use bptree::BPTREE_INDEX_FILE_NAME;

/// An ordered map from user key to the location of the key's latest live
/// record. Implementations synchronize internally.
pub(crate) trait Index: Send + Sync {
    /// Inserts or replaces an entry, returning the previous location so the
    /// engine can account the replaced record as reclaimable.
    fn put(&self, key: Vec<u8>, loc: RecordLocation) -> Result<Option<RecordLocation>>;

    /// Looks up the location for a key.
    fn get(&self, key: &[u8]) -> Result<Option<RecordLocation>>;

    /// Removes an entry, returning the previous location if one existed.
    fn delete(&self, key: &[u8]) -> Result<Option<RecordLocation>>;

    /// Number of live keys.
    fn len(&self) -> Result<usize>;

    /// An iterator over a snapshot of the index taken now. Writes after
    /// construction are not observed.
    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator>>;

    /// Releases index resources. Called once when the engine closes.
    fn close(&self) -> Result<()>;
}

/// Cursor over index entries in lexicographic key order (or its reverse).
pub(crate) trait IndexIterator: Send {
    /// Repositions at the first entry.
    fn rewind(&mut self);

    /// Positions at the first key >= `key` (<= when reversed).
    fn seek(&mut self, key: &[u8]);

    /// Advances to the next entry.
    fn next(&mut self);

    /// Whether the cursor points at an entry.
    fn valid(&self) -> bool;

    /// Key at the cursor. Panics when invalid.
    fn key(&self) -> &[u8];

    /// Location at the cursor. Panics when invalid.
    fn value(&self) -> RecordLocation;
}

/// Builds the index selected by the options. The disk-backed variant opens
/// its file inside `dir`.
pub(crate) fn new_index(index_type: IndexType, dir: &Path) -> Result<Box<dyn Index>> {
    match index_type {
        IndexType::BTree => Ok(Box::new(btree::BTreeIndex::new())),
        IndexType::Art => Ok(Box::new(art::RadixTreeIndex::new())),
        IndexType::BPlusTree => Ok(Box::new(bptree::BPlusTreeIndex::open(dir)?)),
    }
}

/// Iterator over entries materialized at construction, shared by all index
/// variants. `entries` is sorted ascending for forward iteration and
/// descending for reverse.
struct SnapshotIterator {
    entries: Vec<(Vec<u8>, RecordLocation)>,
    current: usize,
    reverse: bool,
}

impl SnapshotIterator {
    fn new(entries: Vec<(Vec<u8>, RecordLocation)>, reverse: bool) -> Self {
        Self { entries, current: 0, reverse }
    }
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.current = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.current = if self.reverse {
            self.entries.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.entries.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.current += 1;
    }

    fn valid(&self) -> bool {
        self.current < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.current].0
    }

    fn value(&self) -> RecordLocation {
        self.entries[self.current].1
    }
}
