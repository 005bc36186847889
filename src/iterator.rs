//! Ordered iteration over the live keys.

use crate::db::Bitsack;
use crate::error::Result;
use crate::index::IndexIterator;
use crate::options::IteratorOptions;

/// A cursor over the store's live keys in lexicographic order (or its
/// reverse), optionally restricted to a key prefix.
///
/// The key set is a snapshot taken at construction; concurrent writes are
/// not observed. Values are read from disk on demand via [`Iter::value`].
pub struct Iter<'a> {
    db: &'a Bitsack,
    index_iter: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl Bitsack {
    /// Creates an iterator positioned at the first matching key.
    pub fn iterator(&self, options: IteratorOptions) -> Result<Iter<'_>> {
        let index_iter = self.index.iterator(options.reverse)?;
        let mut iter = Iter { db: self, index_iter, options };
        iter.skip_to_prefix();
        Ok(iter)
    }
}

impl Iter<'_> {
    /// Repositions at the first matching key.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_prefix();
    }

    /// Positions at the first matching key >= `key` (<= when reversed).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_prefix();
    }

    /// Advances to the next matching key.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_prefix();
    }

    /// Whether the cursor points at an entry.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// Key at the cursor. Panics when invalid.
    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Value at the cursor, fetched through the engine's read path.
    pub fn value(&self) -> Result<Vec<u8>> {
        self.db.read_location(&self.index_iter.value())
    }

    fn skip_to_prefix(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() && !self.index_iter.key().starts_with(&self.options.prefix) {
            self.index_iter.next();
        }
    }
}
