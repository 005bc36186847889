//! Ordered-map index, the default.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{Index, IndexIterator, SnapshotIterator};
use crate::error::Result;
use crate::record::RecordLocation;

/// Keydir over `std::collections::BTreeMap`, rebuilt from the data files on
/// every startup.
pub(crate) struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordLocation>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self { tree: RwLock::new(BTreeMap::new()) }
    }
}

impl Index for BTreeIndex {
    fn put(&self, key: Vec<u8>, loc: RecordLocation) -> Result<Option<RecordLocation>> {
        Ok(self.tree.write().insert(key, loc))
    }

    fn get(&self, key: &[u8]) -> Result<Option<RecordLocation>> {
        Ok(self.tree.read().get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<Option<RecordLocation>> {
        Ok(self.tree.write().remove(key))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.tree.read().len())
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator>> {
        let tree = self.tree.read();
        let entries: Vec<_> = if reverse {
            tree.iter().rev().map(|(k, v)| (k.clone(), *v)).collect()
        } else {
            tree.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };
        Ok(Box::new(SnapshotIterator::new(entries, reverse)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(file_id: u32, offset: u64) -> RecordLocation {
        RecordLocation { file_id, offset, size: 10 }
    }

    #[test]
    fn put_returns_previous() -> Result<()> {
        let index = BTreeIndex::new();
        assert_eq!(index.put(b"a".to_vec(), loc(1, 0))?, None);
        assert_eq!(index.put(b"a".to_vec(), loc(1, 100))?, Some(loc(1, 0)));
        assert_eq!(index.get(b"a")?, Some(loc(1, 100)));
        assert_eq!(index.len()?, 1);
        Ok(())
    }

    #[test]
    fn delete_returns_previous() -> Result<()> {
        let index = BTreeIndex::new();
        index.put(b"a".to_vec(), loc(1, 0))?;
        assert_eq!(index.delete(b"a")?, Some(loc(1, 0)));
        assert_eq!(index.delete(b"a")?, None);
        assert_eq!(index.get(b"a")?, None);
        assert_eq!(index.len()?, 0);
        Ok(())
    }

    #[test]
    fn iterates_in_key_order() -> Result<()> {
        let index = BTreeIndex::new();
        for key in [b"ccc".to_vec(), b"aaa".to_vec(), b"bbb".to_vec()] {
            index.put(key, loc(0, 0))?;
        }

        let mut iter = index.iterator(false)?;
        let mut keys = vec![];
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(keys, vec![b"aaa".to_vec(), b"bbb".to_vec(), b"ccc".to_vec()]);

        let mut iter = index.iterator(true)?;
        assert_eq!(iter.key(), b"ccc");
        iter.next();
        assert_eq!(iter.key(), b"bbb");
        Ok(())
    }

    #[test]
    fn iterator_is_a_snapshot() -> Result<()> {
        let index = BTreeIndex::new();
        index.put(b"a".to_vec(), loc(0, 0))?;
        let iter = index.iterator(false)?;
        index.put(b"b".to_vec(), loc(0, 1))?;
        let mut count = 0;
        let mut iter = iter;
        while iter.valid() {
            count += 1;
            iter.next();
        }
        assert_eq!(count, 1);
        Ok(())
    }
}
