//! Disk-backed B+ tree index.
//!
//! Persists `key -> encoded location` pairs in a single-bucket jammdb file
//! next to the data files. Because the mapping survives restarts, startup
//! skips the data-file replay entirely; the price is that the transaction
//! id counter must be recovered from the `seq-no` file instead.

use std::path::Path;

use jammdb::DB;

use super::{Index, IndexIterator, SnapshotIterator};
use crate::error::Result;
use crate::record::RecordLocation;

pub(crate) const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

const BUCKET_NAME: &str = "bitsack-index";

pub(crate) struct BPlusTreeIndex {
    db: DB,
}

impl BPlusTreeIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let db = DB::open(dir.join(BPTREE_INDEX_FILE_NAME))?;
        let tx = db.tx(true)?;
        tx.get_or_create_bucket(BUCKET_NAME)?;
        tx.commit()?;
        Ok(Self { db })
    }
}

impl Index for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, loc: RecordLocation) -> Result<Option<RecordLocation>> {
        let tx = self.db.tx(true)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let old = match bucket.get(&key) {
            Some(data) => Some(RecordLocation::decode(data.kv().value())?),
            None => None,
        };
        bucket.put(key, loc.encode())?;
        tx.commit()?;
        Ok(old)
    }

    fn get(&self, key: &[u8]) -> Result<Option<RecordLocation>> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        match bucket.get(key) {
            Some(data) => Ok(Some(RecordLocation::decode(data.kv().value())?)),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<Option<RecordLocation>> {
        let tx = self.db.tx(true)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let old = match bucket.get(key) {
            Some(data) => Some(RecordLocation::decode(data.kv().value())?),
            None => None,
        };
        if old.is_some() {
            bucket.delete(key)?;
        }
        tx.commit()?;
        Ok(old)
    }

    fn len(&self) -> Result<usize> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        Ok(bucket.cursor().count())
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator>> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET_NAME)?;
        let mut entries = Vec::new();
        for data in bucket.cursor() {
            let kv = data.kv();
            entries.push((kv.key().to_vec(), RecordLocation::decode(kv.value())?));
        }
        if reverse {
            entries.reverse();
        }
        Ok(Box::new(SnapshotIterator::new(entries, reverse)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
