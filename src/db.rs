//! The storage engine.
//!
//! A Bitcask-style store: every write appends a record to the active
//! segment file, and an in-memory index maps each live key to the location
//! of its latest record. Reads resolve the index entry, then fetch the
//! record with one positional read. Startup rebuilds the index by loading
//! the merge hint file and replaying the remaining segments in file order.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use fs4::fs_std::FileExt;
use parking_lot::{Mutex, RwLock};

use crate::batch::{parse_record_key, wrap_record_key, NON_TXN_SEQ_NO};
use crate::error::{Error, Result};
use crate::fio::IoType;
use crate::fsutil;
use crate::index::{self, Index};
use crate::merge;
use crate::options::{IndexType, Options};
use crate::record::{Record, RecordKind, RecordLocation};
use crate::segment::{SegmentFile, DATA_FILE_SUFFIX, HINT_FILE_NAME, SEQ_NO_FILE_NAME};

/// Advisory lock file guarding the data directory against a second process.
pub(crate) const LOCK_FILE_NAME: &str = "bitcask-go-filelock";

const INITIAL_FILE_ID: u32 = 0;

/// A Bitcask-style key-value store bound to one data directory.
///
/// The engine is safe for concurrent use: writes serialize through an
/// internal writer lock, reads share a reader lock, and the index
/// synchronizes itself.
pub struct Bitsack {
    pub(crate) options: Options,
    pub(crate) files: RwLock<FileSet>,
    pub(crate) index: Box<dyn Index>,
    /// Serializes batch commits so their records are contiguous per batch.
    pub(crate) batch_lock: Mutex<()>,
    /// Held for the duration of a merge; at most one runs at a time.
    pub(crate) merge_lock: Mutex<()>,
    /// Last transaction id handed out; zero marks non-transactional writes.
    pub(crate) seq_no: AtomicU64,
    /// Whether a `seq-no` file was found on open (disk-backed index only).
    pub(crate) seq_file_exists: bool,
    /// Whether this open initialized a fresh directory.
    pub(crate) is_initial: bool,
    lock_file: File,
    bytes_since_sync: AtomicU64,
    pub(crate) reclaim_size: AtomicU64,
}

/// The active segment plus the immutable ones, keyed by file id. Guarded
/// by the engine's reader/writer lock.
pub(crate) struct FileSet {
    pub active: SegmentFile,
    pub older: HashMap<u32, SegmentFile>,
}

/// Point-in-time engine statistics from [`Bitsack::stat`].
#[derive(Debug, Clone)]
pub struct Stat {
    /// Number of live keys.
    pub key_num: usize,
    /// Number of segment files, including the active one.
    pub data_file_num: usize,
    /// Bytes occupied by overwritten records and tombstones, reclaimable by
    /// [`Bitsack::merge`].
    pub reclaim_size: u64,
    /// Total size of the data directory on disk.
    pub disk_size: u64,
}

impl Bitsack {
    /// Opens the store described by `options`, creating the directory on
    /// first use. Fails with [`Error::DatabaseIsUsing`] when another
    /// process holds the directory.
    pub fn open(options: Options) -> Result<Self> {
        validate_options(&options)?;
        log::info!("opening database at {}", options.dir_path.display());

        let dir = options.dir_path.clone();
        let mut is_initial = false;
        if !dir.is_dir() {
            is_initial = true;
            fs::create_dir_all(&dir)?;
        }

        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE_NAME))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(Error::DatabaseIsUsing);
        }
        let occupied = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name() != LOCK_FILE_NAME);
        if !occupied {
            is_initial = true;
        }

        // Publish a completed merge before looking at the data files.
        let published_merge = merge::load_merge_files(&dir)?;

        let io_type = if options.mmap_at_startup { IoType::Mmap } else { IoType::Standard };
        let (mut segments, file_ids) = load_data_files(&dir, io_type)?;

        let active = match segments.pop() {
            Some(segment) => segment,
            None => SegmentFile::open(&dir, INITIAL_FILE_ID, IoType::Standard)?,
        };
        let mut older = HashMap::new();
        for segment in segments {
            older.insert(segment.file_id(), segment);
        }

        // Publishing a merge moves every surviving record, so a persisted
        // index's locations are stale. Drop it and rebuild from hint and
        // replay below.
        let rebuild_index = published_merge && options.index_type == IndexType::BPlusTree;
        if rebuild_index {
            let path = dir.join(index::BPTREE_INDEX_FILE_NAME);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        let index = index::new_index(options.index_type, &dir)?;
        let mut db = Self {
            options,
            files: RwLock::new(FileSet { active, older }),
            index,
            batch_lock: Mutex::new(()),
            merge_lock: Mutex::new(()),
            seq_no: AtomicU64::new(NON_TXN_SEQ_NO),
            seq_file_exists: false,
            is_initial,
            lock_file,
            bytes_since_sync: AtomicU64::new(0),
            reclaim_size: AtomicU64::new(0),
        };

        if db.options.index_type == IndexType::BPlusTree {
            if let Some(seq_no) = load_seq_no(&db.options.dir_path)? {
                db.seq_no.store(seq_no, Ordering::SeqCst);
                db.seq_file_exists = true;
            }
        }
        if db.options.index_type == IndexType::BPlusTree && !rebuild_index {
            // The index is already on disk and current; the active offset
            // is simply the file size.
            let mut files = db.files.write();
            let size = files.active.size()?;
            files.active.set_write_off(size);
        } else {
            db.load_index_from_hint_file()?;
            let max_seq = db.load_index_from_data_files(&file_ids)?;
            if max_seq > db.seq_no.load(Ordering::SeqCst) {
                db.seq_no.store(max_seq, Ordering::SeqCst);
            }
        }
        if db.options.mmap_at_startup {
            db.reset_io_type()?;
        }

        log::info!(
            "indexed {} live keys in {}",
            db.index.len()?,
            db.options.dir_path.display()
        );
        Ok(db)
    }

    /// Flushes and closes the store: persists the transaction id counter to
    /// the `seq-no` file, syncs the active segment, closes the index and
    /// releases the directory lock. Also runs on drop.
    pub fn close(&self) -> Result<()> {
        if !self.options.dir_path.is_dir() {
            return Ok(());
        }

        // Rewrite the seq-no file from scratch so it holds a single record.
        let seq_path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
        if seq_path.is_file() {
            fs::remove_file(&seq_path)?;
        }
        let mut seq_file = SegmentFile::open_seq_no_file(&self.options.dir_path)?;
        let record = Record {
            key: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
            value: Vec::new(),
            kind: RecordKind::Normal,
        };
        seq_file.append(&record.encode())?;
        seq_file.sync()?;

        self.index.close()?;
        self.files.read().active.sync()?;
        self.lock_file.unlock()?;
        Ok(())
    }

    /// Fsyncs the active segment.
    pub fn sync(&self) -> Result<()> {
        self.files.read().active.sync()
    }

    /// Returns live statistics about the store.
    pub fn stat(&self) -> Result<Stat> {
        let files = self.files.read();
        Ok(Stat {
            key_num: self.index.len()?,
            data_file_num: files.older.len() + 1,
            reclaim_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: fsutil::dir_size(&self.options.dir_path)?,
        })
    }

    /// Copies the data directory to `dir`, excluding the lock file. Writes
    /// are blocked for the duration of the copy.
    pub fn backup(&self, dir: impl AsRef<Path>) -> Result<()> {
        let _files = self.files.write();
        fsutil::copy_dir(&self.options.dir_path, dir.as_ref(), &[LOCK_FILE_NAME])
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let record = Record {
            key: wrap_record_key(key, NON_TXN_SEQ_NO),
            value: value.to_vec(),
            kind: RecordKind::Normal,
        };
        let loc = self.append_record(&record)?;
        if let Some(old) = self.index.put(key.to_vec(), loc)? {
            self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Removes `key`. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        if self.index.get(key)?.is_none() {
            return Ok(());
        }

        // The tombstone is immediately reclaimable, as is the record it
        // shadows.
        let record = Record {
            key: wrap_record_key(key, NON_TXN_SEQ_NO),
            value: Vec::new(),
            kind: RecordKind::Tombstone,
        };
        let loc = self.append_record(&record)?;
        self.reclaim_size.fetch_add(loc.size as u64, Ordering::SeqCst);

        match self.index.delete(key)? {
            Some(old) => {
                self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
                Ok(())
            }
            // Only a concurrent delete can get here.
            None => Err(Error::IndexUpdateFailed),
        }
    }

    /// Fetches the value stored under `key`, or [`Error::KeyNotFound`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        let loc = self.index.get(key)?.ok_or(Error::KeyNotFound)?;
        self.read_location(&loc)
    }

    /// All live keys in ascending order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut iter = self.index.iterator(false)?;
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        Ok(keys)
    }

    /// Calls `f` for every key-value pair in ascending key order, stopping
    /// early when `f` returns false.
    pub fn fold(&self, mut f: impl FnMut(&[u8], Vec<u8>) -> bool) -> Result<()> {
        let mut iter = self.index.iterator(false)?;
        while iter.valid() {
            let value = self.read_location(&iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    /// Resolves a record location to its value under the reader lock.
    pub(crate) fn read_location(&self, loc: &RecordLocation) -> Result<Vec<u8>> {
        let files = self.files.read();
        let segment = if files.active.file_id() == loc.file_id {
            &files.active
        } else {
            files.older.get(&loc.file_id).ok_or(Error::DataFileNotFound)?
        };
        let (record, _) = segment.read_record(loc.offset)?.ok_or(Error::DataDirectoryCorrupted)?;
        if record.kind == RecordKind::Tombstone {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// Appends an encoded record to the active segment under the writer
    /// lock, rotating first when the segment would exceed its size threshold.
    pub(crate) fn append_record(&self, record: &Record) -> Result<RecordLocation> {
        let encoded = record.encode();
        let size = encoded.len() as u64;
        let mut files = self.files.write();

        if files.active.write_off() + size > self.options.data_file_size {
            files.active.sync()?;
            let next_id = files.active.file_id() + 1;
            let rotated = std::mem::replace(
                &mut files.active,
                SegmentFile::open(&self.options.dir_path, next_id, IoType::Standard)?,
            );
            files.older.insert(rotated.file_id(), rotated);
        }

        let offset = files.active.write_off();
        files.active.append(&encoded)?;

        let previous = self.bytes_since_sync.fetch_add(size, Ordering::SeqCst);
        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0 && previous + size >= self.options.bytes_per_sync);
        if need_sync {
            files.active.sync()?;
            self.bytes_since_sync.store(0, Ordering::SeqCst);
        }

        Ok(RecordLocation { file_id: files.active.file_id(), offset, size: size as u32 })
    }

    /// Seeds the index from the hint file left by the last merge, covering
    /// every segment below the non-merge boundary.
    fn load_index_from_hint_file(&self) -> Result<()> {
        let path = self.options.dir_path.join(HINT_FILE_NAME);
        if !path.is_file() {
            return Ok(());
        }
        let hint = SegmentFile::open_hint_file(&self.options.dir_path)?;
        let mut offset = 0;
        while let Some((record, size)) = hint.read_record(offset)? {
            let loc = RecordLocation::decode(&record.value)?;
            self.index.put(record.key, loc)?;
            offset += size;
        }
        Ok(())
    }

    /// Replays data files in ascending file id order, applying records with
    /// sequence number zero directly and buffering transactional records
    /// until their TxnFinished marker. Returns the highest sequence number
    /// seen, and leaves the active segment's write offset at its tail.
    fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<u64> {
        let mut max_seq = NON_TXN_SEQ_NO;
        if file_ids.is_empty() {
            return Ok(max_seq);
        }

        // Segments below a published merge boundary are covered by the hint
        // file and skipped here.
        let non_merge_file_id = merge::non_merge_file_id(&self.options.dir_path)?;
        let mut pending_txns: HashMap<u64, Vec<(Record, RecordLocation)>> = HashMap::new();

        let mut files = self.files.write();
        for (i, &file_id) in file_ids.iter().enumerate() {
            if non_merge_file_id.is_some_and(|boundary| file_id < boundary) {
                continue;
            }
            let segment = if file_id == files.active.file_id() {
                &files.active
            } else {
                files.older.get(&file_id).ok_or(Error::DataFileNotFound)?
            };

            let mut offset = 0;
            while let Some((record, size)) = segment.read_record(offset)? {
                let loc = RecordLocation { file_id, offset, size: size as u32 };
                let (user_key, seq_no) = parse_record_key(&record.key)?;

                if seq_no == NON_TXN_SEQ_NO {
                    self.apply_record(user_key, record.kind, loc)?;
                } else if record.kind == RecordKind::TxnFinished {
                    // The batch is committed: everything buffered under this
                    // sequence number becomes visible, in order.
                    for (rec, pos) in pending_txns.remove(&seq_no).unwrap_or_default() {
                        self.apply_record(rec.key, rec.kind, pos)?;
                    }
                } else {
                    let mut rec = record;
                    rec.key = user_key;
                    pending_txns.entry(seq_no).or_default().push((rec, loc));
                }

                max_seq = max_seq.max(seq_no);
                offset += size;
            }

            if i == file_ids.len() - 1 {
                files.active.set_write_off(offset);
            }
        }
        Ok(max_seq)
    }

    /// Applies one replayed record to the index, with reclaim accounting.
    fn apply_record(&self, key: Vec<u8>, kind: RecordKind, loc: RecordLocation) -> Result<()> {
        match kind {
            RecordKind::Normal => {
                if let Some(old) = self.index.put(key, loc)? {
                    self.reclaim_size.fetch_add(old.size as u64, Ordering::SeqCst);
                }
            }
            RecordKind::Tombstone => {
                let mut reclaimed = loc.size as u64;
                if let Some(old) = self.index.delete(&key)? {
                    reclaimed += old.size as u64;
                }
                self.reclaim_size.fetch_add(reclaimed, Ordering::SeqCst);
            }
            RecordKind::TxnFinished => {}
        }
        Ok(())
    }

    /// Reopens every segment with standard file I/O after an mmap-assisted
    /// startup.
    fn reset_io_type(&self) -> Result<()> {
        let mut files = self.files.write();
        files.active.set_io(IoType::Standard)?;
        for segment in files.older.values_mut() {
            segment.set_io(IoType::Standard)?;
        }
        Ok(())
    }
}

impl Drop for Bitsack {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::error!("failed to close database: {error}");
        }
    }
}

fn validate_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::InvalidOptions("dir_path must not be empty"));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions("data_file_size must be positive"));
    }
    if !(0.0..=1.0).contains(&options.data_file_merge_ratio) {
        return Err(Error::InvalidOptions("data_file_merge_ratio must be within [0, 1]"));
    }
    Ok(())
}

/// Opens every data file in the directory, sorted by ascending file id.
fn load_data_files(dir: &Path, io_type: IoType) -> Result<(Vec<SegmentFile>, Vec<u32>)> {
    let mut file_ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
            let file_id = stem.parse::<u32>().map_err(|_| Error::DataDirectoryCorrupted)?;
            file_ids.push(file_id);
        }
    }
    file_ids.sort_unstable();

    let mut segments = Vec::with_capacity(file_ids.len());
    for &file_id in &file_ids {
        segments.push(SegmentFile::open(dir, file_id, io_type)?);
    }
    Ok((segments, file_ids))
}

/// Reads and deletes the `seq-no` file, returning the persisted counter.
/// The record's key is the counter in decimal.
fn load_seq_no(dir: &Path) -> Result<Option<u64>> {
    let path = dir.join(SEQ_NO_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let seq_file = SegmentFile::open_seq_no_file(dir)?;
    let (record, _) = seq_file.read_record(0)?.ok_or(Error::DataDirectoryCorrupted)?;
    let seq_no = std::str::from_utf8(&record.key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(Error::DataDirectoryCorrupted)?;
    fs::remove_file(path)?;
    Ok(Some(seq_no))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{random_value, test_key};
    use test_case::test_case;

    fn options(dir: &Path) -> Options {
        Options { dir_path: dir.to_path_buf(), ..Options::default() }
    }

    #[test]
    fn open_empty_directory() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        let stat = db.stat()?;
        assert_eq!(stat.key_num, 0);
        assert_eq!(stat.data_file_num, 1);
        Ok(())
    }

    #[test]
    fn rejects_invalid_options() {
        let no_dir = Options { dir_path: "".into(), ..Options::default() };
        assert!(matches!(Bitsack::open(no_dir), Err(Error::InvalidOptions(_))));

        let zero_size = Options { data_file_size: 0, ..Options::default() };
        assert!(matches!(Bitsack::open(zero_size), Err(Error::InvalidOptions(_))));

        let bad_ratio = Options { data_file_merge_ratio: 1.5, ..Options::default() };
        assert!(matches!(Bitsack::open(bad_ratio), Err(Error::InvalidOptions(_))));
    }

    /// A second engine on the same directory must be refused until the
    /// first releases its lock.
    #[test]
    fn directory_lock_is_exclusive() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        assert!(matches!(Bitsack::open(options(dir.path())), Err(Error::DatabaseIsUsing)));

        drop(db);
        assert!(Bitsack::open(options(dir.path())).is_ok());
        Ok(())
    }

    #[test]
    fn put_get_delete_roundtrip() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;

        db.put(b"name", b"bitsack")?;
        assert_eq!(db.get(b"name")?, b"bitsack");

        db.delete(b"name")?;
        assert!(matches!(db.get(b"name"), Err(Error::KeyNotFound)));
        Ok(())
    }

    #[test]
    fn empty_keys_are_rejected() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        assert!(matches!(db.put(b"", b"v"), Err(Error::KeyIsEmpty)));
        assert!(matches!(db.get(b""), Err(Error::KeyIsEmpty)));
        assert!(matches!(db.delete(b""), Err(Error::KeyIsEmpty)));
        Ok(())
    }

    #[test]
    fn empty_values_are_fine() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"key", b"")?;
        assert_eq!(db.get(b"key")?, Vec::<u8>::new());
        Ok(())
    }

    #[test]
    fn overwrites_and_deletes_accrue_reclaimable_bytes() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;

        db.put(b"a", b"first")?;
        assert_eq!(db.stat()?.reclaim_size, 0);

        db.put(b"a", b"second")?;
        let after_overwrite = db.stat()?.reclaim_size;
        assert!(after_overwrite > 0);

        db.delete(b"a")?;
        assert!(db.stat()?.reclaim_size > after_overwrite);
        Ok(())
    }

    #[test]
    fn deleting_missing_key_is_a_noop() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.delete(b"never-written")?;
        db.put(b"k", b"v")?;
        db.delete(b"k")?;
        db.delete(b"k")?;
        assert!(matches!(db.get(b"k"), Err(Error::KeyNotFound)));
        Ok(())
    }

    /// Small segments force rotations; everything must stay readable, both
    /// live and after a restart.
    #[test]
    fn rotation_and_recovery() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let mut opts = options(dir.path());
        opts.data_file_size = 16 * 1024;

        let db = Bitsack::open(opts.clone())?;
        for i in 0..1000 {
            db.put(&test_key(i), &random_value(128))?;
        }
        let stat = db.stat()?;
        assert!(stat.data_file_num >= 3, "expected rotations, got {}", stat.data_file_num);
        assert_eq!(stat.key_num, 1000);
        drop(db);

        let db = Bitsack::open(opts)?;
        assert_eq!(db.stat()?.key_num, 1000);
        for i in (0..1000).step_by(17) {
            assert!(!db.get(&test_key(i))?.is_empty());
        }
        Ok(())
    }

    #[test]
    fn reopen_restores_write_offset() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"first", b"1")?;
        drop(db);

        // New writes append after the replayed tail rather than clobbering it.
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"second", b"2")?;
        assert_eq!(db.get(b"first")?, b"1");
        assert_eq!(db.get(b"second")?, b"2");
        drop(db);

        let db = Bitsack::open(options(dir.path()))?;
        assert_eq!(db.get(b"first")?, b"1");
        assert_eq!(db.get(b"second")?, b"2");
        Ok(())
    }

    #[test]
    fn deletes_survive_restart() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"kept", b"v")?;
        db.put(b"gone", b"v")?;
        db.delete(b"gone")?;
        drop(db);

        let db = Bitsack::open(options(dir.path()))?;
        assert_eq!(db.get(b"kept")?, b"v");
        assert!(matches!(db.get(b"gone"), Err(Error::KeyNotFound)));
        assert_eq!(db.stat()?.key_num, 1);
        Ok(())
    }

    #[test_case(IndexType::BTree; "btree")]
    #[test_case(IndexType::Art; "radix tree")]
    #[test_case(IndexType::BPlusTree; "bplustree")]
    fn works_with_every_index(index_type: IndexType) -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let mut opts = options(dir.path());
        opts.index_type = index_type;

        let db = Bitsack::open(opts.clone())?;
        for i in 0..100 {
            db.put(&test_key(i), &random_value(32))?;
        }
        db.delete(&test_key(0))?;
        db.close()?;
        drop(db);

        let db = Bitsack::open(opts)?;
        assert_eq!(db.stat()?.key_num, 99);
        assert!(matches!(db.get(&test_key(0)), Err(Error::KeyNotFound)));
        assert!(!db.get(&test_key(50))?.is_empty());
        Ok(())
    }

    #[test]
    fn mmap_startup_reads_and_then_writes() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        for i in 0..100 {
            db.put(&test_key(i), &random_value(64))?;
        }
        drop(db);

        let mut opts = options(dir.path());
        opts.mmap_at_startup = true;
        let db = Bitsack::open(opts)?;
        assert_eq!(db.stat()?.key_num, 100);
        // Segments must be back on standard I/O by now.
        db.put(b"after-mmap", b"works")?;
        assert_eq!(db.get(b"after-mmap")?, b"works");
        Ok(())
    }

    #[test]
    fn corrupted_record_fails_open() -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"key", b"a value long enough to corrupt safely")?;
        drop(db);

        // Flip a byte inside the first record's value region.
        let path = crate::segment::data_file_path(dir.path(), 0);
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        file.seek(SeekFrom::Start(20))?;
        file.write_all(&[0xff])?;
        drop(file);

        assert!(matches!(Bitsack::open(options(dir.path())), Err(Error::InvalidCrc)));
        Ok(())
    }

    #[test]
    fn list_keys_and_fold() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        db.put(b"banana", b"2")?;
        db.put(b"apple", b"1")?;
        db.put(b"cherry", b"3")?;

        assert_eq!(db.list_keys()?, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);

        let mut seen = Vec::new();
        db.fold(|key, value| {
            seen.push((key.to_vec(), value));
            true
        })?;
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (b"apple".to_vec(), b"1".to_vec()));

        // Early termination.
        let mut count = 0;
        db.fold(|_, _| {
            count += 1;
            false
        })?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn backup_is_openable_and_excludes_lock() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let backup_dir = tempfile::TempDir::with_prefix("bitsack")?;
        let target = backup_dir.path().join("copy");

        let db = Bitsack::open(options(dir.path()))?;
        for i in 0..50 {
            db.put(&test_key(i), &random_value(24))?;
        }
        db.sync()?;
        db.backup(&target)?;
        assert!(!target.join(LOCK_FILE_NAME).exists());

        // The backup opens as its own store while the original is live.
        let copy = Bitsack::open(options(&target))?;
        assert_eq!(copy.stat()?.key_num, 50);
        Ok(())
    }

    #[test]
    fn stat_counts_match_index() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("bitsack")?;
        let db = Bitsack::open(options(dir.path()))?;
        for i in 0..25 {
            db.put(&test_key(i), &random_value(10))?;
        }
        db.delete(&test_key(3))?;

        let stat = db.stat()?;
        assert_eq!(stat.key_num, 24);
        assert_eq!(stat.key_num, db.list_keys()?.len());
        assert!(stat.disk_size > 0);
        Ok(())
    }
}
