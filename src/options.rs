//! Engine, iterator and batch configuration.

use std::path::PathBuf;

/// Configuration for a [`crate::Bitsack`] instance, passed to
/// [`crate::Bitsack::open`]. All tunables live here; the engine keeps no
/// global state.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the data files, created if absent.
    pub dir_path: PathBuf,

    /// Size threshold in bytes at which the active segment is rotated.
    pub data_file_size: u64,

    /// Fsync the active segment after every write.
    pub sync_writes: bool,

    /// Fsync after this many accumulated bytes. Zero disables the
    /// accumulator; `sync_writes` takes precedence.
    pub bytes_per_sync: u64,

    /// Which index structure maps keys to record locations.
    pub index_type: IndexType,

    /// Read data files through a read-only memory map while rebuilding the
    /// index on startup, then reopen them with standard file I/O.
    pub mmap_at_startup: bool,

    /// Fraction of reclaimable bytes in the directory that [`crate::Bitsack::merge`]
    /// requires before it will run. Must be within `[0, 1]`.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("bitsack-data"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: false,
            data_file_merge_ratio: 0.5,
        }
    }
}

/// The in-memory (or on-disk) structure used for the key index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Ordered map, rebuilt from the data files on startup. The default.
    BTree,
    /// Path-compressed radix tree; cheaper for key sets sharing prefixes.
    Art,
    /// Disk-backed B+ tree persisted next to the data files, which makes
    /// startup replay unnecessary.
    BPlusTree,
}

/// Configuration for [`crate::Bitsack::iterator`].
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix. Empty matches all keys.
    pub prefix: Vec<u8>,

    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Configuration for [`crate::Bitsack::new_write_batch`].
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of staged operations in a single batch.
    pub max_batch_num: u32,

    /// Fsync the active segment once the commit record is written.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self { max_batch_num: 10_000, sync_writes: true }
    }
}
