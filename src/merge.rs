//! Online compaction.
//!
//! Merge rewrites every record the index still references into a fresh
//! generation of segments inside a staging directory next to the data
//! directory, together with a hint file mapping each surviving key to its
//! new location. A `merge-finished` marker written last certifies the
//! staging directory; the next open publishes it atomically by deleting
//! the merged originals and renaming the staged files into place. Writes
//! concurrent with a merge land in segments at or above the recorded
//! boundary, which merge never touches.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use integer_encoding::VarInt;

use crate::batch::{parse_record_key, wrap_record_key, NON_TXN_SEQ_NO};
use crate::db::Bitsack;
use crate::error::{Error, Result};
use crate::fio::IoType;
use crate::fsutil;
use crate::record::{Record, RecordKind, RecordLocation};
use crate::segment::{self, SegmentFile, MERGE_FINISHED_FILE_NAME};

const MERGE_DIR_SUFFIX: &str = "-merge";

/// Staging directory adjacent to the data directory.
pub(crate) fn merge_path(dir: &Path) -> PathBuf {
    let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    dir.with_file_name(format!("{name}{MERGE_DIR_SUFFIX}"))
}

impl Bitsack {
    /// Compacts the store online, dropping overwritten records and
    /// tombstones. Requires the directory's reclaimable fraction to have
    /// reached `data_file_merge_ratio` and enough free disk space to hold
    /// the surviving records. The compacted generation takes effect on the
    /// next open.
    pub fn merge(&self) -> Result<()> {
        let Some(_merge_guard) = self.merge_lock.try_lock() else {
            return Err(Error::MergeInProgress);
        };

        {
            let files = self.files.read();
            if files.older.is_empty() && files.active.write_off() == 0 {
                return Ok(());
            }
        }

        let total_size = fsutil::dir_size(&self.options.dir_path)?;
        let reclaimable = self.reclaim_size.load(Ordering::SeqCst);
        if (reclaimable as f32) < total_size as f32 * self.options.data_file_merge_ratio {
            return Err(Error::MergeRatioUnreached);
        }
        let live_size = total_size.saturating_sub(reclaimable);
        if live_size >= fsutil::available_disk_size(&self.options.dir_path)? {
            return Err(Error::MergeSpaceNotEnough);
        }

        // Seal the active segment under the writer lock. Everything below
        // the new active id is immutable and subject to this merge; the
        // lock is released before the rewrite starts.
        let (non_merge_file_id, merge_ids) = {
            let mut files = self.files.write();
            files.active.sync()?;
            let next_id = files.active.file_id() + 1;
            let rotated = std::mem::replace(
                &mut files.active,
                SegmentFile::open(&self.options.dir_path, next_id, IoType::Standard)?,
            );
            files.older.insert(rotated.file_id(), rotated);
            let mut ids: Vec<u32> = files.older.keys().copied().collect();
            ids.sort_unstable();
            (next_id, ids)
        };
        log::info!(
            "merging {} segments below file id {non_merge_file_id} in {}",
            merge_ids.len(),
            self.options.dir_path.display()
        );

        let staging_dir = merge_path(&self.options.dir_path);
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }
        fs::create_dir_all(&staging_dir)?;

        let mut out = SegmentFile::open(&staging_dir, 0, IoType::Standard)?;
        let mut hint = SegmentFile::open_hint_file(&staging_dir)?;

        for file_id in merge_ids {
            // The snapshot is immutable, so it can be scanned through fresh
            // read handles without holding the engine lock.
            let segment = SegmentFile::open(&self.options.dir_path, file_id, IoType::Standard)?;
            let mut offset = 0;
            while let Some((record, size)) = segment.read_record(offset)? {
                let (user_key, _) = parse_record_key(&record.key)?;

                // A record survives only while the index points at this
                // exact location; anything else is garbage or superseded.
                let live = self
                    .index
                    .get(&user_key)?
                    .is_some_and(|loc| loc.file_id == file_id && loc.offset == offset);
                if live {
                    let rewritten = Record {
                        key: wrap_record_key(&user_key, NON_TXN_SEQ_NO),
                        value: record.value,
                        kind: RecordKind::Normal,
                    };
                    let encoded = rewritten.encode();
                    if out.write_off() + encoded.len() as u64 > self.options.data_file_size {
                        out.sync()?;
                        let next = out.file_id() + 1;
                        out = SegmentFile::open(&staging_dir, next, IoType::Standard)?;
                    }
                    let loc = RecordLocation {
                        file_id: out.file_id(),
                        offset: out.write_off(),
                        size: encoded.len() as u32,
                    };
                    out.append(&encoded)?;
                    hint.write_hint_record(&user_key, &loc)?;
                }
                offset += size;
            }
        }
        out.sync()?;
        hint.sync()?;

        // Written last: its presence certifies the staging directory as a
        // complete generation.
        let mut finished = SegmentFile::open_merge_finished_file(&staging_dir)?;
        let mut id_buf = [0u8; 5];
        let n = (non_merge_file_id as i64).encode_var(&mut id_buf);
        let marker =
            Record { key: Vec::new(), value: id_buf[..n].to_vec(), kind: RecordKind::Normal };
        finished.append(&marker.encode())?;
        finished.sync()?;
        Ok(())
    }
}

/// Ingests a completed merge on open, returning whether one was published.
/// An unfinished staging directory is deleted outright; a finished one
/// replaces the originals below the recorded boundary before the data
/// files are loaded.
pub(crate) fn load_merge_files(dir: &Path) -> Result<bool> {
    let staging_dir = merge_path(dir);
    if !staging_dir.is_dir() {
        return Ok(false);
    }

    if !staging_dir.join(MERGE_FINISHED_FILE_NAME).is_file() {
        // A crash interrupted the merge; its output is unusable.
        log::warn!("removing unfinished merge directory {}", staging_dir.display());
        fs::remove_dir_all(&staging_dir)?;
        return Ok(false);
    }

    let boundary = read_non_merge_file_id(&staging_dir)?;
    for file_id in 0..boundary {
        let path = segment::data_file_path(dir, file_id);
        if path.is_file() {
            fs::remove_file(path)?;
        }
    }
    for entry in fs::read_dir(&staging_dir)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir_all(&staging_dir)?;
    log::info!("published merged segments below file id {boundary}");
    Ok(true)
}

/// The non-merge boundary recorded in the directory's `merge-finished`
/// marker, if one is present. Segments below it are covered by the hint
/// file and skipped during replay.
pub(crate) fn non_merge_file_id(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).is_file() {
        return Ok(None);
    }
    Ok(Some(read_non_merge_file_id(dir)?))
}

fn read_non_merge_file_id(dir: &Path) -> Result<u32> {
    let marker = SegmentFile::open_merge_finished_file(dir)?;
    let (record, _) = marker.read_record(0)?.ok_or(Error::DataDirectoryCorrupted)?;
    let (id, _) = i64::decode_var(&record.value).ok_or(Error::DataDirectoryCorrupted)?;
    Ok(id as u32)
}
