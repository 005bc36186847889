//! Filesystem helpers backing stats, backup and the merge space gate.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Total size in bytes of all files under `path`, recursively.
pub(crate) fn dir_size(path: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += metadata.len();
        }
    }
    Ok(size)
}

/// Free bytes on the filesystem holding `path`.
pub(crate) fn available_disk_size(path: &Path) -> Result<u64> {
    Ok(fs4::available_space(path)?)
}

/// Recursively copies `src` into `dst`, creating `dst` as needed and
/// skipping entries whose file name appears in `exclude`.
pub(crate) fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name.as_os_str() == std::ffi::OsStr::new(e)) {
            continue;
        }
        let target = dst.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&entry.path(), &target, exclude)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
