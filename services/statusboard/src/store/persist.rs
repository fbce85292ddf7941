//! Atomic config-file persistence with rotating backups.
//!
//! # Write protocol
//! 1. Rotate backups: `.backup.3` is dropped, `.backup.2` → `.backup.3`,
//!    `.backup.1` → `.backup.2`, `.backup` → `.backup.1`, and the current
//!    file content is copied to `.backup`.
//! 2. Write the new bytes to a sibling `{name}.tmp`, flush to stable
//!    storage, close.
//! 3. Rename the temp file over the target (same-directory rename is the
//!    atomic step).
//! 4. Touch the target's mtime and report it back so the caller can record
//!    it.
//!
//! A failure at any step leaves the target either untouched or fully
//! replaced, never partially written.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Number of rotated generations kept beyond `.backup` itself.
pub const BACKUP_GENERATIONS: u32 = 3;

/// `{path}.backup` for generation 0, `{path}.backup.N` beyond.
pub fn backup_path(path: &Path, generation: u32) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if generation == 0 {
        path.with_file_name(format!("{}.backup", name))
    } else {
        path.with_file_name(format!("{}.backup.{}", name, generation))
    }
}

fn rename_ignore_missing(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn rotate_backups(path: &Path) -> io::Result<()> {
    if !path.exists() {
        // First write; nothing to preserve.
        return Ok(());
    }
    match fs::remove_file(backup_path(path, BACKUP_GENERATIONS)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    for generation in (0..BACKUP_GENERATIONS).rev() {
        rename_ignore_missing(
            &backup_path(path, generation),
            &backup_path(path, generation + 1),
        )?;
    }
    // Copy, not rename: the target must stay present until the new file
    // renames over it.
    fs::copy(path, backup_path(path, 0))?;
    Ok(())
}

/// Perform the full write protocol; returns the target's post-touch mtime.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<SystemTime> {
    rotate_backups(path)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.tmp", name));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())?;
    fs::metadata(path)?.modified()
}
