//! Durable file writes: fsync helpers and the atomic-replace pattern.
//!
//! Every store in this crate persists through [`write_atomic`]:
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! Readers always see either the old or the new contents, never a partial
//! write, and the rename survives a power loss once the directory entry is
//! synced.
//!
//! # Why Directory fsync?
//!
//! On POSIX systems, creating or renaming a file updates the directory entry.
//! Without fsync on the directory, that entry may not survive a power loss
//! even if the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
///
/// After this returns, the file's contents are guaranteed to be on disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory to disk, ensuring directory entries are durable.
///
/// Without this, a newly created file might be lost, a renamed file might
/// revert to its old name, and a deleted file might reappear after a crash.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Atomically replaces the contents of `path` with `bytes`.
///
/// Creates the parent directory if it does not exist. On return the new
/// contents are durable; on crash at any point, `path` holds either the old
/// contents or the new ones.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = Path::new(&temp_path);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(temp_path, path)?;
    fsync_dir(parent)?;

    Ok(())
}
