// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe file writes: on-disk credential artefacts are written via
//! create-at-temp + rename so no reader observes a partial file.

use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` atomically: write to a sibling temp file in
/// the same directory, set its permissions, then rename over the target.
/// The rename is atomic on the same filesystem on both POSIX and Windows.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    set_mode(temp.path(), mode)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Create `dir` (and parents) with the given POSIX mode; a no-op on Windows
/// beyond plain directory creation (access is controlled by ACL elsewhere).
pub fn create_dir_with_mode(dir: &Path, mode: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    set_mode(dir, mode)
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod tests;
