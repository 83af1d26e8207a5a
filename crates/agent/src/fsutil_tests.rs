// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn atomic_write_creates_parent_dirs_and_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("worker.json");
    atomic_write(&path, b"{\"worker_id\":\"worker-abc\"}", 0o600).expect("atomic write");
    let read_back = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(read_back, "{\"worker_id\":\"worker-abc\"}");
}

#[test]
fn atomic_write_overwrites_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("worker.json");
    atomic_write(&path, b"first", 0o600).expect("first write");
    atomic_write(&path, b"second", 0o600).expect("second write");
    assert_eq!(std::fs::read_to_string(&path).expect("read back"), "second");
}

#[cfg(unix)]
#[test]
fn atomic_write_sets_requested_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("credentials.json");
    atomic_write(&path, b"{}", 0o640).expect("write");
    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
}
