//! Removal of files the workload and the testbed leave behind.

use std::io::ErrorKind;
use std::path::Path;

use crate::domain::error::Result;

/// Remove `path` if it exists. Returns whether something was removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove the entries of `dir` whose file name satisfies `matches`.
///
/// Directories are skipped. A missing `dir` counts as empty.
pub fn remove_matching(dir: &Path, matches: impl Fn(&str) -> bool) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(&matches) && remove_file_if_exists(&entry.path())? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove entries of `dir` named `<prefix>...`.
pub fn remove_prefixed(dir: &Path, prefix: &str) -> Result<usize> {
    remove_matching(dir, |name| name.starts_with(prefix))
}
