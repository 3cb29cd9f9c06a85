// SPDX-License-Identifier: MIT
//! Mount-table probing.
//!
//! The NFS component refuses to run its write/check cycle against a
//! directory whose backing filesystem is not NFS; [`MountProbe`] is the seam
//! it uses to find out. Production parses `/proc/self/mountinfo`; tests
//! inject stubs.

use std::io;
use std::path::{Path, PathBuf};

/// Resolves the mount covering a directory.
pub trait MountProbe: Send + Sync {
    /// Returns `(device, fstype)` for the deepest mount containing `dir`,
    /// or `None` when no mount covers it.
    fn find_mnt_target_device(&self, dir: &Path) -> io::Result<Option<(String, String)>>;
}

/// Whether a filesystem type string is NFS.
///
/// Exact, case-sensitive match: `nfs4` and mixed-case variants do not pass.
pub fn is_nfs_fs_type(fs_type: &str) -> bool {
    fs_type == "nfs"
}

/// One parsed mountinfo row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MountEntry {
    mount_point: PathBuf,
    fs_type: String,
    source: String,
}

/// Octal escapes used by the kernel for whitespace in mount points.
fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Parse `/proc/self/mountinfo` text. Malformed lines are skipped.
fn parse_mountinfo(text: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        // Optional fields of variable length sit before a lone "-"
        // separator; fstype and source follow it.
        let Some((left, right)) = line.split_once(" - ") else {
            continue;
        };
        let left: Vec<&str> = left.split_whitespace().collect();
        let right: Vec<&str> = right.split_whitespace().collect();
        if left.len() < 5 || right.len() < 2 {
            continue;
        }
        entries.push(MountEntry {
            mount_point: PathBuf::from(unescape(left[4])),
            fs_type: right[0].to_string(),
            source: unescape(right[1]),
        });
    }
    entries
}

/// Deepest (longest mount point) entry covering `dir`.
fn find_covering_mount(entries: &[MountEntry], dir: &Path) -> Option<(String, String)> {
    entries
        .iter()
        .filter(|entry| dir.starts_with(&entry.mount_point))
        .max_by_key(|entry| entry.mount_point.as_os_str().len())
        .map(|entry| (entry.source.clone(), entry.fs_type.clone()))
}

/// Probe backed by the kernel's per-process mount table.
#[derive(Debug, Default)]
pub struct ProcMountProbe;

impl MountProbe for ProcMountProbe {
    fn find_mnt_target_device(&self, dir: &Path) -> io::Result<Option<(String, String)>> {
        // Resolve symlinks so the prefix match runs against the same form
        // the mount table uses; fall back to the given path when the
        // directory does not exist yet.
        let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let text = std::fs::read_to_string("/proc/self/mountinfo")?;
        let found = find_covering_mount(&parse_mountinfo(&text), &resolved);
        tracing::debug!(dir = %resolved.display(), mount = ?found, "mount probe");
        Ok(found)
    }
}
