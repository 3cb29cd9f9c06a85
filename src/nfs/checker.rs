// SPDX-License-Identifier: MIT
//! The group-consistency protocol engine.
//!
//! One checker per member config, used for a single `write → check → clean`
//! cycle and discarded; all durable state lives in the shared directory.
//! `write` publishes this member's file, `check` scans the directory and
//! verifies peers, `clean` garbage-collects files past their TTL. The three
//! operations are independently idempotent.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::nfs::data::Data;
use crate::nfs::group::{ConfigError, MemberConfig};

/// Failure of a single checker operation.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The operation's deadline passed before or during the work.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The operation was canceled (daemon shutdown).
    #[error("operation canceled")]
    Canceled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CheckError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, CheckError::DeadlineExceeded)
    }
}

/// Cancellation and deadline budget threaded through one operation.
///
/// Filesystem calls on a hung NFS server block; the budget is re-checked
/// between calls so an expired or canceled operation stops at the next
/// opportunity instead of grinding through the remaining files.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The budget error in effect, if any. Cancellation wins over deadline
    /// expiry when both hold.
    pub fn error(&self) -> Option<CheckError> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Some(CheckError::Canceled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(CheckError::DeadlineExceeded);
        }
        None
    }

    fn ensure_live(&self) -> Result<(), CheckError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Result of one `check` scan. Constructed fresh per call, never mutated
/// after, consumed immediately by the orchestrator.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckResult {
    /// The scanned directory.
    pub dir: String,
    /// Human-readable outcome.
    pub message: String,
    /// Error text; empty on success.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// True when the failure was a deadline expiry; the orchestrator uses
    /// this to tell "the filesystem hung" apart from ordinary failures.
    pub timeout_error: bool,
    /// File names successfully processed, in scan (alphabetical) order. On
    /// failure, only the IDs read before the terminal error.
    pub read_ids: Vec<String>,
}

/// One member's view of the protocol. Implemented by [`DirChecker`] in
/// production; tests substitute their own.
pub trait Checker: Send + Sync {
    /// The shared directory this checker operates on.
    fn dir(&self) -> &Path;

    /// Publish this member's file (`<dir>/<id>`), creating the directory if
    /// needed. An already-exhausted budget fails before any I/O.
    fn write(&self, ctx: &OpContext) -> Result<(), CheckError>;

    /// Scan the directory and verify peer files.
    fn check(&self, ctx: &OpContext) -> CheckResult;

    /// Delete files older than the TTL. Best-effort against concurrent
    /// writers; a missing directory is not an error.
    fn clean(&self) -> Result<(), CheckError>;
}

/// Builds checkers from member configs. The seam the orchestrator uses so
/// tests can substitute failing or recording checkers.
pub trait CheckerFactory: Send + Sync {
    fn new_checker(&self, config: &MemberConfig) -> Result<Box<dyn Checker>, ConfigError>;
}

/// Production factory: validates the member config (creating the directory
/// as a side effect) and hands out [`DirChecker`]s.
#[derive(Debug, Default)]
pub struct DirCheckerFactory;

impl CheckerFactory for DirCheckerFactory {
    fn new_checker(&self, config: &MemberConfig) -> Result<Box<dyn Checker>, ConfigError> {
        config.validate_and_mkdir()?;
        Ok(Box::new(DirChecker::new(config.clone())))
    }
}

/// The real, filesystem-backed checker.
#[derive(Debug, Clone)]
pub struct DirChecker {
    config: MemberConfig,
    clock: fn() -> SystemTime,
}

impl DirChecker {
    pub fn new(config: MemberConfig) -> Self {
        Self {
            config,
            clock: SystemTime::now,
        }
    }

    /// Replace the wall clock `clean` derives its TTL cutoff from. Tests pin
    /// it so file ages can be asserted exactly.
    pub fn with_clock(mut self, clock: fn() -> SystemTime) -> Self {
        self.clock = clock;
        self
    }

    /// Identity-gated comparison: content is only enforced when the record
    /// and this config both carry non-empty, matching volume identity.
    fn same_volume_identity(&self, data: &Data) -> bool {
        !data.volume_name.is_empty()
            && !data.volume_mount_path.is_empty()
            && data.volume_name == self.config.config.volume_name
            && data.volume_mount_path == self.config.config.volume_mount_path
    }
}

/// Directory entries sorted by file name, the scan order every member sees.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    Ok(paths)
}

impl Checker for DirChecker {
    fn dir(&self) -> &Path {
        &self.config.config.dir
    }

    fn write(&self, ctx: &OpContext) -> Result<(), CheckError> {
        ctx.ensure_live()?;
        std::fs::create_dir_all(&self.config.config.dir)?;

        ctx.ensure_live()?;
        let data = Data {
            volume_name: self.config.config.volume_name.clone(),
            volume_mount_path: self.config.config.volume_mount_path.clone(),
            file_contents: self.config.config.file_contents.clone(),
        };
        data.write(&self.config.config.dir.join(&self.config.id))?;
        Ok(())
    }

    fn check(&self, ctx: &OpContext) -> CheckResult {
        let dir = &self.config.config.dir;
        let mut result = CheckResult {
            dir: dir.display().to_string(),
            ..CheckResult::default()
        };

        let entries = match sorted_entries(dir) {
            Ok(entries) => entries,
            Err(err) => {
                result.message = "failed to list files".to_string();
                result.error = format!("failed to list files in {}: {}", dir.display(), err);
                return result;
            }
        };

        let mut read_ids: Vec<String> = Vec::with_capacity(entries.len());
        for path in entries {
            if let Some(err) = ctx.error() {
                result.message = "failed".to_string();
                result.error = format!("failed to read file {}: {}", path.display(), err);
                result.timeout_error = err.is_deadline_exceeded();
                result.read_ids = read_ids;
                return result;
            }

            // Subdirectories hit the read error path here: the scan does not
            // recurse, and an unreadable entry is terminal at its
            // alphabetical position.
            let data = match Data::read_from(&path) {
                Ok(data) => data,
                Err(err) => {
                    result.message = "failed".to_string();
                    result.error = format!("failed to read file {}: {}", path.display(), err);
                    result.read_ids = read_ids;
                    return result;
                }
            };

            if self.same_volume_identity(&data)
                && data.file_contents != self.config.config.file_contents
            {
                result.message = "failed".to_string();
                result.error = format!("file {} has unexpected contents", path.display());
                result.read_ids = read_ids;
                return result;
            }

            // Presence alone counts toward the tally, so names that are not
            // valid UTF-8 still count.
            if let Some(name) = path.file_name() {
                read_ids.push(name.to_string_lossy().into_owned());
            }
        }

        let expected = self.config.config.num_expected_files;
        if read_ids.len() < expected {
            result.message = "failed".to_string();
            result.error = format!(
                "expected {} files, but only {} files were read",
                expected,
                read_ids.len()
            );
        } else {
            result.message = format!(
                "successfully checked directory {:?} with {} files",
                dir, read_ids.len()
            );
        }
        result.read_ids = read_ids;
        result
    }

    fn clean(&self) -> Result<(), CheckError> {
        let dir = &self.config.config.dir;
        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        // Exclusive boundary: age > TTL deletes, age <= TTL keeps. A TTL so
        // large the cutoff predates representable time means nothing can be
        // stale.
        let Some(cutoff) = (self.clock)().checked_sub(self.config.config.ttl_to_delete)
        else {
            return Ok(());
        };

        for entry in read_dir {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Another member's clean may race ours; vanished entries are
                // not a failure.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            tracing::debug!(path = %entry.path().display(), "removing expired file");
            let removed = if metadata.is_dir() {
                std::fs::remove_dir_all(entry.path())
            } else {
                std::fs::remove_file(entry.path())
            };
            match removed {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
