// SPDX-License-Identifier: MIT
//! Group and member configuration for the shared-directory protocol.
//!
//! A group is the set of hosts writing into one shared NFS directory; a
//! member is one host's participation, keyed by a unique ID that doubles as
//! its file name. Validation is strict and ordered: callers rely on the
//! first-violated invariant being the one reported.

use std::path::PathBuf;
use std::time::Duration;

/// Validation failure for a group or member config.
///
/// Sentinel variants (not formatted strings) so callers can match specific
/// failure kinds.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("directory is empty")]
    DirEmpty,
    #[error("directory is not an absolute path")]
    DirNotAbsolute,
    #[error("directory does not exist and cannot be created")]
    DirNotCreatable,
    /// Stat failed for a reason other than the directory not existing
    /// (e.g., permission denied on a parent). Kept distinct from
    /// [`ConfigError::DirNotCreatable`] and propagated verbatim.
    #[error("failed to stat directory: {0}")]
    DirStat(#[source] std::io::Error),
    #[error("file contents is empty")]
    FileContentsEmpty,
    #[error("ttl to delete is zero")]
    TtlZero,
    #[error("number of expected files is zero")]
    NumExpectedFilesZero,
    #[error("member id is empty")]
    IdEmpty,
}

mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Parameters shared by every member of one group.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GroupConfig {
    /// Optional volume identity tag. Content comparison between a record on
    /// disk and this config only happens when both carry matching non-empty
    /// identity (see the checker), so unrelated writers sharing a directory
    /// naming convention coexist safely.
    #[serde(default)]
    pub volume_name: String,
    /// Optional volume mount path tag, second half of the identity.
    #[serde(default)]
    pub volume_mount_path: String,
    /// Absolute path to the shared directory, writable by all members.
    pub dir: PathBuf,
    /// Exact byte string every member writes and every peer must read back
    /// unchanged.
    pub file_contents: String,
    /// Age after which a member file becomes eligible for deletion.
    #[serde(rename = "ttl_seconds", with = "ttl_secs")]
    pub ttl_to_delete: Duration,
    /// Minimum number of member files required for a successful check.
    pub num_expected_files: usize,
}

impl GroupConfig {
    /// Validate this config, creating `dir` if it does not exist yet.
    ///
    /// Checks run in a fixed order and short-circuit on the first failure:
    /// dir empty → not absolute → not creatable → contents empty → TTL zero
    /// → expected-file count zero.
    pub fn validate_and_mkdir(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::DirEmpty);
        }
        if !self.dir.is_absolute() {
            return Err(ConfigError::DirNotAbsolute);
        }
        match std::fs::metadata(&self.dir) {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(&self.dir).map_err(|_| ConfigError::DirNotCreatable)?;
            }
            Err(err) => return Err(ConfigError::DirStat(err)),
        }
        if self.file_contents.is_empty() {
            return Err(ConfigError::FileContentsEmpty);
        }
        if self.ttl_to_delete.is_zero() {
            return Err(ConfigError::TtlZero);
        }
        if self.num_expected_files == 0 {
            return Err(ConfigError::NumExpectedFilesZero);
        }
        Ok(())
    }

    /// Expand to this host's member view of the group.
    pub fn member(&self, id: impl Into<String>) -> MemberConfig {
        MemberConfig {
            config: self.clone(),
            id: id.into(),
        }
    }
}

/// One host's participation in a group.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemberConfig {
    #[serde(flatten)]
    pub config: GroupConfig,
    /// Unique-per-host identifier; also the file name this member writes in
    /// the shared directory. Distinct IDs are what prevent write collisions
    /// between members; there is no locking.
    pub id: String,
}

impl MemberConfig {
    /// Group-level validation first, then the member-level ID check.
    pub fn validate_and_mkdir(&self) -> Result<(), ConfigError> {
        self.config.validate_and_mkdir()?;
        if self.id.is_empty() {
            return Err(ConfigError::IdEmpty);
        }
        Ok(())
    }
}

/// Expand a batch of group configs into this host's member configs.
pub fn member_configs(configs: &[GroupConfig], id: &str) -> Vec<MemberConfig> {
    configs.iter().map(|c| c.member(id)).collect()
}

/// Validate a batch sequentially, returning the first error encountered.
pub fn validate_all(configs: &[MemberConfig]) -> Result<(), ConfigError> {
    for config in configs {
        config.validate_and_mkdir()?;
    }
    Ok(())
}
