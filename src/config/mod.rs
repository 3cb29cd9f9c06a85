// SPDX-License-Identifier: MIT
//! Daemon configuration.
//!
//! A single TOML file configures the daemon (`diagd --config
//! /etc/diagd/config.toml`): log level, check cadence, and the NFS group
//! tables. Group configs are additionally available through
//! [`NfsConfigProvider`] so an external loader can swap them at runtime
//! without the component holding a stale list.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context;

use crate::nfs::group::GroupConfig;

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

/// Top-level daemon configuration (`config.toml`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log filter when `RUST_LOG` is unset (default: `info`).
    pub log_level: String,
    /// Seconds between periodic component checks (default: 60).
    pub check_interval_secs: u64,
    /// NFS group tables (`[[nfs]]`), one per shared mount.
    #[serde(rename = "nfs")]
    pub nfs_groups: Vec<GroupConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            check_interval_secs: default_check_interval_secs(),
            nfs_groups: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load and parse the TOML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Shared, swappable snapshot of the NFS group configs.
///
/// Constructed once at startup and passed by `Arc` to the NFS component;
/// `set` replaces the whole list, every check reads a fresh snapshot.
#[derive(Debug, Default)]
pub struct NfsConfigProvider {
    configs: RwLock<Vec<GroupConfig>>,
}

impl NfsConfigProvider {
    pub fn new(initial: Vec<GroupConfig>) -> Self {
        Self {
            configs: RwLock::new(initial),
        }
    }

    /// Snapshot of the current group configs.
    pub fn get(&self) -> Vec<GroupConfig> {
        self.configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the group configs. Takes effect on the next check.
    pub fn set(&self, configs: Vec<GroupConfig>) {
        *self
            .configs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = configs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.check_interval(), Duration::from_secs(60));
        assert!(config.nfs_groups.is_empty());
    }

    #[test]
    fn parses_nfs_group_tables() {
        let config: DaemonConfig = toml::from_str(
            r#"
            log_level = "debug"
            check_interval_secs = 30

            [[nfs]]
            volume_name = "shared-a"
            volume_mount_path = "/mnt/shared-a"
            dir = "/mnt/shared-a/.diagd"
            file_contents = "diagd-heartbeat"
            ttl_seconds = 300
            num_expected_files = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.nfs_groups.len(), 1);
        let group = &config.nfs_groups[0];
        assert_eq!(group.volume_name, "shared-a");
        assert_eq!(group.dir, Path::new("/mnt/shared-a/.diagd"));
        assert_eq!(group.ttl_to_delete, Duration::from_secs(300));
        assert_eq!(group.num_expected_files, 4);
    }

    #[test]
    fn load_missing_file_errors_with_path() {
        let err = DaemonConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }

    #[test]
    fn provider_get_set_round_trip() {
        let provider = NfsConfigProvider::default();
        assert!(provider.get().is_empty());

        let group = GroupConfig {
            dir: "/mnt/x".into(),
            file_contents: "c".to_string(),
            ttl_to_delete: Duration::from_secs(1),
            num_expected_files: 1,
            ..GroupConfig::default()
        };
        provider.set(vec![group]);
        assert_eq!(provider.get().len(), 1);

        provider.set(Vec::new());
        assert!(provider.get().is_empty());
    }
}
