// SPDX-License-Identifier: MIT
//! End-to-end scenarios for the NFS health component: real checkers on
//! temp directories, stubbed mount probe.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use diagd::component::{CheckResult as _, Component, HealthStateType};
use diagd::config::NfsConfigProvider;
use diagd::mount::MountProbe;
use diagd::nfs::checker::{self, CheckError, Checker, CheckerFactory, OpContext};
use diagd::nfs::group::{ConfigError, GroupConfig, MemberConfig};
use diagd::nfs::NfsComponent;

/// Probe reporting every directory as mounted with a fixed fstype.
struct StaticProbe {
    fs_type: &'static str,
}

impl MountProbe for StaticProbe {
    fn find_mnt_target_device(&self, _dir: &Path) -> io::Result<Option<(String, String)>> {
        Ok(Some((
            "fs.internal:/export".to_string(),
            self.fs_type.to_string(),
        )))
    }
}

/// Probe that finds no covering mount.
struct MissingMountProbe;

impl MountProbe for MissingMountProbe {
    fn find_mnt_target_device(&self, _dir: &Path) -> io::Result<Option<(String, String)>> {
        Ok(None)
    }
}

#[derive(Clone, Copy)]
enum StubFailure {
    WriteDeadline,
    CheckTimeout,
}

/// Checker that fails a chosen phase the way a hung NFS server would.
struct StubChecker {
    dir: PathBuf,
    failure: StubFailure,
}

impl Checker for StubChecker {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, _ctx: &OpContext) -> Result<(), CheckError> {
        match self.failure {
            StubFailure::WriteDeadline => Err(CheckError::DeadlineExceeded),
            StubFailure::CheckTimeout => Ok(()),
        }
    }

    fn check(&self, _ctx: &OpContext) -> checker::CheckResult {
        checker::CheckResult {
            dir: self.dir.display().to_string(),
            message: "failed".to_string(),
            error: format!("failed to read file {}: deadline exceeded", self.dir.display()),
            timeout_error: true,
            read_ids: Vec::new(),
        }
    }

    fn clean(&self) -> Result<(), CheckError> {
        Ok(())
    }
}

struct StubFactory {
    failure: StubFailure,
}

impl CheckerFactory for StubFactory {
    fn new_checker(&self, config: &MemberConfig) -> Result<Box<dyn Checker>, ConfigError> {
        Ok(Box::new(StubChecker {
            dir: config.config.dir.clone(),
            failure: self.failure,
        }))
    }
}

fn group(dir: &Path) -> GroupConfig {
    GroupConfig {
        volume_name: String::new(),
        volume_mount_path: String::new(),
        dir: dir.to_path_buf(),
        file_contents: "x".to_string(),
        ttl_to_delete: Duration::from_secs(3600),
        num_expected_files: 1,
    }
}

fn component(configs: Vec<GroupConfig>, fs_type: &'static str) -> NfsComponent {
    NfsComponent::new("machine-1", Arc::new(NfsConfigProvider::new(configs)))
        .with_mount_probe(Arc::new(StaticProbe { fs_type }))
}

#[tokio::test]
async fn empty_config_list_is_healthy() {
    let component = component(Vec::new(), "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Healthy);
    assert_eq!(result.summary(), "no nfs group configs found");
}

#[tokio::test]
async fn single_group_on_nfs_mount_is_healthy() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Healthy);
    assert!(
        result.summary().contains("successfully checked directory"),
        "summary: {}",
        result.summary()
    );
    // The member file was written as part of the cycle.
    assert!(tmp.path().join("machine-1").exists());
}

#[tokio::test]
async fn non_nfs_mount_is_degraded() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "ext4");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    let summary = result.summary();
    assert!(summary.contains(&tmp.path().display().to_string()), "summary: {summary}");
    assert!(summary.contains("not NFS"), "summary: {summary}");
}

#[tokio::test]
async fn missing_mount_is_degraded() {
    let tmp = TempDir::new().unwrap();
    let configs = vec![group(tmp.path())];
    let component = NfsComponent::new("machine-1", Arc::new(NfsConfigProvider::new(configs)))
        .with_mount_probe(Arc::new(MissingMountProbe));
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    assert!(result.summary().contains("failed to find mount target device"));
}

#[tokio::test]
async fn invalid_group_config_is_degraded() {
    let tmp = TempDir::new().unwrap();
    let mut bad = group(tmp.path());
    bad.file_contents = String::new();
    let component = component(vec![bad], "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    assert!(
        result.summary().starts_with("invalid nfs group configs"),
        "summary: {}",
        result.summary()
    );
}

#[tokio::test]
async fn quorum_shortfall_is_degraded_with_counts() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = group(tmp.path());
    cfg.num_expected_files = 3;
    let component = component(vec![cfg], "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    assert!(result.summary().contains("failed to check nfs checker"));
    let states = result.health_states();
    assert_eq!(states.len(), 1);
    assert!(
        states[0]
            .error
            .contains("expected 3 files, but only 1 files were read"),
        "error: {}",
        states[0].error
    );
}

#[tokio::test]
async fn write_deadline_is_reported_as_write_timeout() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "nfs").with_checker_factory(Arc::new(
        StubFactory {
            failure: StubFailure::WriteDeadline,
        },
    ));
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    let dir = tmp.path().display().to_string();
    assert_eq!(
        result.summary(),
        format!("NFS write timed out for {dir} - server may be unresponsive")
    );
}

#[tokio::test]
async fn check_timeout_flag_is_reported_as_check_timeout() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "nfs").with_checker_factory(Arc::new(
        StubFactory {
            failure: StubFailure::CheckTimeout,
        },
    ));
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Degraded);
    let dir = tmp.path().display().to_string();
    assert_eq!(
        result.summary(),
        format!("NFS check timed out for {dir} - server may be unresponsive")
    );
    let states = result.health_states();
    assert!(states[0].error.contains("deadline exceeded"));
}

#[tokio::test]
async fn multiple_groups_aggregate_into_one_summary() {
    let tmp_a = TempDir::new().unwrap();
    let tmp_b = TempDir::new().unwrap();
    let component = component(vec![group(tmp_a.path()), group(tmp_b.path())], "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Healthy);
    let summary = result.summary();
    assert!(summary.contains(&tmp_a.path().display().to_string()));
    assert!(summary.contains(&tmp_b.path().display().to_string()));
    assert!(summary.contains(", "));

    // Display renders a per-directory table.
    let table = result.to_string();
    assert!(table.contains("Directory"));
    assert!(table.contains(&tmp_a.path().display().to_string()));
    assert!(table.contains(&tmp_b.path().display().to_string()));
}

#[tokio::test]
async fn peer_files_count_toward_quorum() {
    let tmp = TempDir::new().unwrap();
    // A peer already wrote its file.
    std::fs::write(tmp.path().join("machine-2"), "x").unwrap();

    let mut cfg = group(tmp.path());
    cfg.num_expected_files = 2;
    let component = component(vec![cfg], "nfs");
    let result = Component::check(&component).await;

    assert_eq!(result.health_state_type(), HealthStateType::Healthy);
}

#[tokio::test]
async fn last_health_states_tracks_latest_check() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "nfs");

    // Nothing cached yet.
    let states = component.last_health_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].reason, "no data yet");
    assert_eq!(states[0].health, HealthStateType::Healthy);

    Component::check(&component).await;
    let states = component.last_health_states();
    assert_eq!(states.len(), 1);
    assert!(states[0].reason.contains("successfully checked directory"));
    assert_eq!(states[0].component, "nfs");
    assert_eq!(states[0].name, "nfs");
}

#[tokio::test]
async fn provider_updates_apply_on_next_check() {
    let provider = Arc::new(NfsConfigProvider::default());
    let component = NfsComponent::new("machine-1", Arc::clone(&provider))
        .with_mount_probe(Arc::new(StaticProbe { fs_type: "nfs" }));

    let result = Component::check(&component).await;
    assert_eq!(result.summary(), "no nfs group configs found");

    let tmp = TempDir::new().unwrap();
    provider.set(vec![group(tmp.path())]);
    let result = Component::check(&component).await;
    assert!(result.summary().contains("successfully checked directory"));
}

#[tokio::test]
async fn first_periodic_check_waits_one_interval() {
    let tmp = TempDir::new().unwrap();
    let component =
        component(vec![group(tmp.path())], "nfs").with_check_interval(Duration::from_secs(60));

    component.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // No tick has fired yet; the cache still holds the initial placeholder.
    assert_eq!(component.last_health_states()[0].reason, "no data yet");
    component.close().unwrap();
}

#[tokio::test]
async fn start_and_close_are_clean_and_idempotent() {
    let tmp = TempDir::new().unwrap();
    let component = component(vec![group(tmp.path())], "nfs")
        .with_check_interval(Duration::from_millis(10));

    component.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The ticker ran at least once and cached a result.
    assert!(component.last_health_states()[0]
        .reason
        .contains("successfully checked directory"));

    component.close().unwrap();
    component.close().unwrap();
}

#[tokio::test]
async fn contract_surface() {
    let component = component(Vec::new(), "nfs");
    assert_eq!(component.name(), "nfs");
    assert_eq!(component.tags(), vec!["nfs".to_string()]);
    assert!(component.is_supported());
    let events = component.events(chrono::Utc::now()).await.unwrap();
    assert!(events.is_empty());

    let result = Component::check(&component).await;
    assert_eq!(result.component_name(), "nfs");
}
