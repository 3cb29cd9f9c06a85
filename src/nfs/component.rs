// SPDX-License-Identifier: MIT
//! The NFS health component.
//!
//! Fans the configured group list out to per-member `write → check → clean`
//! cycles, sequentially and under per-phase deadlines, and folds the
//! outcomes into a single health verdict. Sequential on purpose: one slow
//! mount must not be masked by another's success, and per-host filesystem
//! load stays bounded.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::component::{CheckResult, Component, Event, HealthState, HealthStateType};
use crate::config::NfsConfigProvider;
use crate::mount::{is_nfs_fs_type, MountProbe, ProcMountProbe};
use crate::nfs::checker::{self, CheckerFactory, DirCheckerFactory, OpContext};
use crate::nfs::group::{member_configs, validate_all};

/// Component name, also its only tag.
pub const NAME: &str = "nfs";

/// Budget for each blocking phase (validate, construct, write, check). A
/// phase that outlives this on a hung NFS server is reported as a timeout.
const PHASE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The NFS group-consistency component.
///
/// Cheap to clone; all state is shared. The mount probe and checker factory
/// are constructor-injected seams so tests can substitute doubles.
#[derive(Clone)]
pub struct NfsComponent {
    cancel: CancellationToken,
    machine_id: String,
    configs: Arc<NfsConfigProvider>,
    probe: Arc<dyn MountProbe>,
    factory: Arc<dyn CheckerFactory>,
    check_interval: Duration,
    last: Arc<RwLock<Option<Arc<NfsCheckResult>>>>,
}

impl NfsComponent {
    /// Build with the production mount probe and checker factory.
    pub fn new(machine_id: impl Into<String>, configs: Arc<NfsConfigProvider>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            machine_id: machine_id.into(),
            configs,
            probe: Arc::new(ProcMountProbe),
            factory: Arc::new(DirCheckerFactory),
            check_interval: DEFAULT_CHECK_INTERVAL,
            last: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_mount_probe(mut self, probe: Arc<dyn MountProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_checker_factory(mut self, factory: Arc<dyn CheckerFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    fn store_last(&self, result: &Arc<NfsCheckResult>) {
        *self
            .last
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(result));
    }

    /// Run one check, cache the result, return it.
    pub async fn check_once(&self) -> Arc<NfsCheckResult> {
        let result = Arc::new(self.run_check().await);
        self.store_last(&result);
        if result.health != HealthStateType::Healthy {
            warn!(health = %result.health, reason = %result.reason, error = %result.err, "nfs check");
        } else {
            debug!(reason = %result.reason, "nfs check");
        }
        result
    }

    async fn run_check(&self) -> NfsCheckResult {
        info!("checking nfs");
        let ts = Utc::now();

        let groups = self.configs.get();
        if groups.is_empty() {
            return NfsCheckResult::healthy(ts, "no nfs group configs found".to_string());
        }

        let members = member_configs(&groups, &self.machine_id);

        // Validation phase. The mkdir inside can block on a dead server.
        let validated = {
            let members = members.clone();
            timeout(
                PHASE_TIMEOUT,
                tokio::task::spawn_blocking(move || validate_all(&members)),
            )
            .await
        };
        match validated {
            Err(_) => {
                return NfsCheckResult::degraded(
                    ts,
                    "NFS validation timed out - server may be unresponsive".to_string(),
                    "deadline exceeded".to_string(),
                );
            }
            Ok(Err(join_err)) => {
                return NfsCheckResult::degraded(
                    ts,
                    "invalid nfs group configs: validation task failed".to_string(),
                    join_err.to_string(),
                );
            }
            Ok(Ok(Err(err))) => {
                return NfsCheckResult::degraded(
                    ts,
                    format!("invalid nfs group configs: {err}"),
                    err.to_string(),
                );
            }
            Ok(Ok(Ok(()))) => {}
        }

        // Every configured directory must sit on an actual NFS mount.
        for group in &groups {
            let dir = group.dir.display().to_string();
            match self.probe.find_mnt_target_device(&group.dir) {
                Ok(Some((device, fs_type))) if !device.is_empty() => {
                    if !is_nfs_fs_type(&fs_type) {
                        return NfsCheckResult::degraded(
                            ts,
                            format!(
                                "the path {dir:?} is configured as an NFS volume, \
                                 but the file system type {fs_type:?} is not NFS"
                            ),
                            String::new(),
                        );
                    }
                    info!(dir = %dir, device = %device, fs_type = %fs_type, "nfs mount point found");
                }
                Ok(_) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to find mount target device for {dir}"),
                        String::new(),
                    );
                }
                Err(err) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to find mount target device for {dir}"),
                        err.to_string(),
                    );
                }
            }
        }

        let mut results: Vec<checker::CheckResult> = Vec::with_capacity(members.len());
        let mut messages: Vec<String> = Vec::with_capacity(members.len());

        for member in members {
            let dir = member.config.dir.display().to_string();

            // Construct (validates again, creating the directory if needed).
            let built = {
                let factory = Arc::clone(&self.factory);
                let member = member.clone();
                timeout(
                    PHASE_TIMEOUT,
                    tokio::task::spawn_blocking(move || factory.new_checker(&member)),
                )
                .await
            };
            let checker = match built {
                Err(_) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!(
                            "NFS checker creation timed out for {dir} - server may be unresponsive"
                        ),
                        "deadline exceeded".to_string(),
                    );
                }
                Ok(Err(join_err)) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to create nfs checker for {dir}"),
                        join_err.to_string(),
                    );
                }
                Ok(Ok(Err(err))) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to create nfs checker for {dir}"),
                        err.to_string(),
                    );
                }
                Ok(Ok(Ok(checker))) => checker,
            };

            // Write phase.
            let wrote = {
                let op = OpContext::new()
                    .with_cancel(self.cancel.clone())
                    .with_deadline(Instant::now() + PHASE_TIMEOUT);
                timeout(
                    PHASE_TIMEOUT,
                    tokio::task::spawn_blocking(move || {
                        let outcome = checker.write(&op);
                        (checker, outcome)
                    }),
                )
                .await
            };
            let checker = match wrote {
                Err(_) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("NFS write timed out for {dir} - server may be unresponsive"),
                        "deadline exceeded".to_string(),
                    );
                }
                Ok(Err(join_err)) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to write to nfs checker for {dir}"),
                        join_err.to_string(),
                    );
                }
                Ok(Ok((_, Err(err)))) if err.is_deadline_exceeded() => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("NFS write timed out for {dir} - server may be unresponsive"),
                        err.to_string(),
                    );
                }
                Ok(Ok((_, Err(err)))) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to write to nfs checker for {dir}"),
                        err.to_string(),
                    );
                }
                Ok(Ok((checker, Ok(())))) => checker,
            };

            // Check phase.
            let checked = {
                let op = OpContext::new()
                    .with_cancel(self.cancel.clone())
                    .with_deadline(Instant::now() + PHASE_TIMEOUT);
                timeout(
                    PHASE_TIMEOUT,
                    tokio::task::spawn_blocking(move || {
                        let outcome = checker.check(&op);
                        (checker, outcome)
                    }),
                )
                .await
            };
            let (checker, result) = match checked {
                Err(_) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("NFS check timed out for {dir} - server may be unresponsive"),
                        "deadline exceeded".to_string(),
                    );
                }
                Ok(Err(join_err)) => {
                    return NfsCheckResult::degraded(
                        ts,
                        format!("failed to check nfs checker for {dir}"),
                        join_err.to_string(),
                    );
                }
                Ok(Ok(pair)) => pair,
            };
            if !result.error.is_empty() {
                let reason = if result.timeout_error {
                    format!("NFS check timed out for {dir} - server may be unresponsive")
                } else {
                    format!("failed to check nfs checker for {dir}")
                };
                return NfsCheckResult::degraded(ts, reason, result.error);
            }

            // Clean phase. Garbage collection is an optimization, not a
            // correctness requirement: failures are logged, never fatal.
            let cleaned =
                tokio::task::spawn_blocking(move || checker.clean()).await;
            match cleaned {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(dir = %dir, error = %err, "failed to clean nfs checker"),
                Err(join_err) => warn!(dir = %dir, error = %join_err, "nfs clean task failed"),
            }

            messages.push(result.message.clone());
            results.push(result);
        }

        let mut result = NfsCheckResult::healthy(ts, messages.join(", "));
        result.results = results;
        result
    }
}

#[async_trait]
impl Component for NfsComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tags(&self) -> Vec<String> {
        vec![NAME.to_string()]
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn start(&self) -> anyhow::Result<()> {
        let component = self.clone();
        tokio::spawn(async move {
            // First check fires one full period after start, like the
            // ticker it replaces.
            let mut ticker = tokio::time::interval_at(
                Instant::now() + component.check_interval,
                component.check_interval,
            );
            loop {
                tokio::select! {
                    _ = component.cancel.cancelled() => {
                        debug!("nfs component stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                let _ = component.check_once().await;
            }
        });
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        debug!("closing nfs component");
        self.cancel.cancel();
        Ok(())
    }

    async fn check(&self) -> Arc<dyn CheckResult> {
        self.check_once().await
    }

    fn last_health_states(&self) -> Vec<HealthState> {
        let last = self
            .last
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match last {
            Some(result) => result.health_states(),
            None => vec![HealthState {
                time: Utc::now(),
                component: NAME.to_string(),
                name: NAME.to_string(),
                health: HealthStateType::Healthy,
                reason: "no data yet".to_string(),
                error: String::new(),
            }],
        }
    }

    async fn events(&self, _since: DateTime<Utc>) -> anyhow::Result<Vec<Event>> {
        Ok(Vec::new())
    }
}

/// Aggregate result of one NFS component check.
#[derive(Debug, serde::Serialize)]
pub struct NfsCheckResult {
    /// Per-directory protocol results, in config order. Empty on any
    /// terminal failure before the cycle completed.
    #[serde(rename = "nfs_check_results", skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<checker::CheckResult>,

    #[serde(skip)]
    ts: DateTime<Utc>,
    #[serde(skip)]
    err: String,
    #[serde(skip)]
    health: HealthStateType,
    #[serde(skip)]
    reason: String,
}

impl NfsCheckResult {
    fn healthy(ts: DateTime<Utc>, reason: String) -> Self {
        Self {
            results: Vec::new(),
            ts,
            err: String::new(),
            health: HealthStateType::Healthy,
            reason,
        }
    }

    fn degraded(ts: DateTime<Utc>, reason: String, err: String) -> Self {
        Self {
            results: Vec::new(),
            ts,
            err,
            health: HealthStateType::Degraded,
            reason,
        }
    }
}

impl fmt::Display for NfsCheckResult {
    /// Two-column table of per-directory outcomes; empty when there are
    /// none.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.results.is_empty() {
            return Ok(());
        }

        let dir_width = self
            .results
            .iter()
            .map(|r| r.dir.len())
            .chain(["Directory".len()])
            .max()
            .unwrap_or(0);
        let msg_width = self
            .results
            .iter()
            .map(|r| r.message.len())
            .chain(["Message".len()])
            .max()
            .unwrap_or(0);

        writeln!(f, "| {:<dir_width$} | {:<msg_width$} |", "Directory", "Message")?;
        writeln!(f, "|{:-<w1$}|{:-<w2$}|", "", "", w1 = dir_width + 2, w2 = msg_width + 2)?;
        for result in &self.results {
            writeln!(
                f,
                "| {:<dir_width$} | {:<msg_width$} |",
                result.dir, result.message
            )?;
        }
        Ok(())
    }
}

impl CheckResult for NfsCheckResult {
    fn component_name(&self) -> &str {
        NAME
    }

    fn summary(&self) -> String {
        self.reason.clone()
    }

    fn health_state_type(&self) -> HealthStateType {
        self.health
    }

    fn health_states(&self) -> Vec<HealthState> {
        vec![HealthState {
            time: self.ts,
            component: NAME.to_string(),
            name: NAME.to_string(),
            health: self.health,
            reason: self.reason.clone(),
            error: self.err.clone(),
        }]
    }
}
