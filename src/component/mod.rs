// SPDX-License-Identifier: MIT
//! Generic health-component contract.
//!
//! Every subsystem checker (NFS, and whatever comes next) implements
//! [`Component`] and reports through [`CheckResult`] / [`HealthState`]. The
//! daemon core only ever talks to these traits; it never sees a concrete
//! checker type.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Health verdict reported by a component check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStateType {
    /// The subsystem is operating normally.
    Healthy,
    /// The subsystem is functional but impaired (e.g., a peer file is stale
    /// or a mount is misconfigured).
    Degraded,
    /// The subsystem is unavailable or critically broken.
    Unhealthy,
}

impl fmt::Display for HealthStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStateType::Healthy => write!(f, "healthy"),
            HealthStateType::Degraded => write!(f, "degraded"),
            HealthStateType::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// One health-state entry surfaced to the aggregator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthState {
    /// When the underlying check ran.
    pub time: DateTime<Utc>,
    /// Component that produced this state.
    pub component: String,
    /// Name of the state (components producing a single state reuse the
    /// component name).
    pub name: String,
    /// Verdict.
    pub health: HealthStateType,
    /// One-line human-readable reason.
    pub reason: String,
    /// Raw error text, kept out of `reason` so diagnostics do not pollute
    /// the summary.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// A discrete occurrence a component wants to surface (reboots, XID errors,
/// ...). The NFS component produces none; the type exists for the contract.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub component: String,
    pub name: String,
    pub message: String,
}

/// Result of one component check.
///
/// `Display` renders the detailed, possibly multi-line form (the NFS
/// component renders a per-directory table); [`summary`](Self::summary) is
/// the one-liner.
pub trait CheckResult: fmt::Display + Send + Sync {
    /// Name of the component that produced this result.
    fn component_name(&self) -> &str;

    /// One-line reason for the verdict.
    fn summary(&self) -> String;

    /// Verdict of this check.
    fn health_state_type(&self) -> HealthStateType;

    /// Health-state entries derived from this result.
    fn health_states(&self) -> Vec<HealthState>;
}

/// Contract every subsystem checker satisfies.
///
/// `start` spawns the component's periodic work; `check` runs one evaluation
/// on demand; `close` stops the periodic work and must be idempotent.
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable component name (doubles as the registry key).
    fn name(&self) -> &'static str;

    /// Tags used by the aggregator to group components.
    fn tags(&self) -> Vec<String>;

    /// Whether this component can run on the current host.
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin periodic checking. Returns immediately; the work runs on a
    /// background task until [`close`](Self::close).
    fn start(&self) -> anyhow::Result<()>;

    /// Stop periodic checking. Safe to call more than once and from any
    /// task, including while a check is in flight.
    fn close(&self) -> anyhow::Result<()>;

    /// Run one check now and return its result.
    async fn check(&self) -> Arc<dyn CheckResult>;

    /// Most recent health states, without running a new check.
    fn last_health_states(&self) -> Vec<HealthState>;

    /// Events since `since`. Components with no event stream return empty.
    async fn events(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<Event>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_type_display() {
        assert_eq!(HealthStateType::Healthy.to_string(), "healthy");
        assert_eq!(HealthStateType::Degraded.to_string(), "degraded");
        assert_eq!(HealthStateType::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn health_state_type_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStateType::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }

    #[test]
    fn health_state_skips_empty_error() {
        let state = HealthState {
            time: Utc::now(),
            component: "nfs".to_string(),
            name: "nfs".to_string(),
            health: HealthStateType::Healthy,
            reason: "ok".to_string(),
            error: String::new(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("error").is_none());
    }
}
