// SPDX-License-Identifier: MIT
//! diagd, a host diagnostics daemon.
//!
//! A collection of independent subsystem health checkers ("components")
//! behind one uniform contract. Each component polls its subsystem on a
//! periodic tick and exposes the latest verdict to whoever asks; the
//! aggregation and reporting layers live outside this crate.

pub mod component;
pub mod config;
pub mod mount;
pub mod nfs;

pub use component::{CheckResult, Component, HealthState, HealthStateType};
pub use config::{DaemonConfig, NfsConfigProvider};
