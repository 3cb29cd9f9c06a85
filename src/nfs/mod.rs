// SPDX-License-Identifier: MIT
//! NFS group-consistency checking.
//!
//! Hosts sharing an NFS mount form a group: each writes a uniquely named
//! file into a shared directory, verifies its peers' files, and
//! garbage-collects expired ones. A healthy group sees every member's file
//! with the expected contents; anything else means the mount is broken,
//! slow, or misconfigured somewhere in the group.
//!
//! - [`data`] — on-disk record codec (JSON with legacy plain-text fallback)
//! - [`group`] — group/member configuration and validation
//! - [`checker`] — the write/check/clean protocol engine
//! - [`component`] — the health component orchestrating it all

pub mod checker;
pub mod component;
pub mod data;
pub mod group;

pub use component::{NfsComponent, NfsCheckResult, NAME};
