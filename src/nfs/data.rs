// SPDX-License-Identifier: MIT
//! On-disk record codec for member files.
//!
//! Current format is a JSON envelope carrying the volume identity next to
//! the payload. Files written before the envelope existed contain the raw
//! payload bytes only; [`Data::read_from`] keeps those readable forever by
//! falling back to treating the whole file as `file_contents`.

use std::io;
use std::path::Path;

/// Payload of one member file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Data {
    /// Logical volume name, empty when the writer is not volume-aware.
    #[serde(default)]
    pub volume_name: String,
    /// Mount path of the volume on the writer host.
    #[serde(default)]
    pub volume_mount_path: String,
    /// The exact content every group member is expected to write.
    #[serde(default)]
    pub file_contents: String,
}

impl Data {
    /// Serialize to JSON and write to `path` in a single call.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        // Serialization of three string fields cannot fail in practice, but
        // the error is still surfaced rather than swallowed.
        let encoded = serde_json::to_vec(self).map_err(io::Error::other)?;
        std::fs::write(path, encoded)
    }

    /// Read a record from `path`.
    ///
    /// Malformed JSON is not an error: the raw bytes become `file_contents`
    /// and the identity fields stay empty (legacy plain-text format). Only
    /// I/O failures (missing file, permission denied) error.
    pub fn read_from(path: &Path) -> io::Result<Data> {
        let raw = std::fs::read(path)?;
        match serde_json::from_slice::<Data>(&raw) {
            Ok(data) => Ok(data),
            Err(_) => Ok(Data {
                file_contents: String::from_utf8_lossy(&raw).into_owned(),
                ..Data::default()
            }),
        }
    }
}
