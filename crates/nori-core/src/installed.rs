//! The `.nori-version` sidecar: the sole record of what is installed in a directory.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NoriError, Result};

pub const SIDECAR_FILE: &str = ".nori-version";
/// Present only while an upgrade is swapping content; a leftover marker means the
/// directory may be missing content.
pub const SWAP_MARKER_FILE: &str = ".nori-swap-incomplete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledRecord {
    pub version: String,
    pub registry_url: String,
}

impl InstalledRecord {
    pub fn new(version: &str, registry_url: &str) -> Self {
        Self {
            version: version.to_string(),
            registry_url: registry_url.to_string(),
        }
    }

    /// `Ok(None)` when `dir` has no sidecar.
    pub fn try_read(dir: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(dir.join(SIDECAR_FILE)) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write via temp file + rename so a reader never sees a half-written sidecar.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let tmp = dir.join(format!("{}.tmp", SIDECAR_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, dir.join(SIDECAR_FILE))?;
        Ok(())
    }
}

/// What the filesystem says about an install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledState {
    /// Directory does not exist.
    Absent,
    /// Directory exists without a readable sidecar.
    UnknownProvenance,
    /// A previous upgrade stopped between deleting old content and landing new content.
    Interrupted,
    Installed(InstalledRecord),
}

pub fn probe(dir: &Path) -> Result<InstalledState> {
    match fs::symlink_metadata(dir) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(InstalledState::Absent),
        Err(e) => return Err(e.into()),
    }
    if dir.join(SWAP_MARKER_FILE).exists() {
        return Ok(InstalledState::Interrupted);
    }
    match InstalledRecord::try_read(dir) {
        Ok(Some(record)) => Ok(InstalledState::Installed(record)),
        Ok(None) => Ok(InstalledState::UnknownProvenance),
        Err(NoriError::Json(_)) => Ok(InstalledState::UnknownProvenance),
        Err(e) => Err(e),
    }
}
