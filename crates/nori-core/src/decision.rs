//! Decide between fresh install, upgrade, and no-op from the installed state and the
//! resolved remote version. Downgrades never happen.

use std::fmt;
use std::path::Path;

use crate::error::{NoriError, Result};
use crate::installed::InstalledState;
use crate::version::{compare_versions, VersionRelation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    AlreadyAtVersion,
    AlreadyAtNewerVersion { installed: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    Install,
    Upgrade { from: String },
    NoOp(NoOpReason),
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateDecision::Install => write!(f, "install"),
            UpdateDecision::Upgrade { from } => write!(f, "upgrade from {}", from),
            UpdateDecision::NoOp(NoOpReason::AlreadyAtVersion) => write!(f, "already at version"),
            UpdateDecision::NoOp(NoOpReason::AlreadyAtNewerVersion { installed }) => {
                write!(f, "already at newer version {}", installed)
            }
        }
    }
}

/// | state                   | remote vs installed | decision                 |
/// |-------------------------|---------------------|--------------------------|
/// | absent                  | -                   | `Install`                |
/// | no sidecar / interrupted| -                   | `Blocked` error          |
/// | sidecar                 | greater             | `Upgrade`                |
/// | sidecar                 | equal               | `NoOp(AlreadyAtVersion)` |
/// | sidecar                 | lesser              | `NoOp(AlreadyAtNewer)`   |
/// | sidecar                 | non-semver, unequal | `Upgrade`                |
pub fn decide(dir: &Path, state: &InstalledState, remote_version: &str) -> Result<UpdateDecision> {
    let record = match state {
        InstalledState::Absent => return Ok(UpdateDecision::Install),
        InstalledState::UnknownProvenance => {
            return Err(NoriError::Blocked {
                path: dir.to_path_buf(),
                reason: "exists but has no version record (unknown provenance)".to_string(),
            })
        }
        InstalledState::Interrupted => {
            return Err(NoriError::Blocked {
                path: dir.to_path_buf(),
                reason: "was left partially installed by an interrupted upgrade".to_string(),
            })
        }
        InstalledState::Installed(record) => record,
    };

    Ok(match compare_versions(remote_version, &record.version) {
        VersionRelation::Newer | VersionRelation::Incomparable => UpdateDecision::Upgrade {
            from: record.version.clone(),
        },
        VersionRelation::Same => UpdateDecision::NoOp(NoOpReason::AlreadyAtVersion),
        VersionRelation::Older => UpdateDecision::NoOp(NoOpReason::AlreadyAtNewerVersion {
            installed: record.version.clone(),
        }),
    })
}
