//! Error taxonomy for registry resolution and installation.

use std::fmt;
use std::path::PathBuf;

/// One registry that answered for an ambiguous package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCandidate {
    pub registry_url: String,
    pub latest_version: Option<String>,
    pub description: Option<String>,
}

impl fmt::Display for RegistryCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.registry_url)?;
        if let Some(v) = &self.latest_version {
            write!(f, " (latest: {})", v)?;
        }
        if let Some(d) = &self.description {
            write!(f, " - {}", d)?;
        }
        Ok(())
    }
}

fn format_candidates(candidates: &[RegistryCandidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("\n  {}", c))
        .collect::<String>()
}

fn format_registry(registry: &Option<String>) -> String {
    registry
        .as_ref()
        .map(|r| format!(" on {}", r))
        .unwrap_or_default()
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Main error type for nori operations.
#[derive(Debug, thiserror::Error)]
pub enum NoriError {
    /// Malformed package string.
    #[error("invalid package spec '{input}': {reason}")]
    InvalidSpec { input: String, reason: String },

    /// No queried registry had the package (or the requested artifact).
    #[error("package '{package}' not found{}", format_registry(.registry))]
    NotFound {
        package: String,
        registry: Option<String>,
    },

    /// More than one registry had the package; caller must pick one.
    #[error("package '{package}' exists on multiple registries; re-run with an explicit registry:{}", format_candidates(.candidates))]
    AmbiguousPackage {
        package: String,
        candidates: Vec<RegistryCandidate>,
    },

    /// Explicit private registry requested without configured credentials.
    #[error("registry {registry_url} requires authentication but no credentials are configured for it")]
    AuthRequired { registry_url: String },

    /// Transport failure or unexpected HTTP status from one registry.
    #[error("network error for {url}{}: {detail}", format_status(.status))]
    Network {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    /// Archive could not be fully extracted.
    #[error("failed to extract archive into {}: {detail}", .path.display())]
    Extraction { path: PathBuf, detail: String },

    /// Install directory exists without a trustworthy sidecar.
    #[error("{} {reason}; remove it manually first", .path.display())]
    Blocked { path: PathBuf, reason: String },

    /// `nori.json` exists but has an unexpected shape.
    #[error("invalid manifest {}: {detail}", .path.display())]
    ManifestParse { path: PathBuf, detail: String },

    /// Publishing rejected or failed.
    #[error("upload of '{package}@{version}' failed: {detail}")]
    Upload {
        package: String,
        version: String,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NoriError {
    /// True for "package absent" answers, which multi-registry search treats as no result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NoriError::NotFound { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, NoriError::Network { .. })
    }

    pub(crate) fn extraction(path: &std::path::Path, detail: impl fmt::Display) -> Self {
        NoriError::Extraction {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}

/// Result type alias for nori operations.
pub type Result<T> = std::result::Result<T, NoriError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_message_lists_every_registry() {
        let err = NoriError::AmbiguousPackage {
            package: "demo".to_string(),
            candidates: vec![
                RegistryCandidate {
                    registry_url: "https://noriskillsets.dev".to_string(),
                    latest_version: Some("1.0.0".to_string()),
                    description: None,
                },
                RegistryCandidate {
                    registry_url: "https://acme.noriskillsets.dev".to_string(),
                    latest_version: Some("2.1.0".to_string()),
                    description: Some("Acme profile".to_string()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("https://noriskillsets.dev (latest: 1.0.0)"));
        assert!(msg.contains("https://acme.noriskillsets.dev (latest: 2.1.0) - Acme profile"));
    }

    #[test]
    fn network_message_includes_status() {
        let err = NoriError::Network {
            url: "https://x/api/packages/demo".to_string(),
            status: Some(503),
            detail: "unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "network error for https://x/api/packages/demo (HTTP 503): unavailable"
        );
        assert!(err.is_network());
        assert!(!err.is_not_found());
    }
}
