//! Install a profile package: resolve, decide, place the archive, then cascade skills.

use std::fmt;
use std::path::PathBuf;

use crate::cascade::{cascade_dependencies, DependencyReport};
use crate::decision::{decide, NoOpReason, UpdateDecision};
use crate::error::Result;
use crate::installed::{probe, InstalledRecord};
use crate::installer::{install_archive, InstallMode};
use crate::package_spec::PackageSpec;
use crate::registry::{resolve, PackageKind, Registries, RegistryClient};
use crate::root::InstallRoot;
use crate::utils;
use crate::version::resolve_install_version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub spec: PackageSpec,
    /// Query only this registry instead of searching every configured one.
    pub registry_url: Option<String>,
}

impl InstallRequest {
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            spec,
            registry_url: None,
        }
    }

    pub fn with_registry(mut self, url: &str) -> Self {
        self.registry_url = Some(url.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Upgraded { from: String },
    AlreadyCurrent,
    AlreadyNewer { installed: String },
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::Installed => write!(f, "installed"),
            InstallOutcome::Upgraded { from } => write!(f, "upgraded from {}", from),
            InstallOutcome::AlreadyCurrent => write!(f, "already at this version"),
            InstallOutcome::AlreadyNewer { installed } => {
                write!(f, "already at newer version {}", installed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub package: String,
    pub version: String,
    pub registry_url: String,
    pub path: PathBuf,
    pub outcome: InstallOutcome,
    pub dependencies: Vec<DependencyReport>,
    pub warnings: Vec<String>,
}

/// Resolve `request` across `registries` and bring `root` up to the resolved version.
/// Dependency problems end up in `warnings`; the parent install still succeeds.
pub fn install_package(
    client: &dyn RegistryClient,
    request: &InstallRequest,
    registries: &Registries,
    root: &InstallRoot,
) -> Result<InstallReport> {
    let spec = &request.spec;
    let found = resolve(client, spec, registries, request.registry_url.as_deref())?;
    let version = resolve_install_version(spec, &found.packument)?;
    let registry_url = found.endpoint.url.clone();
    let dir = root.profile_dir(spec);

    let state = probe(&dir)?;
    let decision = decide(&dir, &state, &version)?;
    utils::log(&format!(
        "{}@{} from {}: {}",
        spec.qualified_name(),
        version,
        registry_url,
        decision
    ));

    let mut report = InstallReport {
        package: spec.qualified_name(),
        version: version.clone(),
        registry_url: registry_url.clone(),
        path: dir.clone(),
        outcome: InstallOutcome::Installed,
        dependencies: Vec::new(),
        warnings: Vec::new(),
    };

    let mode = match decision {
        UpdateDecision::NoOp(NoOpReason::AlreadyAtVersion) => {
            report.outcome = InstallOutcome::AlreadyCurrent;
            return Ok(report);
        }
        UpdateDecision::NoOp(NoOpReason::AlreadyAtNewerVersion { installed }) => {
            report.outcome = InstallOutcome::AlreadyNewer { installed };
            return Ok(report);
        }
        UpdateDecision::Install => InstallMode::Fresh,
        UpdateDecision::Upgrade { from } => {
            report.outcome = InstallOutcome::Upgraded { from };
            InstallMode::Upgrade
        }
    };

    let bearer = found.bearer.as_deref();
    let archive = client.download_tarball(
        PackageKind::Profile,
        &spec.name,
        Some(&version),
        &registry_url,
        bearer,
    )?;
    install_archive(&archive, &dir, mode, &InstalledRecord::new(&version, &registry_url))?;

    let cascade = cascade_dependencies(client, &dir, &found.endpoint, bearer, root);
    report.dependencies = cascade.dependencies;
    report.warnings = cascade.warnings;
    Ok(report)
}
