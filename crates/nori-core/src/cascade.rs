//! Install the skills a freshly installed package declares in its `nori.json`.
//!
//! Declared version ranges are ignored on purpose: every dependency targets its
//! `latest` dist-tag on the registry that served the parent. Dependencies are
//! processed one at a time in manifest order, and a failing dependency becomes a
//! warning instead of failing the parent install.

use std::collections::HashSet;
use std::path::Path;

use crate::decision::{decide, NoOpReason, UpdateDecision};
use crate::error::{NoriError, Result};
use crate::installed::{probe, InstalledRecord};
use crate::installer::{install_archive, InstallMode};
use crate::manifest::{PackageManifest, SkillDependency};
use crate::package_spec::is_valid_identifier;
use crate::registry::{PackageKind, RegistryClient, RegistryEndpoint};
use crate::root::InstallRoot;
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyOutcome {
    Installed { version: String },
    Upgraded { from: String, to: String },
    AlreadyCurrent { version: String },
    AlreadyNewer { installed: String, latest: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyReport {
    pub name: String,
    pub outcome: DependencyOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub dependencies: Vec<DependencyReport>,
    /// Non-fatal problems, surfaced after the parent is reported installed.
    pub warnings: Vec<String>,
}

struct Cascader<'a> {
    client: &'a dyn RegistryClient,
    endpoint: &'a RegistryEndpoint,
    bearer: Option<&'a str>,
    root: &'a InstallRoot,
    visited: HashSet<String>,
    report: CascadeReport,
}

/// Install every skill declared by the package at `package_dir`, recursing into the
/// manifests of skills that were installed or upgraded. Each skill is visited once.
pub fn cascade_dependencies(
    client: &dyn RegistryClient,
    package_dir: &Path,
    endpoint: &RegistryEndpoint,
    bearer: Option<&str>,
    root: &InstallRoot,
) -> CascadeReport {
    let mut cascader = Cascader {
        client,
        endpoint,
        bearer,
        root,
        visited: HashSet::new(),
        report: CascadeReport::default(),
    };
    cascader.cascade_from(package_dir);
    cascader.report
}

impl Cascader<'_> {
    fn cascade_from(&mut self, dir: &Path) {
        let manifest = match PackageManifest::try_read(dir) {
            Ok(Some(m)) => m,
            Ok(None) => return,
            Err(e) => {
                utils::log(&format!("Skipping dependencies of {}: {}", dir.display(), e));
                return;
            }
        };

        for dep in &manifest.skills {
            if !self.visited.insert(dep.name.clone()) {
                continue;
            }
            match self.install_skill(dep) {
                Ok(outcome) => {
                    let landed = matches!(
                        outcome,
                        DependencyOutcome::Installed { .. } | DependencyOutcome::Upgraded { .. }
                    );
                    self.report.dependencies.push(DependencyReport {
                        name: dep.name.clone(),
                        outcome,
                    });
                    if landed {
                        let skill_dir = self.root.skill_dir(&dep.name);
                        self.cascade_from(&skill_dir);
                    }
                }
                Err(e) => {
                    let warning = format!("skill '{}' was not installed: {}", dep.name, e);
                    utils::log_warning(&warning);
                    self.report.warnings.push(warning);
                }
            }
        }
    }

    fn install_skill(&self, dep: &SkillDependency) -> Result<DependencyOutcome> {
        if !is_valid_identifier(&dep.name) {
            return Err(NoriError::InvalidSpec {
                input: dep.name.clone(),
                reason: "skill names must match [a-z0-9]+(-[a-z0-9]+)*".to_string(),
            });
        }
        utils::log(&format!(
            "Resolving skill {} (declared {}, installing latest)",
            dep.name, dep.version_range
        ));

        let url = self.endpoint.url.as_str();
        let packument = self
            .client
            .get_packument(PackageKind::Skill, &dep.name, url, self.bearer)?;
        let latest = packument
            .latest()
            .map(String::from)
            .ok_or_else(|| NoriError::NotFound {
                package: format!("{}@latest", dep.name),
                registry: Some(url.to_string()),
            })?;

        let dir = self.root.skill_dir(&dep.name);
        let state = probe(&dir)?;
        let decision = decide(&dir, &state, &latest)?;
        utils::log(&format!("Skill {}@{}: {}", dep.name, latest, decision));

        let (mode, outcome) = match decision {
            UpdateDecision::NoOp(NoOpReason::AlreadyAtVersion) => {
                return Ok(DependencyOutcome::AlreadyCurrent { version: latest })
            }
            UpdateDecision::NoOp(NoOpReason::AlreadyAtNewerVersion { installed }) => {
                return Ok(DependencyOutcome::AlreadyNewer { installed, latest })
            }
            UpdateDecision::Install => (
                InstallMode::Fresh,
                DependencyOutcome::Installed {
                    version: latest.clone(),
                },
            ),
            UpdateDecision::Upgrade { from } => (
                InstallMode::Upgrade,
                DependencyOutcome::Upgraded {
                    from,
                    to: latest.clone(),
                },
            ),
        };

        let archive = self.client.download_tarball(
            PackageKind::Skill,
            &dep.name,
            Some(&latest),
            url,
            self.bearer,
        )?;
        install_archive(&archive, &dir, mode, &InstalledRecord::new(&latest, url))?;
        Ok(outcome)
    }
}
