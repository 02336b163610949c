//! `nori.json`: optional package manifest declaring skill dependencies.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use semver::VersionReq;
use serde::Deserialize;

use crate::error::{NoriError, Result};

pub const MANIFEST_FILE: &str = "nori.json";

/// A declared skill dependency. The range is validated but never used for
/// resolution: dependencies always install their `latest` dist-tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDependency {
    pub name: String,
    pub version_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    /// In file order.
    pub skills: Vec<SkillDependency>,
}

/// Dependency kinds other than `skills` are ignored.
#[derive(Deserialize)]
struct RawDependencies {
    #[serde(default)]
    skills: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct RawManifest {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: Option<RawDependencies>,
}

fn is_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'))
}

/// `>=v1.2.3` -> `>=1.2.3`.
fn strip_v(comparator: &str) -> String {
    let split = comparator.find(|c: char| !"<>=~^".contains(c)).unwrap_or(comparator.len());
    let (op, rest) = comparator.split_at(split);
    format!("{}{}", op, rest.strip_prefix('v').unwrap_or(rest))
}

/// One side of `||`: empty, `*`/`x`, a hyphen range, or whitespace-separated comparators.
fn is_valid_comparator_set(set: &str) -> bool {
    if set.is_empty() || set == "latest" || matches!(set, "*" | "x" | "X") {
        return true;
    }
    if let Some((low, high)) = set.split_once(" - ") {
        return [low, high]
            .iter()
            .all(|v| !v.trim().is_empty() && VersionReq::parse(&strip_v(v.trim())).is_ok());
    }
    let mut comparators = Vec::new();
    let mut operator: Option<&str> = None;
    for token in set.split_whitespace() {
        if is_operator(token) {
            if operator.replace(token).is_some() {
                return false;
            }
            continue;
        }
        comparators.push(strip_v(&format!("{}{}", operator.take().unwrap_or(""), token)));
    }
    operator.is_none() && VersionReq::parse(&comparators.join(", ")).is_ok()
}

/// npm range grammar: `||` alternatives of comparator sets, plus the `latest` tag.
fn is_valid_range(range: &str) -> bool {
    range.split("||").all(|set| is_valid_comparator_set(set.trim()))
}

impl PackageManifest {
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        let bad = |detail: String| NoriError::ManifestParse {
            path: path.to_path_buf(),
            detail,
        };
        let raw: RawManifest = serde_json::from_slice(bytes).map_err(|e| bad(e.to_string()))?;

        let mut skills = Vec::new();
        if let Some(map) = raw.dependencies.and_then(|d| d.skills) {
            for (name, value) in map {
                let range = value
                    .as_str()
                    .ok_or_else(|| bad(format!("range for skill '{}' must be a string", name)))?;
                if !is_valid_range(range) {
                    return Err(bad(format!("invalid version range '{}' for skill '{}'", range, name)));
                }
                skills.push(SkillDependency {
                    name,
                    version_range: range.to_string(),
                });
            }
        }

        Ok(PackageManifest {
            name: raw.name,
            version: raw.version,
            skills,
        })
    }

    /// `Ok(None)` when `dir` has no manifest.
    pub fn try_read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        match fs::read(&path) {
            Ok(bytes) => Self::parse(&bytes, &path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
