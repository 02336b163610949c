//! Turn "latest", explicit and dist-tag intents into concrete version strings.

use std::cmp::Ordering;

use semver::Version;

use crate::error::{NoriError, Result};
use crate::package_spec::PackageSpec;
use crate::registry::Packument;

pub const LATEST_TAG: &str = "latest";
pub const INITIAL_PUBLISH_VERSION: &str = "1.0.0";

/// Version to install for `spec` given the registry's packument.
///
/// Explicit versions are returned verbatim without checking `packument.versions`; a
/// nonexistent version surfaces later as a download failure. A dist-tag name
/// (e.g. `beta`) resolves through the packument's tags.
pub fn resolve_install_version(spec: &PackageSpec, packument: &Packument) -> Result<String> {
    if let Some(requested) = &spec.version {
        if Version::parse(requested).is_err() {
            if let Some(tagged) = packument.dist_tags.get(requested) {
                return Ok(tagged.clone());
            }
        }
        return Ok(requested.clone());
    }
    packument
        .latest()
        .map(String::from)
        .ok_or_else(|| NoriError::NotFound {
            package: format!("{}@{}", spec.qualified_name(), LATEST_TAG),
            registry: None,
        })
}

/// Version for a new upload: explicit wins; otherwise patch-bump the current
/// `latest`, or start at 1.0.0 for a new package or an unparseable tag. A patch
/// component that cannot be incremented is an error, never a wrap-around.
pub fn resolve_publish_version(explicit: Option<&str>, packument: Option<&Packument>) -> Result<String> {
    if let Some(v) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(v.to_string());
    }
    let Some((packument, latest)) = packument.and_then(|p| {
        p.latest()
            .and_then(|l| Version::parse(l).ok())
            .map(|v| (p, v))
    }) else {
        return Ok(INITIAL_PUBLISH_VERSION.to_string());
    };
    match latest.patch.checked_add(1) {
        Some(patch) => Ok(Version::new(latest.major, latest.minor, patch).to_string()),
        None => Err(NoriError::Upload {
            package: packument.name.clone(),
            version: latest.to_string(),
            detail: "patch version cannot be incremented; publish with an explicit version".to_string(),
        }),
    }
}

/// How a remote version relates to an installed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Newer,
    Same,
    Older,
    /// At least one side is not semver and the strings differ.
    Incomparable,
}

/// Semver ordering when both sides parse; exact string equality otherwise.
pub fn compare_versions(remote: &str, installed: &str) -> VersionRelation {
    match (Version::parse(remote.trim()), Version::parse(installed.trim())) {
        (Ok(r), Ok(i)) => match r.cmp(&i) {
            Ordering::Greater => VersionRelation::Newer,
            Ordering::Equal => VersionRelation::Same,
            Ordering::Less => VersionRelation::Older,
        },
        _ if remote.trim() == installed.trim() => VersionRelation::Same,
        _ => VersionRelation::Incomparable,
    }
}

/// Newest first by semver; non-semver strings after, in reverse lexical order.
pub fn sort_versions_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => b.cmp(a),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_spec::parse;

    fn packument_with_latest(latest: &str) -> Packument {
        let mut p = Packument::new("demo");
        p.dist_tags.insert("latest".to_string(), latest.to_string());
        p
    }

    #[test]
    fn install_version_explicit_is_verbatim() {
        let p = packument_with_latest("1.0.0");
        let spec = parse("demo@9.9.9").unwrap();
        assert_eq!(resolve_install_version(&spec, &p).unwrap(), "9.9.9");
    }

    #[test]
    fn install_version_defaults_to_latest_tag() {
        let p = packument_with_latest("1.4.2");
        let spec = parse("demo").unwrap();
        assert_eq!(resolve_install_version(&spec, &p).unwrap(), "1.4.2");
    }

    #[test]
    fn install_version_follows_named_dist_tag() {
        let mut p = packument_with_latest("1.4.2");
        p.dist_tags.insert("next".to_string(), "1.5.0-next.3".to_string());
        let spec = parse("demo@next").unwrap();
        assert_eq!(resolve_install_version(&spec, &p).unwrap(), "1.5.0-next.3");
    }

    #[test]
    fn install_version_without_latest_tag_is_not_found() {
        let p = Packument::new("demo");
        let spec = parse("demo").unwrap();
        assert!(resolve_install_version(&spec, &p).unwrap_err().is_not_found());
    }

    fn bump(latest: Option<&str>) -> String {
        let p = latest.map(packument_with_latest);
        resolve_publish_version(None, p.as_ref()).unwrap()
    }

    #[test]
    fn publish_version_bumps_patch_only() {
        assert_eq!(bump(Some("1.2.3")), "1.2.4");
        assert_eq!(bump(Some("2.9.9")), "2.9.10");
        assert_eq!(bump(Some("0.1.0-next.2")), "0.1.1");
    }

    #[test]
    fn publish_version_fallbacks() {
        assert_eq!(bump(None), "1.0.0");
        assert_eq!(bump(Some("banana")), "1.0.0");
        assert_eq!(resolve_publish_version(None, Some(&Packument::new("demo"))).unwrap(), "1.0.0");
        assert_eq!(
            resolve_publish_version(Some("3.0.0"), Some(&packument_with_latest("1.2.3"))).unwrap(),
            "3.0.0"
        );
    }

    #[test]
    fn publish_version_patch_overflow_is_an_error() {
        let latest = format!("1.2.{}", u64::MAX);
        let err = resolve_publish_version(None, Some(&packument_with_latest(&latest))).unwrap_err();
        assert!(matches!(err, NoriError::Upload { .. }), "got {err}");
        assert_eq!(
            resolve_publish_version(Some("1.3.0"), Some(&packument_with_latest(&latest))).unwrap(),
            "1.3.0"
        );
    }

    #[test]
    fn compare_semver_and_fallback() {
        assert_eq!(compare_versions("1.1.0", "1.0.0"), VersionRelation::Newer);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), VersionRelation::Same);
        assert_eq!(compare_versions("1.0.0", "1.1.0"), VersionRelation::Older);
        assert_eq!(compare_versions("1.10.0", "1.9.0"), VersionRelation::Newer);
        assert_eq!(compare_versions("nightly", "nightly"), VersionRelation::Same);
        assert_eq!(compare_versions("nightly", "1.0.0"), VersionRelation::Incomparable);
    }

    #[test]
    fn sort_puts_newest_semver_first() {
        let mut v = vec![
            "1.0.0".to_string(),
            "legacy".to_string(),
            "1.10.0".to_string(),
            "1.2.0".to_string(),
        ];
        sort_versions_desc(&mut v);
        assert_eq!(v, vec!["1.10.0", "1.2.0", "1.0.0", "legacy"]);
    }
}
