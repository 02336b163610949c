//! Installation root layout. Always passed explicitly; core code never consults the
//! working directory.

use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILE;
use crate::package_spec::PackageSpec;

pub const PROFILES_DIR: &str = "profiles";
pub const SKILLS_DIR: &str = "skills";
/// Prefix for organization directories under `profiles/`. Package names can never
/// contain it, so an org tree never nests inside a public package.
pub const ORG_DIR_PREFIX: char = '@';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoot {
    path: PathBuf,
}

impl InstallRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Nearest ancestor of `start` (inclusive) that already looks like an install root,
    /// or `start` itself when none does.
    pub fn discover(start: &Path) -> Self {
        for dir in start.ancestors() {
            if dir.join(PROFILES_DIR).is_dir()
                || dir.join(SKILLS_DIR).is_dir()
                || dir.join(CONFIG_FILE).is_file()
            {
                return Self::new(dir);
            }
        }
        Self::new(start)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `profiles/<name>` for public packages, `profiles/@<org>/<name>` otherwise.
    pub fn profile_dir(&self, spec: &PackageSpec) -> PathBuf {
        let base = self.path.join(PROFILES_DIR);
        if spec.is_public() {
            base.join(&spec.name)
        } else {
            base.join(format!("{}{}", ORG_DIR_PREFIX, spec.namespace))
                .join(&spec.name)
        }
    }

    pub fn skill_dir(&self, name: &str) -> PathBuf {
        self.path.join(SKILLS_DIR).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_spec::parse;

    #[test]
    fn layout() {
        let root = InstallRoot::new("/home/u/.claude");
        assert_eq!(
            root.profile_dir(&parse("demo").unwrap()),
            PathBuf::from("/home/u/.claude/profiles/demo")
        );
        assert_eq!(
            root.profile_dir(&parse("acme/demo@1.0.0").unwrap()),
            PathBuf::from("/home/u/.claude/profiles/@acme/demo")
        );
        assert_eq!(root.skill_dir("kit"), PathBuf::from("/home/u/.claude/skills/kit"));
    }

    #[test]
    fn public_package_named_like_org_does_not_contain_org_packages() {
        let root = InstallRoot::new("/r");
        let public = root.profile_dir(&parse("acme").unwrap());
        let org = root.profile_dir(&parse("acme/demo").unwrap());
        assert!(!org.starts_with(&public));
    }

    #[test]
    fn discover_walks_up_to_existing_root() {
        let td = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("profiles")).unwrap();
        let nested = td.path().join("work/deep");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(InstallRoot::discover(&nested).path(), td.path());
    }
}
