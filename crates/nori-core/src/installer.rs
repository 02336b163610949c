//! All-or-nothing placement of an archive into an install directory.
//!
//! Fresh installs extract straight into the destination and remove it on failure.
//! Upgrades extract into a sibling staging directory and only touch the destination
//! once the whole archive has landed there. The sidecar is always written last.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::archive::extract_archive;
use crate::error::{NoriError, Result};
use crate::installed::{InstalledRecord, SIDECAR_FILE, SWAP_MARKER_FILE};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Destination does not exist yet.
    Fresh,
    /// Destination holds a previous version with a sidecar.
    Upgrade,
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

fn staging_dir_for(dest: &Path) -> Result<PathBuf> {
    let parent = dest
        .parent()
        .ok_or_else(|| NoriError::extraction(dest, "install directory has no parent"))?;
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(parent.join(format!(".{}.staging-{}-{}", name, std::process::id(), n)))
}

/// Remove a staging directory, warning instead of failing when it cannot be removed.
fn discard_staging(staging: &Path) {
    if !staging.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(staging) {
        utils::log_warning(&format!(
            "could not remove staging directory {}: {}",
            staging.display(),
            e
        ));
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Place `archive` at `dest` and record `record` in its sidecar.
pub fn install_archive(
    archive: &[u8],
    dest: &Path,
    mode: InstallMode,
    record: &InstalledRecord,
) -> Result<InstalledRecord> {
    match mode {
        InstallMode::Fresh => install_fresh(archive, dest, record),
        InstallMode::Upgrade => install_upgrade(archive, dest, record),
    }
}

fn install_fresh(archive: &[u8], dest: &Path, record: &InstalledRecord) -> Result<InstalledRecord> {
    fs::create_dir_all(dest)?;
    let landed = extract_archive(archive, dest).and_then(|n| {
        record.write(dest)?;
        Ok(n)
    });
    match landed {
        Ok(n) => {
            utils::log(&format!("Extracted {} entries into {}", n, dest.display()));
            Ok(record.clone())
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(dest) {
                utils::log_warning(&format!(
                    "could not remove {} after failed install: {}",
                    dest.display(),
                    cleanup
                ));
            }
            Err(e)
        }
    }
}

fn install_upgrade(archive: &[u8], dest: &Path, record: &InstalledRecord) -> Result<InstalledRecord> {
    let staging = staging_dir_for(dest)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let staged = extract_archive(archive, &staging);
    let n = match staged {
        Ok(n) => n,
        Err(e) => {
            discard_staging(&staging);
            return Err(e);
        }
    };
    utils::log(&format!("Staged {} entries in {}", n, staging.display()));

    let swapped = swap_into(&staging, dest, record);
    discard_staging(&staging);
    swapped?;
    Ok(record.clone())
}

/// Replace everything in `dest` except the sidecar with the contents of `staging`.
/// The swap marker brackets the window in which `dest` may be missing content.
fn swap_into(staging: &Path, dest: &Path, record: &InstalledRecord) -> Result<()> {
    let marker = dest.join(SWAP_MARKER_FILE);
    fs::write(&marker, b"")?;

    for entry in fs::read_dir(dest)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == SIDECAR_FILE || name == SWAP_MARKER_FILE {
            continue;
        }
        remove_entry(&entry.path())?;
    }
    utils::log(&format!("Removed previous content of {}", dest.display()));

    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        fs::rename(entry.path(), dest.join(entry.file_name()))?;
    }
    fs::remove_dir(staging)?;

    record.write(dest)?;
    fs::remove_file(&marker)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{gzip, tar_of};
    use crate::installed::{probe, InstalledState};
    use std::collections::BTreeMap;

    /// Every file under `dir` (relative path -> bytes).
    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    out.insert(path.strip_prefix(root).unwrap().to_path_buf(), fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(dir, dir, &mut out);
        out
    }

    /// A tar whose second member is cut short, so extraction fails after the first file lands.
    fn truncated_tar() -> Vec<u8> {
        let big = vec![b'x'; 4096];
        let mut tar = tar_of(&[("first.txt", b"first"), ("second.bin", &big)]);
        tar.truncate(512 + 512 + 512 + 100);
        tar
    }

    fn siblings(dir: &Path) -> Vec<String> {
        fs::read_dir(dir.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn fresh_install_writes_content_then_sidecar() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("profiles/demo");
        let record = InstalledRecord::new("1.0.0", "https://public");
        let archive = gzip(&tar_of(&[("CLAUDE.md", b"v1")]));

        install_archive(&archive, &dest, InstallMode::Fresh, &record).unwrap();

        assert_eq!(fs::read(dest.join("CLAUDE.md")).unwrap(), b"v1");
        assert_eq!(probe(&dest).unwrap(), InstalledState::Installed(record));
    }

    #[test]
    fn failed_fresh_install_leaves_no_trace() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("profiles/demo");
        let record = InstalledRecord::new("1.0.0", "https://public");

        for bad in [truncated_tar(), vec![0x1f, 0x8b, 0x00, 0x01]] {
            let err = install_archive(&bad, &dest, InstallMode::Fresh, &record).unwrap_err();
            assert!(matches!(err, NoriError::Extraction { .. }));
            assert!(!dest.exists());
        }
    }

    #[test]
    fn upgrade_replaces_content_and_keeps_no_stale_files() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("demo");
        let v1 = InstalledRecord::new("1.0.0", "https://public");
        install_archive(
            &tar_of(&[("CLAUDE.md", b"v1"), ("old-only.md", b"old")]),
            &dest,
            InstallMode::Fresh,
            &v1,
        )
        .unwrap();

        let v2 = InstalledRecord::new("2.0.0", "https://public");
        install_archive(&gzip(&tar_of(&[("CLAUDE.md", b"v2")])), &dest, InstallMode::Upgrade, &v2).unwrap();

        assert_eq!(fs::read(dest.join("CLAUDE.md")).unwrap(), b"v2");
        assert!(!dest.join("old-only.md").exists());
        assert!(!dest.join(SWAP_MARKER_FILE).exists());
        assert_eq!(InstalledRecord::try_read(&dest).unwrap(), Some(v2));
        assert_eq!(siblings(&dest), vec!["demo".to_string()]);
    }

    #[test]
    fn discard_staging_tolerates_missing_and_removes_leftovers() {
        let td = tempfile::tempdir().unwrap();
        let staging = td.path().join(".demo.staging-1-0");
        discard_staging(&staging);
        fs::create_dir_all(staging.join("nested")).unwrap();
        fs::write(staging.join("nested/file"), b"x").unwrap();
        discard_staging(&staging);
        assert!(!staging.exists());
    }

    #[test]
    fn failed_upgrade_leaves_previous_install_byte_identical() {
        let td = tempfile::tempdir().unwrap();
        let dest = td.path().join("demo");
        let v1 = InstalledRecord::new("1.0.0", "https://public");
        install_archive(
            &tar_of(&[("CLAUDE.md", b"v1"), ("skills/a/SKILL.md", b"a")]),
            &dest,
            InstallMode::Fresh,
            &v1,
        )
        .unwrap();
        let before = snapshot(&dest);

        let v2 = InstalledRecord::new("2.0.0", "https://public");
        let err = install_archive(&truncated_tar(), &dest, InstallMode::Upgrade, &v2).unwrap_err();
        assert!(matches!(err, NoriError::Extraction { .. }));

        assert_eq!(snapshot(&dest), before);
        assert_eq!(siblings(&dest), vec!["demo".to_string()]);
    }
}
