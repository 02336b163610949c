//! Tarball handling: detect compression, extract safely, and pack a directory for upload.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, EntryType};

use crate::error::{NoriError, Result};
use crate::installed::{SIDECAR_FILE, SWAP_MARKER_FILE};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// npm-style tarballs wrap everything in one `package/` directory.
const NPM_PREFIX: &str = "package";

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Decompress-then-untar when the gzip magic is present; plain tar otherwise.
fn archive_reader(bytes: &[u8]) -> Box<dyn Read + '_> {
    if is_gzip(bytes) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    }
}

fn is_reserved(rel: &Path) -> bool {
    rel == Path::new(SIDECAR_FILE) || rel == Path::new(SWAP_MARKER_FILE)
}

/// Path of an entry relative to the destination, with the `package/` wrapper removed.
/// `Ok(None)` for the wrapper itself; absolute paths and `..` are rejected.
fn entry_relative_path(raw: &Path, dest: &Path) -> Result<Option<PathBuf>> {
    let mut rel = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            _ => {
                return Err(NoriError::extraction(
                    dest,
                    format!("entry '{}' escapes the install directory", raw.display()),
                ))
            }
        }
    }
    let rel = match rel.strip_prefix(NPM_PREFIX) {
        Ok(stripped) => stripped.to_path_buf(),
        Err(_) => rel,
    };
    Ok((!rel.as_os_str().is_empty()).then_some(rel))
}

/// Resolve `path` through the part of it that exists on disk and apply the rest
/// lexically. `None` for a dangling link, or a `..` after a missing component, since
/// neither can be placed until later entries exist.
fn resolve_existing(path: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut missing = false;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if missing {
                    return None;
                }
                resolved.pop();
            }
            other => {
                resolved.push(other);
                if missing {
                    continue;
                }
                match resolved.canonicalize() {
                    Ok(real) => resolved = real,
                    Err(_) if fs::symlink_metadata(&resolved).is_ok() => return None,
                    Err(_) => missing = true,
                }
            }
        }
    }
    Some(resolved)
}

fn stays_inside(root: &Path, path: &Path) -> bool {
    resolve_existing(path).is_some_and(|p| p.starts_with(root))
}

/// Clear a file or link left at `path` by an earlier entry so unpacking never writes through it.
fn clear_non_directory(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path),
        _ => Ok(()),
    }
}

/// Extract `bytes` (tar or gzip+tar) into existing directory `dest`.
/// Returns the number of entries written; an archive with none is an error.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(archive_reader(bytes));
    let mut extracted = 0usize;
    let root = dest
        .canonicalize()
        .map_err(|e| NoriError::extraction(dest, e))?;
    let escapes = |raw: &Path, what: &str| {
        NoriError::extraction(
            dest,
            format!("{} '{}' resolves outside the install directory", what, raw.display()),
        )
    };

    let entries = archive
        .entries()
        .map_err(|e| NoriError::extraction(dest, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| NoriError::extraction(dest, e))?;
        let raw = entry
            .path()
            .map_err(|e| NoriError::extraction(dest, e))?
            .into_owned();
        let Some(rel) = entry_relative_path(&raw, dest)? else {
            continue;
        };
        if is_reserved(&rel) {
            continue;
        }
        let out_path = dest.join(&rel);
        let parent = out_path.parent().unwrap_or(dest);
        if !stays_inside(&root, parent) {
            return Err(escapes(&raw, "entry"));
        }

        match entry.header().entry_type() {
            EntryType::Directory => {
                if !stays_inside(&root, &out_path) {
                    return Err(escapes(&raw, "directory"));
                }
                fs::create_dir_all(&out_path).map_err(|e| NoriError::extraction(dest, e))?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                fs::create_dir_all(parent).map_err(|e| NoriError::extraction(dest, e))?;
                clear_non_directory(&out_path).map_err(|e| NoriError::extraction(dest, e))?;
                entry
                    .unpack(&out_path)
                    .map_err(|e| NoriError::extraction(dest, e))?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| NoriError::extraction(dest, e))?
                    .map(|t| t.into_owned())
                    .unwrap_or_default();
                fs::create_dir_all(parent).map_err(|e| NoriError::extraction(dest, e))?;
                if target.as_os_str().is_empty()
                    || target.is_absolute()
                    || !stays_inside(&root, &parent.join(&target))
                {
                    return Err(escapes(&raw, "symlink"));
                }
                clear_non_directory(&out_path).map_err(|e| NoriError::extraction(dest, e))?;
                entry
                    .unpack(&out_path)
                    .map_err(|e| NoriError::extraction(dest, e))?;
            }
            EntryType::Link => {
                return Err(NoriError::extraction(
                    dest,
                    format!("hard link '{}' is not supported", raw.display()),
                ));
            }
            _ => continue,
        }
        extracted += 1;
    }

    if extracted == 0 {
        return Err(NoriError::extraction(dest, "archive contains no entries"));
    }
    Ok(extracted)
}

fn append_tree<W: std::io::Write>(
    builder: &mut Builder<W>,
    root: &Path,
    dir: &Path,
) -> Result<usize> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    let mut count = 0;
    for entry in entries {
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        if is_reserved(&rel) || entry.file_name() == ".git" {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            builder.append_dir(&rel, &path)?;
            count += 1 + append_tree(builder, root, &path)?;
        } else {
            builder.append_path_with_name(&path, &rel)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Pack `dir` as gzip+tar with paths relative to `dir`. The sidecar and `.git` are left out.
pub fn pack_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder.follow_symlinks(false);
    let count = append_tree(&mut builder, dir, dir)?;
    if count == 0 {
        return Err(NoriError::extraction(dir, "nothing to pack"));
    }
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}
