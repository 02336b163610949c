//! Pack a local profile directory and upload it as a new version.

use std::path::Path;

use serde::Serialize;

use crate::archive::pack_directory;
use crate::error::{NoriError, Result};
use crate::package_spec::is_valid_identifier;
use crate::registry::{PackageKind, RegistryClient, RegistryEndpoint};
use crate::utils;
use crate::version::resolve_publish_version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub name: String,
    pub version: String,
    pub registry_url: String,
}

/// Upload `dir` as `name` to `endpoint`. Without `explicit_version` the registry's
/// `latest` is patch-bumped (or 1.0.0 for a new package). Nothing is uploaded unless
/// every earlier step succeeded.
pub fn publish_profile(
    client: &dyn RegistryClient,
    dir: &Path,
    name: &str,
    explicit_version: Option<&str>,
    endpoint: &RegistryEndpoint,
) -> Result<PublishReport> {
    if !is_valid_identifier(name) {
        return Err(NoriError::InvalidSpec {
            input: name.to_string(),
            reason: "package names must match [a-z0-9]+(-[a-z0-9]+)*".to_string(),
        });
    }
    if !dir.is_dir() {
        return Err(NoriError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }

    let token = client.exchange_token(endpoint)?;
    let existing = match client.get_packument(PackageKind::Profile, name, &endpoint.url, Some(&token)) {
        Ok(p) => Some(p),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    let version = resolve_publish_version(explicit_version, existing.as_ref())?;

    let archive = pack_directory(dir)?;
    utils::log(&format!(
        "Uploading {}@{} ({} bytes) to {}",
        name,
        version,
        archive.len(),
        endpoint.url
    ));
    let receipt = client.upload_profile(name, &version, &archive, &endpoint.url, &token)?;

    Ok(PublishReport {
        name: name.to_string(),
        version: receipt.version,
        registry_url: endpoint.url.clone(),
    })
}
