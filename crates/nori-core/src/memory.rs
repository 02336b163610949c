//! In-process registry backend for development, offline use, and testing.
//!
//! Holds packuments and archives per registry URL. Failure modes (token exchange,
//! whole-registry outages) can be switched on per registry, and every packument
//! request and download is counted so callers can assert what was queried.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::error::{NoriError, Result};
use crate::registry::{
    PackageKind, PackageSummary, Packument, RegistryClient, RegistryEndpoint, UploadReceipt,
};
use crate::utils::normalize_url;

type PackageKey = (String, PackageKind, String);

#[derive(Default)]
struct State {
    packuments: HashMap<PackageKey, Packument>,
    tarballs: HashMap<(String, PackageKind, String, String), Vec<u8>>,
    failing_tokens: HashSet<String>,
    failing_registries: HashSet<String>,
    packument_requests: HashMap<String, usize>,
    downloads: Vec<(String, PackageKind, String, String)>,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: RefCell<State>,
}

fn key(url: &str, kind: PackageKind, name: &str) -> PackageKey {
    (normalize_url(url), kind, name.to_string())
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the packument for `packument.name` on `registry_url`.
    pub fn add_packument(&self, registry_url: &str, kind: PackageKind, packument: Packument) {
        self.state
            .borrow_mut()
            .packuments
            .insert(key(registry_url, kind, &packument.name), packument);
    }

    /// Publish `version` with its archive; `latest` moves to it.
    pub fn add_package(
        &self,
        registry_url: &str,
        kind: PackageKind,
        name: &str,
        version: &str,
        archive: Vec<u8>,
    ) {
        let mut state = self.state.borrow_mut();
        let packument = state
            .packuments
            .entry(key(registry_url, kind, name))
            .or_insert_with(|| Packument::new(name));
        packument.add_version(
            version,
            serde_json::json!({ "name": name, "version": version }),
            None,
        );
        state.tarballs.insert(
            (normalize_url(registry_url), kind, name.to_string(), version.to_string()),
            archive,
        );
    }

    /// Token exchange against `registry_url` will fail.
    pub fn fail_token_exchange(&self, registry_url: &str) {
        self.state
            .borrow_mut()
            .failing_tokens
            .insert(normalize_url(registry_url));
    }

    /// Every request to `registry_url` will fail with a network error.
    pub fn fail_requests(&self, registry_url: &str) {
        self.state
            .borrow_mut()
            .failing_registries
            .insert(normalize_url(registry_url));
    }

    pub fn packument(&self, registry_url: &str, kind: PackageKind, name: &str) -> Option<Packument> {
        self.state
            .borrow()
            .packuments
            .get(&key(registry_url, kind, name))
            .cloned()
    }

    pub fn packument_requests(&self, registry_url: &str) -> usize {
        self.state
            .borrow()
            .packument_requests
            .get(&normalize_url(registry_url))
            .copied()
            .unwrap_or(0)
    }

    /// `(registry, kind, name, version)` of every archive served, in order.
    pub fn downloads(&self) -> Vec<(String, PackageKind, String, String)> {
        self.state.borrow().downloads.clone()
    }

    fn check_reachable(&self, registry_url: &str, what: &str) -> Result<()> {
        let url = normalize_url(registry_url);
        if self.state.borrow().failing_registries.contains(&url) {
            return Err(NoriError::Network {
                url: format!("{}/{}", url, what),
                status: None,
                detail: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl RegistryClient for MemoryRegistry {
    fn exchange_token(&self, endpoint: &RegistryEndpoint) -> Result<String> {
        if self
            .state
            .borrow()
            .failing_tokens
            .contains(&normalize_url(&endpoint.url))
        {
            return Err(NoriError::Network {
                url: endpoint.url.clone(),
                status: Some(401),
                detail: "token exchange rejected".to_string(),
            });
        }
        endpoint
            .auth_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NoriError::AuthRequired {
                registry_url: endpoint.url.clone(),
            })
    }

    fn get_packument(
        &self,
        kind: PackageKind,
        name: &str,
        registry_url: &str,
        _token: Option<&str>,
    ) -> Result<Packument> {
        *self
            .state
            .borrow_mut()
            .packument_requests
            .entry(normalize_url(registry_url))
            .or_insert(0) += 1;
        self.check_reachable(registry_url, name)?;
        self.packument(registry_url, kind, name)
            .ok_or_else(|| NoriError::NotFound {
                package: name.to_string(),
                registry: Some(normalize_url(registry_url)),
            })
    }

    fn download_tarball(
        &self,
        kind: PackageKind,
        name: &str,
        version: Option<&str>,
        registry_url: &str,
        _token: Option<&str>,
    ) -> Result<Vec<u8>> {
        self.check_reachable(registry_url, name)?;
        let url = normalize_url(registry_url);
        let version = match version {
            Some(v) => v.to_string(),
            None => self
                .packument(&url, kind, name)
                .and_then(|p| p.latest().map(String::from))
                .ok_or_else(|| NoriError::NotFound {
                    package: name.to_string(),
                    registry: Some(url.clone()),
                })?,
        };
        let mut state = self.state.borrow_mut();
        let archive = state
            .tarballs
            .get(&(url.clone(), kind, name.to_string(), version.clone()))
            .cloned()
            .ok_or_else(|| NoriError::NotFound {
                package: format!("{}@{}", name, version),
                registry: Some(url.clone()),
            })?;
        state.downloads.push((url, kind, name.to_string(), version));
        Ok(archive)
    }

    fn upload_profile(
        &self,
        name: &str,
        version: &str,
        archive: &[u8],
        registry_url: &str,
        token: &str,
    ) -> Result<UploadReceipt> {
        self.check_reachable(registry_url, name)?;
        if token.is_empty() {
            return Err(NoriError::AuthRequired {
                registry_url: normalize_url(registry_url),
            });
        }
        let url = normalize_url(registry_url);
        let already = self
            .packument(&url, PackageKind::Profile, name)
            .map(|p| p.versions.contains_key(version))
            .unwrap_or(false);
        if already {
            return Err(NoriError::Upload {
                package: name.to_string(),
                version: version.to_string(),
                detail: "version already published".to_string(),
            });
        }
        self.add_package(&url, PackageKind::Profile, name, version, archive.to_vec());
        Ok(UploadReceipt {
            version: version.to_string(),
        })
    }

    fn search_packages(
        &self,
        query: &str,
        registry_url: &str,
        _token: Option<&str>,
    ) -> Result<Vec<PackageSummary>> {
        self.check_reachable(registry_url, "search")?;
        let url = normalize_url(registry_url);
        let state = self.state.borrow();
        let mut hits: Vec<PackageSummary> = state
            .packuments
            .iter()
            .filter(|((u, kind, name), _)| {
                *u == url && *kind == PackageKind::Profile && name.contains(query)
            })
            .map(|(_, p)| PackageSummary {
                name: p.name.clone(),
                description: p.description.clone(),
                author_email: None,
                created_at: p.time.get("created").cloned(),
                updated_at: p.time.get("modified").cloned(),
            })
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hits)
    }
}
