//! Registry metadata types, the client seam, and multi-registry resolution.
//!
//! Resolution queries the public registry anonymously, then every configured
//! private registry with its credentials. Per-registry failures during a
//! multi-registry search are logged and dropped; only the aggregate decides
//! between "not found", "exactly one" and "ambiguous".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NoriError, RegistryCandidate, Result};
use crate::package_spec::PackageSpec;
use crate::utils::{self, normalize_url, same_url};
use crate::version::{sort_versions_desc, LATEST_TAG};

pub const DEFAULT_PUBLIC_REGISTRY: &str = "https://noriskillsets.dev";

/// A registry URL plus the opaque credential configured for it (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    #[serde(rename = "registryUrl")]
    pub url: String,
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl RegistryEndpoint {
    pub fn new(url: &str, auth_token: Option<&str>) -> Self {
        Self {
            url: normalize_url(url),
            auth_token: auth_token.map(String::from),
        }
    }

    pub fn public(url: &str) -> Self {
        Self::new(url, None)
    }
}

/// Which artifact namespace on the registry: top-level profiles or dependency skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    Profile,
    Skill,
}

impl PackageKind {
    /// Path segment under `/api/`.
    pub fn segment(self) -> &'static str {
        match self {
            PackageKind::Profile => "packages",
            PackageKind::Skill => "skills",
        }
    }
}

/// A registry's metadata document for one package name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, serde_json::Value>,
    /// Publish timestamps keyed by version (plus `created`/`modified` bookkeeping keys).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub time: BTreeMap<String, String>,
}

impl Packument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get(LATEST_TAG).map(String::as_str)
    }

    /// Publish timestamp for a known version; bookkeeping keys are never returned.
    pub fn published_at(&self, version: &str) -> Option<&str> {
        if !self.versions.contains_key(version) {
            return None;
        }
        self.time.get(version).map(String::as_str)
    }

    /// Record a newly published version and move `latest` to it.
    pub fn add_version(&mut self, version: &str, manifest: serde_json::Value, published_at: Option<&str>) {
        self.versions.insert(version.to_string(), manifest);
        self.dist_tags
            .insert(LATEST_TAG.to_string(), version.to_string());
        if let Some(ts) = published_at {
            self.time.insert(version.to_string(), ts.to_string());
        }
    }
}

/// Search hit returned by a registry's package search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub version: String,
}

/// Registry HTTP operations consumed by the installer.
///
/// `token` is the bearer obtained from [`RegistryClient::exchange_token`]; `None` means
/// an anonymous request.
pub trait RegistryClient {
    /// Exchange configured credentials for a bearer token. The configured credential is
    /// already an opaque token, so the default just validates its presence.
    fn exchange_token(&self, endpoint: &RegistryEndpoint) -> Result<String> {
        endpoint
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .ok_or_else(|| NoriError::AuthRequired {
                registry_url: endpoint.url.clone(),
            })
    }

    fn get_packument(
        &self,
        kind: PackageKind,
        name: &str,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Packument>;

    /// Archive bytes (tar or gzip+tar). `version: None` downloads `latest`.
    fn download_tarball(
        &self,
        kind: PackageKind,
        name: &str,
        version: Option<&str>,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>>;

    fn upload_profile(
        &self,
        name: &str,
        version: &str,
        archive: &[u8],
        registry_url: &str,
        token: &str,
    ) -> Result<UploadReceipt>;

    fn search_packages(
        &self,
        query: &str,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Vec<PackageSummary>>;
}

/// The public endpoint plus every configured private endpoint and its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registries {
    pub public_url: String,
    pub configured: Vec<RegistryEndpoint>,
}

impl Default for Registries {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_REGISTRY)
    }
}

impl Registries {
    pub fn new(public_url: &str) -> Self {
        Self {
            public_url: normalize_url(public_url),
            configured: Vec::new(),
        }
    }

    pub fn with_registry(mut self, url: &str, auth_token: Option<&str>) -> Self {
        self.configured.push(RegistryEndpoint::new(url, auth_token));
        self
    }

    pub fn is_public(&self, url: &str) -> bool {
        same_url(url, &self.public_url)
    }

    pub fn credentials_for(&self, url: &str) -> Option<&RegistryEndpoint> {
        self.configured.iter().find(|e| same_url(&e.url, url))
    }

    /// Configured endpoints other than the public one.
    pub fn private_endpoints(&self) -> impl Iterator<Item = &RegistryEndpoint> {
        self.configured.iter().filter(|e| !self.is_public(&e.url))
    }

    /// `https://noriskillsets.dev` + `acme` -> `https://acme.noriskillsets.dev`.
    pub fn organization_url(&self, org: &str) -> String {
        match self.public_url.split_once("://") {
            Some((scheme, host)) => format!("{}://{}.{}", scheme, org, host),
            None => format!("{}.{}", org, self.public_url),
        }
    }

    /// The registry a spec must be resolved against, if it is pinned to one.
    /// Namespaced specs are pinned to their organization registry.
    pub fn pinned_registry(&self, spec: &PackageSpec, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(normalize_url)
            .or_else(|| (!spec.is_public()).then(|| self.organization_url(&spec.namespace)))
    }
}

/// One registry that has the package, with the bearer used to reach it.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub endpoint: RegistryEndpoint,
    pub bearer: Option<String>,
    pub packument: Packument,
}

impl SearchResult {
    fn candidate(&self) -> RegistryCandidate {
        RegistryCandidate {
            registry_url: self.endpoint.url.clone(),
            latest_version: self.packument.latest().map(String::from),
            description: self.packument.description.clone(),
        }
    }
}

/// Query a single registry the user pointed at. Private registries need credentials;
/// there is no anonymous probe.
fn search_explicit(
    client: &dyn RegistryClient,
    kind: PackageKind,
    name: &str,
    registries: &Registries,
    url: &str,
) -> Result<Vec<SearchResult>> {
    if registries.is_public(url) {
        let packument = client.get_packument(kind, name, url, None)?;
        return Ok(vec![SearchResult {
            endpoint: RegistryEndpoint::public(url),
            bearer: None,
            packument,
        }]);
    }
    let endpoint = registries
        .credentials_for(url)
        .filter(|e| e.auth_token.is_some())
        .cloned()
        .ok_or_else(|| NoriError::AuthRequired {
            registry_url: normalize_url(url),
        })?;
    let token = client.exchange_token(&endpoint)?;
    let packument = client.get_packument(kind, name, &endpoint.url, Some(&token))?;
    Ok(vec![SearchResult {
        endpoint,
        bearer: Some(token),
        packument,
    }])
}

/// Every registry that has `name`. Zero hits is `NotFound` (or the network error that
/// emptied the aggregate); more than one hit is returned as-is.
pub fn search_all(
    client: &dyn RegistryClient,
    kind: PackageKind,
    name: &str,
    registries: &Registries,
    explicit: Option<&str>,
) -> Result<Vec<SearchResult>> {
    if let Some(url) = explicit {
        return search_explicit(client, kind, name, registries, url);
    }

    let mut results = Vec::new();
    let mut network_error: Option<NoriError> = None;

    utils::log(&format!("Searching {} for {}", registries.public_url, name));
    match client.get_packument(kind, name, &registries.public_url, None) {
        Ok(packument) => results.push(SearchResult {
            endpoint: RegistryEndpoint::public(&registries.public_url),
            bearer: None,
            packument,
        }),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            utils::log(&format!("Public registry query failed: {}", e));
            network_error = Some(e);
        }
    }

    for endpoint in registries.private_endpoints() {
        let token = match client.exchange_token(endpoint) {
            Ok(t) => t,
            Err(e) => {
                utils::log(&format!("Skipping {}: {}", endpoint.url, e));
                continue;
            }
        };
        utils::log(&format!("Searching {} for {}", endpoint.url, name));
        match client.get_packument(kind, name, &endpoint.url, Some(&token)) {
            Ok(packument) => results.push(SearchResult {
                endpoint: endpoint.clone(),
                bearer: Some(token),
                packument,
            }),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                utils::log(&format!("Registry {} query failed: {}", endpoint.url, e));
                if network_error.is_none() {
                    network_error = Some(e);
                }
            }
        }
    }

    if results.is_empty() {
        return Err(network_error.unwrap_or_else(|| NoriError::NotFound {
            package: name.to_string(),
            registry: None,
        }));
    }
    Ok(results)
}

/// Locate `spec` across registries and require exactly one match.
pub fn resolve(
    client: &dyn RegistryClient,
    spec: &PackageSpec,
    registries: &Registries,
    explicit: Option<&str>,
) -> Result<SearchResult> {
    let pinned = registries.pinned_registry(spec, explicit);
    let mut results = search_all(
        client,
        PackageKind::Profile,
        &spec.name,
        registries,
        pinned.as_deref(),
    )?;
    match results.len() {
        0 => Err(NoriError::NotFound {
            package: spec.qualified_name(),
            registry: pinned,
        }),
        1 => Ok(results.remove(0)),
        _ => Err(NoriError::AmbiguousPackage {
            package: spec.qualified_name(),
            candidates: results.iter().map(SearchResult::candidate).collect(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Read-only view of a package's tags and versions on the registry that has it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionListing {
    pub package: String,
    pub registry_url: String,
    pub dist_tags: BTreeMap<String, String>,
    pub versions: Vec<VersionEntry>,
}

/// Same resolution path as install, but nothing touches the filesystem.
pub fn list_versions(
    client: &dyn RegistryClient,
    spec: &PackageSpec,
    registries: &Registries,
    explicit: Option<&str>,
) -> Result<VersionListing> {
    let found = resolve(client, spec, registries, explicit)?;
    let packument = &found.packument;
    let mut names: Vec<String> = packument.versions.keys().cloned().collect();
    sort_versions_desc(&mut names);
    let versions = names
        .into_iter()
        .map(|version| VersionEntry {
            published_at: packument.published_at(&version).map(String::from),
            version,
        })
        .collect();
    Ok(VersionListing {
        package: spec.qualified_name(),
        registry_url: found.endpoint.url.clone(),
        dist_tags: packument.dist_tags.clone(),
        versions,
    })
}

/// Search hits from one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySearchHits {
    pub registry_url: String,
    pub packages: Vec<PackageSummary>,
}

/// Search the public registry and every configured private registry. A registry that
/// fails is logged and left out.
pub fn search_registries(
    client: &dyn RegistryClient,
    query: &str,
    registries: &Registries,
) -> Vec<RegistrySearchHits> {
    let mut out = Vec::new();
    match client.search_packages(query, &registries.public_url, None) {
        Ok(packages) => out.push(RegistrySearchHits {
            registry_url: registries.public_url.clone(),
            packages,
        }),
        Err(e) => utils::log_warning(&format!("search on {} failed: {}", registries.public_url, e)),
    }
    for endpoint in registries.private_endpoints() {
        let result = client
            .exchange_token(endpoint)
            .and_then(|token| client.search_packages(query, &endpoint.url, Some(&token)));
        match result {
            Ok(packages) => out.push(RegistrySearchHits {
                registry_url: endpoint.url.clone(),
                packages,
            }),
            Err(e) => utils::log_warning(&format!("search on {} failed: {}", endpoint.url, e)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::package_spec::parse;

    const PUBLIC: &str = "https://public.test";
    const PRIVATE_A: &str = "https://a.test";
    const PRIVATE_B: &str = "https://b.test";

    fn packument(name: &str, latest: &str) -> Packument {
        let mut p = Packument::new(name);
        p.add_version(latest, serde_json::json!({ "name": name, "version": latest }), None);
        p
    }

    #[test]
    fn single_public_hit_resolves() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo", "1.0.0"));
        let registries = Registries::new(PUBLIC);
        let found = resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap();
        assert_eq!(found.endpoint.url, PUBLIC);
        assert!(found.bearer.is_none());
    }

    #[test]
    fn hits_on_n_registries_are_ambiguous_with_n_candidates() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo", "1.0.0"));
        reg.add_packument(PRIVATE_A, PackageKind::Profile, packument("demo", "2.0.0"));
        reg.add_packument(PRIVATE_B, PackageKind::Profile, packument("demo", "3.0.0"));
        let registries = Registries::new(PUBLIC)
            .with_registry(PRIVATE_A, Some("tok-a"))
            .with_registry(PRIVATE_B, Some("tok-b"));

        match resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap_err() {
            NoriError::AmbiguousPackage { candidates, .. } => {
                assert_eq!(candidates.len(), 3);
                let urls: Vec<&str> = candidates.iter().map(|c| c.registry_url.as_str()).collect();
                assert_eq!(urls, vec![PUBLIC, PRIVATE_A, PRIVATE_B]);
                assert_eq!(candidates[2].latest_version.as_deref(), Some("3.0.0"));
            }
            other => panic!("expected ambiguity, got {other}"),
        }
    }

    #[test]
    fn private_endpoint_equal_to_public_is_not_queried_twice() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo", "1.0.0"));
        let registries = Registries::new(PUBLIC).with_registry("https://public.test/", Some("tok"));
        let found = resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap();
        assert_eq!(found.endpoint.url, PUBLIC);
        assert_eq!(reg.packument_requests(PUBLIC), 1);
    }

    #[test]
    fn token_exchange_failure_skips_only_that_registry() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PRIVATE_A, PackageKind::Profile, packument("demo", "2.0.0"));
        reg.add_packument(PRIVATE_B, PackageKind::Profile, packument("demo", "3.0.0"));
        reg.fail_token_exchange(PRIVATE_A);
        let registries = Registries::new(PUBLIC)
            .with_registry(PRIVATE_A, Some("tok-a"))
            .with_registry(PRIVATE_B, Some("tok-b"));
        let found = resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap();
        assert_eq!(found.endpoint.url, PRIVATE_B);
        assert_eq!(found.bearer.as_deref(), Some("tok-b"));
    }

    #[test]
    fn nothing_anywhere_is_not_found() {
        let reg = MemoryRegistry::new();
        let registries = Registries::new(PUBLIC).with_registry(PRIVATE_A, Some("tok"));
        let err = resolve(&reg, &parse("ghost").unwrap(), &registries, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn network_error_surfaces_only_when_aggregate_is_empty() {
        let reg = MemoryRegistry::new();
        reg.fail_requests(PUBLIC);
        let registries = Registries::new(PUBLIC).with_registry(PRIVATE_A, Some("tok"));

        let err = resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap_err();
        assert!(err.is_network());

        reg.add_packument(PRIVATE_A, PackageKind::Profile, packument("demo", "2.0.0"));
        let found = resolve(&reg, &parse("demo").unwrap(), &registries, None).unwrap();
        assert_eq!(found.endpoint.url, PRIVATE_A);
    }

    #[test]
    fn explicit_private_without_credentials_fails_fast() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PRIVATE_A, PackageKind::Profile, packument("demo", "2.0.0"));
        let registries = Registries::new(PUBLIC);
        let err = resolve(&reg, &parse("demo").unwrap(), &registries, Some(PRIVATE_A)).unwrap_err();
        assert!(matches!(err, NoriError::AuthRequired { .. }));
        assert_eq!(reg.packument_requests(PRIVATE_A), 0);
    }

    #[test]
    fn explicit_registry_queries_only_that_endpoint() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo", "1.0.0"));
        reg.add_packument(PRIVATE_A, PackageKind::Profile, packument("demo", "2.0.0"));
        let registries = Registries::new(PUBLIC).with_registry(PRIVATE_A, Some("tok-a"));

        let found = resolve(&reg, &parse("demo").unwrap(), &registries, Some(PRIVATE_A)).unwrap();
        assert_eq!(found.packument.latest(), Some("2.0.0"));
        assert_eq!(reg.packument_requests(PUBLIC), 0);

        let found = resolve(&reg, &parse("demo").unwrap(), &registries, Some(PUBLIC)).unwrap();
        assert_eq!(found.packument.latest(), Some("1.0.0"));
        assert!(found.bearer.is_none());
    }

    #[test]
    fn namespaced_spec_is_pinned_to_org_registry() {
        let reg = MemoryRegistry::new();
        reg.add_packument("https://acme.public.test", PackageKind::Profile, packument("demo", "4.0.0"));
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo", "1.0.0"));
        let registries = Registries::new(PUBLIC).with_registry("https://acme.public.test", Some("tok"));
        let found = resolve(&reg, &parse("acme/demo").unwrap(), &registries, None).unwrap();
        assert_eq!(found.packument.latest(), Some("4.0.0"));

        let bare = Registries::new(PUBLIC);
        let err = resolve(&reg, &parse("acme/demo").unwrap(), &bare, None).unwrap_err();
        assert!(matches!(err, NoriError::AuthRequired { .. }));
    }

    #[test]
    fn list_versions_sorted_with_timestamps() {
        let reg = MemoryRegistry::new();
        let mut p = Packument::new("demo");
        p.add_version("1.0.0", serde_json::json!({}), Some("2026-01-01T00:00:00Z"));
        p.add_version("1.10.0", serde_json::json!({}), Some("2026-03-01T00:00:00Z"));
        p.add_version("1.2.0", serde_json::json!({}), None);
        p.time.insert("created".to_string(), "2025-12-31T00:00:00Z".to_string());
        p.dist_tags.insert("latest".to_string(), "1.2.0".to_string());
        reg.add_packument(PUBLIC, PackageKind::Profile, p);

        let listing = list_versions(&reg, &parse("demo").unwrap(), &Registries::new(PUBLIC), None).unwrap();
        let order: Vec<&str> = listing.versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, vec!["1.10.0", "1.2.0", "1.0.0"]);
        assert_eq!(listing.versions[0].published_at.as_deref(), Some("2026-03-01T00:00:00Z"));
        assert_eq!(listing.versions[1].published_at, None);
        assert_eq!(listing.dist_tags.get("latest").map(String::as_str), Some("1.2.0"));
    }

    #[test]
    fn packument_wire_format_uses_npm_keys() {
        let raw = r#"{
            "name": "demo",
            "description": "Demo profile",
            "dist-tags": { "latest": "1.0.0" },
            "versions": { "1.0.0": { "name": "demo", "version": "1.0.0" } },
            "time": { "created": "2026-01-01T00:00:00Z", "1.0.0": "2026-01-02T00:00:00Z" }
        }"#;
        let p: Packument = serde_json::from_str(raw).unwrap();
        assert_eq!(p.latest(), Some("1.0.0"));
        assert_eq!(p.published_at("1.0.0"), Some("2026-01-02T00:00:00Z"));
        assert_eq!(p.published_at("created"), None);
    }

    #[test]
    fn organization_url_prefixes_host() {
        let r = Registries::new("https://noriskillsets.dev/");
        assert_eq!(r.organization_url("acme"), "https://acme.noriskillsets.dev");
    }

    #[test]
    fn search_skips_failing_registries() {
        let reg = MemoryRegistry::new();
        reg.add_packument(PUBLIC, PackageKind::Profile, packument("demo-kit", "1.0.0"));
        reg.add_packument(PRIVATE_B, PackageKind::Profile, packument("demo-private", "1.0.0"));
        reg.fail_token_exchange(PRIVATE_A);
        let registries = Registries::new(PUBLIC)
            .with_registry(PRIVATE_A, Some("tok-a"))
            .with_registry(PRIVATE_B, Some("tok-b"));
        let hits = search_registries(&reg, "demo", &registries);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].packages[0].name, "demo-kit");
        assert_eq!(hits[1].registry_url, PRIVATE_B);
    }
}
