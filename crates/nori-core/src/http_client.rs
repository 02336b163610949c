//! Blocking registry client: one ureq Agent for connection reuse, retries on 5xx/429.
//! No request timeout is set here; callers that need one wrap the client.

use std::io::Read;

use crate::error::{NoriError, Result};
use crate::registry::{PackageKind, PackageSummary, Packument, RegistryClient, UploadReceipt};
use crate::utils::{self, normalize_url};

const DEFAULT_RETRY_COUNT: usize = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
const MAX_RETRY_BACKOFF_MS: u64 = 5_000;
const MAX_ERROR_DETAIL: usize = 200;

fn retry_count_from_env() -> usize {
    std::env::var("NORI_HTTP_RETRIES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RETRY_COUNT)
}

fn retry_backoff_ms_from_env() -> u64 {
    std::env::var("NORI_HTTP_RETRY_BACKOFF_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_BACKOFF_MS)
}

fn packument_url(kind: PackageKind, name: &str, registry_url: &str) -> String {
    format!("{}/api/{}/{}", normalize_url(registry_url), kind.segment(), name)
}

fn tarball_url(kind: PackageKind, name: &str, version: &str, registry_url: &str) -> String {
    format!(
        "{}/tarball/{}-{}.tgz",
        packument_url(kind, name, registry_url),
        name,
        version
    )
}

fn upload_url(name: &str, version: &str, registry_url: &str) -> String {
    format!(
        "{}/versions/{}",
        packument_url(PackageKind::Profile, name, registry_url),
        version
    )
}

fn search_url(registry_url: &str) -> String {
    format!("{}/api/packages/search", normalize_url(registry_url))
}

fn is_retryable(status: u16) -> bool {
    status >= 500 || status == 429
}

/// A 404 from the registry means the package or version does not exist there.
fn missing_as_not_found(err: NoriError, package: &str, registry_url: &str) -> NoriError {
    match err {
        NoriError::Network {
            status: Some(404), ..
        } => NoriError::NotFound {
            package: package.to_string(),
            registry: Some(normalize_url(registry_url)),
        },
        other => other,
    }
}

fn authorize(req: ureq::Request, token: Option<&str>) -> ureq::Request {
    match token {
        Some(t) if !t.is_empty() => req.set("Authorization", &format!("Bearer {}", t)),
        _ => req,
    }
}

pub struct HttpRegistryClient {
    agent: ureq::Agent,
}

impl Default for HttpRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRegistryClient {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("nori/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn send_with_retry<F>(&self, url: &str, mut send: F) -> Result<ureq::Response>
    where
        F: FnMut() -> std::result::Result<ureq::Response, ureq::Error>,
    {
        let retries = retry_count_from_env();
        let mut attempt = 0usize;
        let mut backoff = retry_backoff_ms_from_env();
        loop {
            attempt += 1;
            let (status, detail) = match send() {
                Ok(resp) => return Ok(resp),
                Err(ureq::Error::Status(code, resp)) => {
                    let body = resp.into_string().unwrap_or_default();
                    let detail: String = body.trim().chars().take(MAX_ERROR_DETAIL).collect();
                    if attempt <= retries && is_retryable(code) {
                        (Some(code), detail)
                    } else {
                        return Err(NoriError::Network {
                            url: url.to_string(),
                            status: Some(code),
                            detail,
                        });
                    }
                }
                Err(e) => {
                    if attempt <= retries {
                        (None, e.to_string())
                    } else {
                        return Err(NoriError::Network {
                            url: url.to_string(),
                            status: None,
                            detail: e.to_string(),
                        });
                    }
                }
            };
            utils::log(&format!(
                "Retrying {} in {}ms (attempt {}, status {:?}): {}",
                url, backoff, attempt, status, detail
            ));
            std::thread::sleep(std::time::Duration::from_millis(backoff));
            backoff = backoff.saturating_mul(2).min(MAX_RETRY_BACKOFF_MS);
        }
    }

    fn read_body(url: &str, resp: ureq::Response) -> Result<Vec<u8>> {
        let hint = resp
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut buf = Vec::with_capacity(hint);
        resp.into_reader()
            .read_to_end(&mut buf)
            .map_err(|e| NoriError::Network {
                url: url.to_string(),
                status: None,
                detail: e.to_string(),
            })?;
        Ok(buf)
    }

    fn get_bytes(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        let resp = self.send_with_retry(url, || authorize(self.agent.get(url), token).call())?;
        Self::read_body(url, resp)
    }
}

impl RegistryClient for HttpRegistryClient {
    fn get_packument(
        &self,
        kind: PackageKind,
        name: &str,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Packument> {
        let url = packument_url(kind, name, registry_url);
        let body = self
            .get_bytes(&url, token)
            .map_err(|e| missing_as_not_found(e, name, registry_url))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn download_tarball(
        &self,
        kind: PackageKind,
        name: &str,
        version: Option<&str>,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let version = match version {
            Some(v) => v.to_string(),
            None => self
                .get_packument(kind, name, registry_url, token)?
                .latest()
                .map(String::from)
                .ok_or_else(|| NoriError::NotFound {
                    package: format!("{}@latest", name),
                    registry: Some(normalize_url(registry_url)),
                })?,
        };
        let url = tarball_url(kind, name, &version, registry_url);
        utils::log(&format!("Downloading {}", url));
        self.get_bytes(&url, token)
            .map_err(|e| missing_as_not_found(e, &format!("{}@{}", name, version), registry_url))
    }

    fn upload_profile(
        &self,
        name: &str,
        version: &str,
        archive: &[u8],
        registry_url: &str,
        token: &str,
    ) -> Result<UploadReceipt> {
        let url = upload_url(name, version, registry_url);
        let resp = self
            .send_with_retry(&url, || {
                authorize(self.agent.put(&url), Some(token))
                    .set("Content-Type", "application/gzip")
                    .send_bytes(archive)
            })
            .map_err(|e| match e {
                NoriError::Network {
                    status: Some(status),
                    detail,
                    ..
                } => NoriError::Upload {
                    package: name.to_string(),
                    version: version.to_string(),
                    detail: format!("HTTP {}: {}", status, detail),
                },
                other => other,
            })?;
        let body = Self::read_body(&url, resp)?;
        Ok(serde_json::from_slice(&body).unwrap_or_else(|_| UploadReceipt {
            version: version.to_string(),
        }))
    }

    fn search_packages(
        &self,
        query: &str,
        registry_url: &str,
        token: Option<&str>,
    ) -> Result<Vec<PackageSummary>> {
        let url = search_url(registry_url);
        let resp = self.send_with_retry(&url, || {
            authorize(self.agent.get(&url), token).query("q", query).call()
        })?;
        let body = Self::read_body(&url, resp)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_registry_api_layout() {
        assert_eq!(
            packument_url(PackageKind::Profile, "demo", "https://noriskillsets.dev/"),
            "https://noriskillsets.dev/api/packages/demo"
        );
        assert_eq!(
            tarball_url(PackageKind::Skill, "kit", "2.0.0", "https://r.test"),
            "https://r.test/api/skills/kit/tarball/kit-2.0.0.tgz"
        );
        assert_eq!(
            upload_url("demo", "1.0.1", "https://r.test"),
            "https://r.test/api/packages/demo/versions/1.0.1"
        );
        assert_eq!(search_url("https://r.test/"), "https://r.test/api/packages/search");
    }

    #[test]
    fn only_404_becomes_not_found() {
        let network = |status| NoriError::Network {
            url: "https://r.test/api/packages/demo".to_string(),
            status,
            detail: String::new(),
        };
        assert!(missing_as_not_found(network(Some(404)), "demo", "https://r.test").is_not_found());
        assert!(missing_as_not_found(network(Some(500)), "demo", "https://r.test").is_network());
        assert!(missing_as_not_found(network(None), "demo", "https://r.test").is_network());
    }

    #[test]
    fn retry_policy() {
        assert!(is_retryable(503));
        assert!(is_retryable(429));
        assert!(!is_retryable(404));
        assert!(!is_retryable(401));
    }

    #[test]
    fn unreachable_registry_is_network_error() {
        let client = HttpRegistryClient::new();
        let err = client
            .get_packument(PackageKind::Profile, "demo", "http://127.0.0.1:1", None)
            .unwrap_err();
        assert!(err.is_network());
    }
}
