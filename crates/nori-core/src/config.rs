//! Optional config from .nori-config.json in a directory or the home directory (JSON).
//! Only the registry and credential subset is read here; env overrides the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::registry::{Registries, RegistryEndpoint, DEFAULT_PUBLIC_REGISTRY};
use crate::utils::{self, normalize_url};

pub const CONFIG_FILE: &str = ".nori-config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub public_registry_url: Option<String>,
    pub registry_auths: Vec<RegistryEndpoint>,
    pub install_dir: Option<String>,
}

impl Config {
    /// Public endpoint: NORI_REGISTRY_URL, then the file, then the built-in default.
    pub fn public_registry_url(&self) -> String {
        if let Ok(v) = std::env::var("NORI_REGISTRY_URL") {
            if !v.trim().is_empty() {
                return normalize_url(&v);
            }
        }
        self.public_registry_url
            .as_deref()
            .map(normalize_url)
            .unwrap_or_else(|| DEFAULT_PUBLIC_REGISTRY.to_string())
    }

    /// Install directory: NORI_INSTALL_DIR, then the file.
    pub fn install_dir(&self) -> Option<PathBuf> {
        if let Ok(v) = std::env::var("NORI_INSTALL_DIR") {
            if !v.trim().is_empty() {
                return Some(PathBuf::from(v));
            }
        }
        self.install_dir.as_ref().map(PathBuf::from)
    }

    pub fn registries(&self) -> Registries {
        let mut registries = Registries::new(&self.public_registry_url());
        for auth in &self.registry_auths {
            registries = registries.with_registry(&auth.url, auth.auth_token.as_deref());
        }
        registries
    }
}

fn read_config(path: &Path) -> Option<Config> {
    let s = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Config>(&s) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            utils::log_warning(&format!("ignoring invalid config {}: {}", path.display(), e));
            None
        }
    }
}

/// Load config from .nori-config.json in dir, then ~/.nori-config.json. The first file
/// found wins; missing or invalid file = default.
pub fn load_config(dir: &Path) -> Config {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    for path in &candidates {
        if path.is_file() {
            return read_config(path).unwrap_or_default();
        }
    }
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_auths() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(
            td.path().join(CONFIG_FILE),
            r#"{
                "publicRegistryUrl": "https://registry.example/",
                "registryAuths": [
                    { "registryUrl": "https://acme.registry.example/", "authToken": "abc123" },
                    { "registryUrl": "https://other.example" }
                ],
                "installDir": "/opt/claude"
            }"#,
        )
        .unwrap();

        let cfg = load_config(td.path());
        assert_eq!(cfg.registry_auths.len(), 2);
        assert_eq!(cfg.install_dir.as_deref(), Some("/opt/claude"));

        let registries = cfg.registries();
        let acme = registries.credentials_for("https://acme.registry.example").unwrap();
        assert_eq!(acme.url, "https://acme.registry.example");
        assert_eq!(acme.auth_token.as_deref(), Some("abc123"));
        assert_eq!(
            registries.credentials_for("https://other.example/").unwrap().auth_token,
            None
        );
    }

    #[test]
    fn invalid_file_falls_back_to_default() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert_eq!(load_config(td.path()), Config::default());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg: Config =
            serde_json::from_str(r#"{"registryAuths": [], "sendSessionTranscript": true}"#).unwrap();
        assert!(cfg.registry_auths.is_empty());
    }
}
