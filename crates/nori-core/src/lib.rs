//! Core library for Nori: package specs, multi-registry resolution, atomic installs
//! with version sidecars, and skill dependency cascades.
//! Used by the CLI binary; the registry seam lets other frontends supply their own client.

pub mod archive;
pub mod cascade;
pub mod config;
pub mod decision;
pub mod error;
pub mod http_client;
pub mod install;
pub mod installed;
pub mod installer;
pub mod manifest;
pub mod memory;
pub mod package_spec;
pub mod publish;
pub mod registry;
pub mod root;
pub mod utils;
pub mod version;

// Re-export main API for CLI
pub use cascade::{DependencyOutcome, DependencyReport};
pub use config::{load_config, Config};
pub use error::{NoriError, Result};
pub use http_client::HttpRegistryClient;
pub use install::{install_package, InstallOutcome, InstallReport, InstallRequest};
pub use installed::InstalledRecord;
pub use memory::MemoryRegistry;
pub use package_spec::{parse as parse_package_spec, PackageSpec};
pub use publish::{publish_profile, PublishReport};
pub use registry::{
    list_versions, resolve, search_registries, PackageKind, Registries, RegistryClient,
    RegistryEndpoint, RegistrySearchHits, VersionListing,
};
pub use root::InstallRoot;
pub use utils::{log, log_error, log_warning};
