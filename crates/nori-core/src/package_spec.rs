//! Parse user input like `demo`, `demo@1.2.0` or `acme/demo@1.2.0` into a [`PackageSpec`].

use std::fmt;

use crate::error::{NoriError, Result};

pub const PUBLIC_NAMESPACE: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub namespace: String,
    pub name: String,
    /// `None` means "resolve latest". Explicit versions are forwarded verbatim.
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn is_public(&self) -> bool {
        self.namespace == PUBLIC_NAMESPACE
    }

    /// `name` for public packages, `namespace/name` otherwise (no version).
    pub fn qualified_name(&self) -> String {
        if self.is_public() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())?;
        if let Some(v) = &self.version {
            write!(f, "@{}", v)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageSpec {
    type Err = NoriError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// `[a-z0-9]+(-[a-z0-9]+)*`
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('-').all(|part| {
            !part.is_empty()
                && part
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

/// Dotted-numeric versions (`1.2.3`, `1.2.3-next.1`) or dist-tag names (`beta`).
fn is_valid_version_token(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    let charset_ok = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+');
    charset_ok && (first.is_ascii_digit() || first.is_ascii_lowercase())
}

fn invalid(input: &str, reason: impl Into<String>) -> NoriError {
    NoriError::InvalidSpec {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Grammar: `(namespace "/")? name ("@" version)?`. An empty version (`demo@`) means latest.
pub fn parse(input: &str) -> Result<PackageSpec> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(invalid(input, "package name is empty"));
    }

    let (path, version) = match raw.split_once('@') {
        Some((path, v)) => (path, Some(v)),
        None => (raw, None),
    };

    let segments: Vec<&str> = path.split('/').collect();
    let (namespace, name) = match segments.as_slice() {
        [name] => (PUBLIC_NAMESPACE, *name),
        [namespace, name] => {
            if !is_valid_identifier(namespace) {
                return Err(invalid(
                    input,
                    format!("namespace '{}' must match [a-z0-9]+(-[a-z0-9]+)*", namespace),
                ));
            }
            (*namespace, *name)
        }
        _ => return Err(invalid(input, "at most one '/' namespace separator is allowed")),
    };

    if !is_valid_identifier(name) {
        return Err(invalid(
            input,
            format!("name '{}' must match [a-z0-9]+(-[a-z0-9]+)*", name),
        ));
    }

    let version = match version.map(str::trim) {
        None | Some("") => None,
        Some(v) if is_valid_version_token(v) => Some(v.to_string()),
        Some(v) => return Err(invalid(input, format!("'{}' is not a valid version", v))),
    };

    Ok(PackageSpec {
        namespace: namespace.to_string(),
        name: name.to_string(),
        version,
    })
}
