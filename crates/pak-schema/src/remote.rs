//! Remote source definitions, locator parsing and repository query results.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{LATEST, compare_versions};

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<vendor>[^/=:@\s]+)/(?P<package>[^=:@\s]+)(?:=(?P<version>[^:@\s]+))?(?::(?P<branch>[^@\s]+))?(?:@(?P<source>\S+))?$",
    )
    .expect("locator pattern is a valid regex")
});

/// A locator string did not match `vendor/package[=version][:branch][@source]`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid remote package locator '{0}'")]
pub struct InvalidLocator(pub String);

/// A parsed remote package locator.
///
/// ```
/// use pak_schema::RemotePackageInput;
///
/// let input: RemotePackageInput = "acme/tool=1.2.0@github".parse().unwrap();
/// assert_eq!(input.vendor, "acme");
/// assert_eq!(input.version.as_deref(), Some("1.2.0"));
/// assert_eq!(input.to_string(), "acme/tool=1.2.0@github");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePackageInput {
    /// Organisation or user owning the repository.
    pub vendor: String,
    /// Repository / package name.
    pub package: String,
    /// Requested version, `None` meaning latest.
    pub version: Option<String>,
    /// Optional branch.
    pub branch: Option<String>,
    /// Name of the remote source to query.
    pub source: Option<String>,
}

impl RemotePackageInput {
    /// The requested version, or `latest`.
    pub fn version_or_latest(&self) -> &str {
        self.version.as_deref().unwrap_or(LATEST)
    }

    /// Reverse-domain form, e.g. `com.acme.my_tool=1.0.0`.
    pub fn to_standard(&self, with_version: bool) -> String {
        let base = format!("com.{}.{}", self.vendor, self.package);
        let full = if with_version {
            format!("{base}={}", self.version_or_latest())
        } else {
            base
        };
        full.replace('-', "_")
    }
}

impl FromStr for RemotePackageInput {
    type Err = InvalidLocator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = LOCATOR
            .captures(s.trim())
            .ok_or_else(|| InvalidLocator(s.to_string()))?;
        let group = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .filter(|v| !v.is_empty())
        };
        Ok(Self {
            vendor: group("vendor").ok_or_else(|| InvalidLocator(s.to_string()))?,
            package: group("package").ok_or_else(|| InvalidLocator(s.to_string()))?,
            version: group("version"),
            branch: group("branch"),
            source: group("source"),
        })
    }
}

impl fmt::Display for RemotePackageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.package)?;
        if let Some(v) = &self.version {
            write!(f, "={v}")?;
        }
        if let Some(b) = &self.branch {
            write!(f, ":{b}")?;
        }
        if let Some(s) = &self.source {
            write!(f, "@{s}")?;
        }
        Ok(())
    }
}

/// API flavour of a remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteSourceKind {
    /// GitHub REST API (`/repos/...`).
    Github,
    /// GitLab REST API (`/api/v4/projects/...`).
    Gitlab,
}

impl FromStr for RemoteSourceKind {
    type Err = crate::types::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            _ => Err(crate::types::UnknownVariant {
                kind: "remote source kind",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RemoteSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        })
    }
}

/// A named remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedRemoteSource {
    /// Name used after `@` in locators.
    pub name: String,
    /// API flavour.
    pub kind: RemoteSourceKind,
    /// API host, e.g. `api.github.com`.
    pub host: String,
    /// Use HTTPS.
    pub ssl: bool,
}

impl DefinedRemoteSource {
    /// Scheme and host, without a trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.host.trim_end_matches('/'))
    }
}

/// Download targets discovered for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepositoryFiles {
    /// Source archive in zip format.
    pub zipball_url: Option<String>,
    /// Source archive in tar.gz format.
    pub tarball_url: Option<String>,
    /// Prebuilt package file.
    pub package_url: Option<String>,
    /// Clone URL over HTTP(S).
    pub git_http_url: Option<String>,
    /// Clone URL over SSH.
    pub git_ssh_url: Option<String>,
}

impl RepositoryFiles {
    /// Overwrite every field `other` supplies.
    pub fn overlay(&mut self, other: RepositoryFiles) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.zipball_url, other.zipball_url);
        take(&mut self.tarball_url, other.tarball_url);
        take(&mut self.package_url, other.package_url);
        take(&mut self.git_http_url, other.git_http_url);
        take(&mut self.git_ssh_url, other.git_ssh_url);
    }

    /// Whether no download target is known.
    pub fn is_empty(&self) -> bool {
        self.zipball_url.is_none()
            && self.tarball_url.is_none()
            && self.package_url.is_none()
            && self.git_http_url.is_none()
            && self.git_ssh_url.is_none()
    }
}

/// What a remote source reported for one package query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepositoryQueryResults {
    /// Download targets.
    pub files: RepositoryFiles,
    /// Version the targets belong to.
    pub version: Option<String>,
    /// Release title.
    pub release_name: Option<String>,
    /// Release notes.
    pub release_description: Option<String>,
}

impl RepositoryQueryResults {
    /// Fold another result set into this one.
    ///
    /// Free-text fields keep whichever side is set, preferring the longer
    /// string when both are. The version keeps the higher of the two. File
    /// references are overwritten by every field `other` supplies.
    pub fn merge(&mut self, other: RepositoryQueryResults) {
        self.release_name = prefer_longer(self.release_name.take(), other.release_name);
        self.release_description =
            prefer_longer(self.release_description.take(), other.release_description);
        self.version = match (self.version.take(), other.version) {
            (Some(a), Some(b)) => {
                if compare_versions(&b, &a) == Ordering::Greater {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (a, b) => a.or(b),
        };
        self.files.overlay(other.files);
    }
}

fn prefer_longer(current: Option<String>, incoming: Option<String>) -> Option<String> {
    match (current, incoming) {
        (Some(a), Some(b)) if b.len() > a.len() => Some(b),
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}

/// Credentials forwarded to remote sources.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer / personal access token.
    Token(String),
    /// HTTP basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credential::Token(***)"),
            Self::Basic { username, .. } => f
                .debug_struct("Credential::Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}
