//! Newtypes and small enums shared by every pak crate.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version keyword that resolves to the newest available version.
pub const LATEST: &str = "latest";

/// A package identifier (e.g. `com.example.foo`).
///
/// Package identifiers are reverse-domain strings and are kept exactly as
/// declared in the assembly, since they double as lock store keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last `.`-separated segment, used as the command name for symlinks.
    ///
    /// ```
    /// use pak_schema::PackageName;
    ///
    /// assert_eq!(PackageName::new("com.example.foo").short_name(), "foo");
    /// assert_eq!(PackageName::new("foo").short_name(), "foo");
    /// ```
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A version string as declared by a package (not necessarily strict semver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a new version.
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    /// Return the version as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `latest` keyword rather than a concrete version.
    pub fn is_latest(&self) -> bool {
        self.0.eq_ignore_ascii_case(LATEST)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.0, &other.0)
    }
}

/// Coerce a loosely formatted version (`v1.2`, `1`, `2.0.0-rc1`) into semver.
///
/// Returns `None` when the input has no numeric core at all.
pub fn to_semver(input: &str) -> Option<semver::Version> {
    let trimmed = input.trim().trim_start_matches(['v', 'V']);
    if let Ok(v) = semver::Version::parse(trimmed) {
        return Some(v);
    }

    let (core, rest) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    semver::Version::parse(&format!("{}{rest}", parts.join("."))).ok()
}

/// Compare two version strings.
///
/// Both sides are coerced with [`to_semver`]; if either cannot be coerced the
/// comparison falls back to plain string ordering so the result stays total.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (to_semver(a), to_semver(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Error returned when parsing one of the string-keyed enums fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Interpreter used to run an execution unit's script payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// PHP CLI.
    Php,
    /// GNU bash.
    Bash,
    /// Default `python` on the host.
    Python,
    /// Python 3.
    Python3,
    /// Python 2.
    Python2,
    /// Perl 5.
    Perl,
    /// Lua.
    Lua,
}

impl Runner {
    /// Every runner the registry knows about.
    pub const ALL: [Runner; 7] = [
        Runner::Php,
        Runner::Bash,
        Runner::Python,
        Runner::Python3,
        Runner::Python2,
        Runner::Perl,
        Runner::Lua,
    ];

    /// The identifier used in execution policies.
    pub fn as_str(self) -> &'static str {
        match self {
            Runner::Php => "php",
            Runner::Bash => "bash",
            Runner::Python => "python",
            Runner::Python3 => "python3",
            Runner::Python2 => "python2",
            Runner::Perl => "perl",
            Runner::Lua => "lua",
        }
    }

    /// File extension for the script file written for this runner.
    pub fn extension(self) -> &'static str {
        match self {
            Runner::Php => ".php",
            Runner::Bash => ".bash",
            Runner::Python | Runner::Python3 | Runner::Python2 => ".py",
            Runner::Perl => ".pl",
            Runner::Lua => ".lua",
        }
    }

    /// Name of the interpreter binary looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runner {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Runner::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant {
                kind: "runner",
                value: s.to_string(),
            })
    }
}

/// How a dependency can be acquired when it is not already installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencySourceType {
    /// No source; the dependency must already be installed.
    #[default]
    None,
    /// Must be statically linked into the package; never fetched.
    Static,
    /// A package file relative to the installing package's directory.
    Local,
    /// A remote locator resolved through the fetch cascade.
    Remote,
}

impl FromStr for DependencySourceType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "static" => Ok(Self::Static),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(UnknownVariant {
                kind: "dependency source type",
                value: s.to_string(),
            }),
        }
    }
}

/// Encoding of a component's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComponentDataType {
    /// Raw text.
    #[default]
    #[serde(rename = "plain")]
    Plain,
    /// Raw bytes.
    #[serde(rename = "binary")]
    Binary,
    /// Base64 encoded bytes.
    #[serde(rename = "b64enc")]
    Base64Encoded,
    /// A serialized syntax tree; only meaningful to a language-specific strategy.
    #[serde(rename = "ast")]
    Ast,
}
