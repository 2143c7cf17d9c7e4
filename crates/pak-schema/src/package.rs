//! Package container model.
//!
//! A [`Package`] is what a package file decodes to: the assembly that
//! identifies it, a header describing how it installs, and the payloads
//! (components, resources and execution units) that get materialised.
//!
//! On disk a package is `PAK\x01` followed by a zstd-compressed postcard
//! encoding of the structure.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::DefinedRemoteSource;
use crate::types::{ComponentDataType, DependencySourceType, PackageName, Version};

/// Magic bytes at the start of every package file.
pub const PACKAGE_MAGIC: [u8; 4] = *b"PAK\x01";

/// Default working directory of an execution unit (resolved at run time).
pub const DEFAULT_WORKING_DIRECTORY: &str = "%CWD%";

const ZSTD_LEVEL: i32 = 3;

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z0-9_]+)+[0-9a-z_]$")
        .expect("package name pattern is a valid regex")
});

/// Whether `name` is a dotted package id such as `com.example.tool`.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME.is_match(name)
}

/// Whether `version` can name an install directory.
///
/// Versions must be a single path segment: no separators, no `..`, no
/// whitespace, and not the `latest` alias.
#[must_use]
pub fn is_valid_version(version: &str) -> bool {
    !version.is_empty()
        && version != "."
        && !version.contains("..")
        && !version.eq_ignore_ascii_case(crate::types::LATEST)
        && !version
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
}

/// Errors raised while reading, writing or validating a package.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Postcard could not encode or decode the structure.
    #[error("Codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// The file does not start with [`PACKAGE_MAGIC`].
    #[error("Not a package file (bad magic bytes)")]
    InvalidMagic,

    /// Structural invariant violated.
    #[error("Invalid package: {0}")]
    Validation(String),
}

/// Identity and descriptive metadata of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Assembly {
    /// Human readable name.
    pub name: String,
    /// Package identifier, e.g. `com.example.foo`. Lock store key.
    pub package: String,
    /// Version string.
    pub version: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional publisher or author.
    pub company: Option<String>,
    /// Optional product name.
    pub product: Option<String>,
    /// Optional copyright line.
    pub copyright: Option<String>,
    /// Optional trademark line.
    pub trademark: Option<String>,
    /// Optional unique id of the assembly.
    pub uuid: Option<String>,
}

impl Assembly {
    /// Typed package name.
    pub fn package_name(&self) -> PackageName {
        PackageName::new(self.package.clone())
    }

    /// Typed version.
    pub fn typed_version(&self) -> Version {
        Version::new(self.version.clone())
    }
}

/// A dependency declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package identifier of the dependency.
    pub name: String,
    /// Exact version, or `None` when any installed version suffices.
    pub version: Option<String>,
    /// How the dependency is acquired if missing.
    pub source_type: DependencySourceType,
    /// Locator whose meaning depends on `source_type`.
    pub source: Option<String>,
}

impl Dependency {
    /// A dependency that must already be installed.
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            source_type: DependencySourceType::None,
            source: None,
        }
    }

    /// Set how the dependency is acquired.
    pub fn with_source(mut self, source_type: DependencySourceType, source: impl Into<String>) -> Self {
        self.source_type = source_type;
        self.source = Some(source.into());
        self
    }

    /// Memo key for this dependency within one install run.
    pub fn memo_key(&self) -> String {
        format!(
            "{}={}",
            self.name,
            self.version.as_deref().unwrap_or(crate::types::LATEST)
        )
    }
}

/// A file materialised under the package's source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Relative path of the file.
    pub name: String,
    /// Encoding of `data`.
    pub data_type: ComponentDataType,
    /// Payload.
    pub data: Vec<u8>,
}

/// A non-code file materialised under the package's source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Relative path of the file.
    pub name: String,
    /// Payload.
    pub data: Vec<u8>,
}

/// Follow-up behaviour attached to one class of exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExitHandle {
    /// Message printed when the handle fires.
    pub message: Option<String>,
    /// Terminate the whole program with `exit_code` when the handle fires.
    pub end_process: bool,
    /// Exit code this handle reacts to.
    pub exit_code: i32,
    /// Name of another unit in the same package version to run next.
    pub run: Option<String>,
}

/// Handles consulted after a unit's process terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExitHandlers {
    /// Handle for a successful run.
    pub success: Option<ExitHandle>,
    /// Handle for a warning exit code.
    pub warning: Option<ExitHandle>,
    /// Handle for an error exit code.
    pub error: Option<ExitHandle>,
}

impl ExitHandlers {
    /// Iterate over the configured handles in success, warning, error order.
    pub fn iter(&self) -> impl Iterator<Item = &ExitHandle> {
        [&self.success, &self.warning, &self.error]
            .into_iter()
            .flatten()
    }
}

/// Process settings for an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execute {
    /// Optional target path the unit was compiled from.
    pub target: Option<String>,
    /// Working directory; may contain runtime constants.
    pub working_directory: String,
    /// Arguments placed ahead of caller-supplied arguments.
    pub options: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Discard the child's output.
    pub silent: bool,
    /// Attach the child to the controlling terminal.
    pub tty: bool,
    /// Kill the child after this many seconds.
    pub timeout: Option<u64>,
}

impl Default for Execute {
    fn default() -> Self {
        Self {
            target: None,
            working_directory: DEFAULT_WORKING_DIRECTORY.to_string(),
            options: Vec::new(),
            env: BTreeMap::new(),
            silent: false,
            tty: false,
            timeout: None,
        }
    }
}

/// Declarative configuration of an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionPolicy {
    /// Unit name, unique within a package version.
    pub name: String,
    /// Runner identifier (see [`crate::Runner`]).
    pub runner: String,
    /// Process settings.
    pub execute: Execute,
    /// Message printed before the unit runs.
    pub message: Option<String>,
    /// Exit-code driven follow-ups.
    pub exit_handlers: Option<ExitHandlers>,
}

impl ExecutionPolicy {
    /// Names of the units referenced by this policy's exit handlers.
    pub fn follow_up_units(&self) -> Vec<&str> {
        self.exit_handlers
            .iter()
            .flat_map(ExitHandlers::iter)
            .filter_map(|h| h.run.as_deref())
            .collect()
    }
}

/// A runnable script bound to a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    /// Policy describing how to run `data`.
    pub policy: ExecutionPolicy,
    /// Script payload.
    pub data: Vec<u8>,
}

impl ExecutionUnit {
    /// Unit name (shortcut for `policy.name`).
    pub fn name(&self) -> &str {
        &self.policy.name
    }
}

/// Units run around the install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstallerHooks {
    /// Units run before components are written.
    pub pre_install: Vec<String>,
    /// Units run after everything is registered.
    pub post_install: Vec<String>,
}

/// Where updates of this package are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSource {
    /// Remote locator, e.g. `vendor/foo=latest@github`.
    pub source: String,
    /// Repository to register locally if not yet known.
    pub repository: Option<DefinedRemoteSource>,
}

/// Package-level switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PackageOptions {
    /// Expose the main execution policy as a command on the host.
    pub create_symlink: bool,
}

/// Install-time description of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    /// Tag selecting the installer strategy.
    pub compiler_extension: String,
    /// Constants exposed to the package at run time.
    pub runtime_constants: BTreeMap<String, String>,
    /// Declared dependencies.
    pub dependencies: Vec<Dependency>,
    /// Repositories the package expects to be defined.
    pub repositories: Vec<DefinedRemoteSource>,
    /// Where updates come from.
    pub update_source: Option<UpdateSource>,
    /// Package-level switches.
    pub options: PackageOptions,
}

/// A parsed package container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Package {
    /// Identity.
    pub assembly: Assembly,
    /// Install-time description.
    pub header: Header,
    /// Code files.
    pub components: Vec<Component>,
    /// Data files.
    pub resources: Vec<Resource>,
    /// Runnable scripts.
    pub execution_units: Vec<ExecutionUnit>,
    /// Unit exposed through the symlink, if any.
    pub main_execution_policy: Option<String>,
    /// Hook units run around the install.
    pub installer: Option<InstallerHooks>,
}

impl Package {
    /// Look up an execution unit by name.
    pub fn execution_unit(&self, name: &str) -> Option<&ExecutionUnit> {
        self.execution_units.iter().find(|u| u.name() == name)
    }

    /// Names of the pre-install hook units.
    pub fn pre_install_units(&self) -> &[String] {
        self.installer.as_ref().map_or(&[], |i| &i.pre_install)
    }

    /// Names of the post-install hook units.
    pub fn post_install_units(&self) -> &[String] {
        self.installer.as_ref().map_or(&[], |i| &i.post_install)
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Validation`] if the package id is not a dotted
    /// lowercase name, if the version is not a single path segment, or if two
    /// execution units share a name.
    pub fn validate(&self) -> Result<(), PackageError> {
        if !is_valid_package_name(&self.assembly.package) {
            return Err(PackageError::Validation(format!(
                "invalid package name '{}'",
                self.assembly.package
            )));
        }
        if !is_valid_version(&self.assembly.version) {
            return Err(PackageError::Validation(format!(
                "invalid version '{}'",
                self.assembly.version
            )));
        }
        let mut seen = HashSet::new();
        for unit in &self.execution_units {
            if !seen.insert(unit.name()) {
                return Err(PackageError::Validation(format!(
                    "duplicate execution unit '{}'",
                    unit.name()
                )));
            }
        }
        Ok(())
    }

    /// Encode into the container format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or compression fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        let raw = postcard::to_allocvec(self)?;
        let compressed = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)?;
        let mut out = Vec::with_capacity(PACKAGE_MAGIC.len() + compressed.len());
        out.extend_from_slice(&PACKAGE_MAGIC);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Decode from the container format and validate.
    ///
    /// # Errors
    ///
    /// Returns an error on bad magic, corrupt data or a failed validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let body = bytes
            .strip_prefix(PACKAGE_MAGIC.as_slice())
            .ok_or(PackageError::InvalidMagic)?;
        let raw = zstd::decode_all(body)?;
        let package: Package = postcard::from_bytes(&raw)?;
        package.validate()?;
        Ok(package)
    }

    /// Read and decode a package file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn read_file(path: &Path) -> Result<Self, PackageError> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Encode and write a package file.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write_file(&self, path: &Path) -> Result<(), PackageError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}
