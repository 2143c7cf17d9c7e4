//! Per-run install state.

use std::collections::{BTreeSet, HashSet};

use pak_schema::{Package, PackageName, Version};

use crate::reporter::Reporter;

/// Memo of one recursive install.
///
/// Keys follow `installed.<package>=<version>` for finished packages and
/// `<dependency>=<version|latest>` for visited dependency edges.
#[derive(Debug, Default)]
pub struct InstallRun {
    installed: HashSet<String>,
    dependencies: HashSet<String>,
    in_progress: BTreeSet<(String, String)>,
}

fn installed_key(package: &str, version: &str) -> String {
    format!("installed.{package}={version}")
}

impl InstallRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self, package: &str, version: &str) -> bool {
        self.installed.contains(&installed_key(package, version))
    }

    pub fn mark_installed(&mut self, package: &str, version: &str) {
        self.installed.insert(installed_key(package, version));
    }

    /// Record a dependency edge. Returns `false` if it was already visited.
    pub fn visit_dependency(&mut self, key: &str) -> bool {
        self.dependencies.insert(key.to_string())
    }

    pub(crate) fn begin(&mut self, package: &str, version: &str) {
        self.in_progress
            .insert((package.to_string(), version.to_string()));
    }

    pub(crate) fn finish(&mut self, package: &str, version: &str) {
        self.in_progress
            .remove(&(package.to_string(), version.to_string()));
    }

    /// Version of `package` being installed further up the stack that
    /// satisfies `requested` (any version when `None`).
    pub fn in_progress(&self, package: &str, requested: Option<&str>) -> Option<&str> {
        self.in_progress
            .iter()
            .filter(|(name, _)| name == package)
            .map(|(_, version)| version.as_str())
            .find(|version| requested.is_none_or(|r| r.eq_ignore_ascii_case(pak_schema::LATEST) || r == *version))
    }

    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }
}

/// Number of progress steps an install of `package` reports.
pub fn total_steps(package: &Package) -> u64 {
    let count = 4
        + package.components.len()
        + package.resources.len()
        + package.execution_units.len()
        + package.pre_install_units().len()
        + package.post_install_units().len();
    count as u64
}

/// Monotonic step counter bounded by its total.
pub struct Progress<'a> {
    reporter: &'a dyn Reporter,
    name: PackageName,
    version: Version,
    current: u64,
    total: u64,
}

impl<'a> Progress<'a> {
    pub fn new(reporter: &'a dyn Reporter, package: &Package) -> Self {
        Self {
            reporter,
            name: package.assembly.package_name(),
            version: package.assembly.typed_version(),
            current: 0,
            total: total_steps(package),
        }
    }

    pub fn advance(&mut self) {
        if self.current < self.total {
            self.current += 1;
        }
        self.reporter
            .installing(&self.name, &self.version, self.current, self.total);
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
