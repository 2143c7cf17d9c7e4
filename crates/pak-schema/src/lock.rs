//! In-memory model of the lock store.
//!
//! The lock maps package name to version to [`VersionEntry`]. It is the
//! authoritative answer to "is this installed"; persisting it is the job of
//! the runtime's lock store, this module only holds the data and the pure
//! query/mutation operations over it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::package::Package;
use crate::types::compare_versions;

/// Current lock format version.
pub const LOCK_VERSION: u32 = 1;

/// A dependency as recorded at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Dependency package name.
    pub name: String,
    /// Version that satisfied the dependency when the dependent was installed.
    pub version: String,
}

impl DependencyEntry {
    /// Create a new entry.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One installed version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version string.
    pub version: String,
    /// Compiler extension the package was installed with.
    pub compiler: String,
    /// Root of the installation tree.
    pub location: PathBuf,
    /// Dependency snapshot.
    pub dependencies: Vec<DependencyEntry>,
    /// Names of the registered execution units.
    pub execution_units: Vec<String>,
    /// Unit exposed through the symlink, if any.
    pub main_execution_policy: Option<String>,
}

/// Every installed version of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PackageEntry {
    /// Package name.
    pub name: String,
    /// Highest installed version.
    pub latest_version: Option<String>,
    /// Installed versions keyed by version string.
    pub versions: BTreeMap<String, VersionEntry>,
}

impl PackageEntry {
    /// An entry with no versions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Insert or overwrite a version.
    pub fn add_version(&mut self, entry: VersionEntry) {
        self.versions.insert(entry.version.clone(), entry);
        self.refresh_latest();
    }

    /// Remove a version, returning it if it was present.
    pub fn remove_version(&mut self, version: &str) -> Option<VersionEntry> {
        let removed = self.versions.remove(version);
        self.refresh_latest();
        removed
    }

    /// Look up a version. `latest` resolves to [`Self::latest_version`].
    pub fn version(&self, version: &str) -> Option<&VersionEntry> {
        if version.eq_ignore_ascii_case(crate::types::LATEST) {
            return self
                .latest_version
                .as_deref()
                .and_then(|v| self.versions.get(v));
        }
        self.versions.get(version)
    }

    /// Installed version strings, lowest first.
    pub fn versions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.versions.keys().map(String::as_str).collect();
        out.sort_by(|a, b| compare_versions(a, b));
        out
    }

    /// Whether no version remains.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    fn refresh_latest(&mut self) {
        self.latest_version = self
            .versions
            .keys()
            .max_by(|a, b| compare_versions(a, b))
            .cloned();
    }
}

/// Recursive view of the dependency graph, keyed by `name=version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DependencyTree(pub BTreeMap<String, DependencyTree>);

impl DependencyTree {
    /// Subtree for a `name=version` key.
    pub fn get(&self, key: &str) -> Option<&DependencyTree> {
        self.0.get(key)
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over direct children.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DependencyTree)> {
        self.0.iter()
    }
}

/// The whole lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    /// Format version.
    pub lock_version: u32,
    /// Unix seconds of the last mutation.
    pub last_updated: u64,
    /// Installed packages keyed by name.
    pub packages: BTreeMap<String, PackageEntry>,
}

impl Default for PackageLock {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageLock {
    /// An empty lock.
    pub fn new() -> Self {
        Self {
            lock_version: LOCK_VERSION,
            last_updated: now_secs(),
            packages: BTreeMap::new(),
        }
    }

    /// Record `package` as installed at `location`, overwriting the same version.
    pub fn add_package(
        &mut self,
        package: &Package,
        location: impl Into<PathBuf>,
        dependencies: Vec<DependencyEntry>,
    ) -> &VersionEntry {
        let name = package.assembly.package.clone();
        let version = package.assembly.version.clone();
        let entry = VersionEntry {
            version: version.clone(),
            compiler: package.header.compiler_extension.clone(),
            location: location.into(),
            dependencies,
            execution_units: package
                .execution_units
                .iter()
                .map(|u| u.name().to_string())
                .collect(),
            main_execution_policy: package.main_execution_policy.clone(),
        };
        self.last_updated = now_secs();
        let slot = self
            .packages
            .entry(name.clone())
            .or_insert_with(|| PackageEntry::new(name));
        slot.add_version(entry);
        &slot.versions[&version]
    }

    /// Remove one version. The package entry is pruned when it becomes empty.
    pub fn remove_package_version(&mut self, name: &str, version: &str) -> Option<VersionEntry> {
        let entry = self.packages.get_mut(name)?;
        let removed = entry.remove_version(version)?;
        if entry.is_empty() {
            self.packages.remove(name);
        }
        self.last_updated = now_secs();
        Some(removed)
    }

    /// Remove a package and all of its versions.
    pub fn remove_package(&mut self, name: &str) -> Option<PackageEntry> {
        let removed = self.packages.remove(name)?;
        self.last_updated = now_secs();
        Some(removed)
    }

    /// Look up a package.
    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    /// Look up a package version (`latest` accepted).
    pub fn version(&self, name: &str, version: &str) -> Option<&VersionEntry> {
        self.packages.get(name)?.version(version)
    }

    /// Whether a dependency request is already satisfied.
    ///
    /// With no version requested, any locked version suffices.
    pub fn satisfies(&self, name: &str, version: Option<&str>) -> bool {
        match version {
            None => self.packages.contains_key(name),
            Some(v) => self.version(name, v).is_some(),
        }
    }

    /// Names of every installed package.
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Dependency tree of one package, or of every package when `name` is `None`.
    ///
    /// Each installed version contributes a `name=version` key. A version
    /// without dependencies maps to an empty subtree. Cycles are cut at the
    /// first repeated node.
    pub fn dependency_tree(&self, name: Option<&str>) -> DependencyTree {
        let mut tree = BTreeMap::new();
        let roots: Vec<&PackageEntry> = match name {
            Some(n) => self.packages.get(n).into_iter().collect(),
            None => self.packages.values().collect(),
        };
        for entry in roots {
            for version in entry.versions.values() {
                let mut path = BTreeSet::new();
                let key = format!("{}={}", entry.name, version.version);
                path.insert(key.clone());
                tree.insert(key, self.subtree(version, &mut path));
            }
        }
        DependencyTree(tree)
    }

    fn subtree(&self, version: &VersionEntry, path: &mut BTreeSet<String>) -> DependencyTree {
        let mut children = BTreeMap::new();
        for dep in &version.dependencies {
            let key = format!("{}={}", dep.name, dep.version);
            if !path.insert(key.clone()) {
                children.insert(key, DependencyTree::default());
                continue;
            }
            let child = self
                .version(&dep.name, &dep.version)
                .map(|v| self.subtree(v, path))
                .unwrap_or_default();
            path.remove(&key);
            children.insert(key, child);
        }
        DependencyTree(children)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
