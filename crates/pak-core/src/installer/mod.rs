//! Package Installer.
//!
//! [`PackageManager`] drives one install or uninstall to completion. An
//! install walks these stages, in order:
//!
//! 1. privilege check, parse the package file, per-run memo short-circuit
//! 2. strategy lookup by compiler extension, already-installed check
//! 3. runtime constant compilation, dependency resolution (recursive)
//! 4. directories, metadata, pre-install hooks
//! 5. components and resources, execution units, symlink request
//! 6. post-install hooks, repository registration, lock commit
//!
//! Hook units and removal of individual files are best effort: failures are
//! reported as warnings and the operation continues.

mod error;
mod options;
mod run;

pub use error::InstallError;
pub use options::InstallOptions;
pub use run::{InstallRun, Progress, total_steps};

use std::fs;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;

use pak_schema::{
    Credential, Dependency, DependencyEntry, DependencySourceType, DependencyTree, Package,
    PackageEntry, PackageName, Version, VersionEntry,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::constants::compile_package_constants;
use crate::container::{FileReader, PackageReader};
use crate::fetch::RemoteFetcher;
use crate::lock::LockStore;
use crate::paths::{InstallationPaths, Layout};
use crate::reporter::Reporter;
use crate::runner::RunnerResolver;
use crate::scope::{ScopeResolver, require_system};
use crate::sources::SourceRegistry;
use crate::strategy::{InstallerStrategy, StrategyRegistry};
use crate::symlinks::SymlinkRegistry;
use crate::units::UnitRegistry;

/// What an install call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub package: String,
    pub version: String,
    /// `false` when the per-run memo short-circuited the call.
    pub changed: bool,
}

#[derive(Serialize)]
struct ExtensionInfo<'a> {
    compiler_extension: &'a str,
}

pub struct PackageManager {
    layout: Layout,
    scope: Arc<dyn ScopeResolver>,
    reporter: Arc<dyn Reporter>,
    lock: Arc<LockStore>,
    units: UnitRegistry,
    symlinks: Arc<SymlinkRegistry>,
    sources: Arc<SourceRegistry>,
    strategies: StrategyRegistry,
    reader: Arc<dyn PackageReader>,
    fetcher: Option<RemoteFetcher>,
    credential: Option<Credential>,
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("layout", &self.layout)
            .field("strategies", &self.strategies)
            .finish_non_exhaustive()
    }
}

impl PackageManager {
    pub fn new(
        layout: Layout,
        config: &Config,
        scope: Arc<dyn ScopeResolver>,
        runners: Arc<dyn RunnerResolver>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let lock = Arc::new(LockStore::new(&layout, Arc::clone(&scope)));
        let symlinks = Arc::new(SymlinkRegistry::new(
            &layout,
            config.bin_dir.clone(),
            Arc::clone(&scope),
            Arc::clone(&reporter),
        ));
        lock.add_listener(symlinks.clone());
        let sources = Arc::new(SourceRegistry::new(&layout, Arc::clone(&scope)));
        let units = UnitRegistry::new(
            layout.clone(),
            Arc::clone(&scope),
            runners,
            Arc::clone(&reporter),
        );
        Self {
            layout,
            scope,
            reporter,
            lock,
            units,
            symlinks,
            sources,
            strategies: StrategyRegistry::default(),
            reader: Arc::new(FileReader),
            fetcher: None,
            credential: None,
        }
    }

    /// Program unit launchers re-enter.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.units = self.units.with_program(program);
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn PackageReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Enables remote dependencies.
    pub fn with_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn lock_store(&self) -> &LockStore {
        &self.lock
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn symlinks(&self) -> &SymlinkRegistry {
        &self.symlinks
    }

    pub fn sources(&self) -> &Arc<SourceRegistry> {
        &self.sources
    }

    /// Install the package file at `path` and, unless skipped, its dependencies.
    pub fn install(&self, path: &Path, options: &InstallOptions) -> Result<InstallOutcome, InstallError> {
        require_system(self.scope.as_ref(), "install packages")?;
        let _guard = self.lock.acquire()?;
        let mut run = InstallRun::new();
        self.install_with(path, options, &mut run)
    }

    /// Fetch `locator` (`vendor/project[=version]@source`) and install it.
    pub fn install_remote(
        &self,
        locator: &str,
        options: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        require_system(self.scope.as_ref(), "install packages")?;
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| InstallError::context("Remote installs are not enabled", locator))?;
        let _guard = self.lock.acquire()?;
        self.reporter.info(&format!("Fetching {locator}"));
        let fetched = fetcher.fetch(locator, options.fetch_options(), self.credential.as_ref())?;
        debug!(
            "Fetched {locator} via {} into {}",
            fetched.kind,
            fetched.path.display()
        );
        let mut run = InstallRun::new();
        self.install_with(&fetched.path, options, &mut run)
    }

    /// Install within an existing run. The caller holds the lock-store guard.
    pub fn install_with(
        &self,
        path: &Path,
        options: &InstallOptions,
        run: &mut InstallRun,
    ) -> Result<InstallOutcome, InstallError> {
        require_system(self.scope.as_ref(), "install packages")?;

        let meta = fs::metadata(path)
            .map_err(|_| InstallError::NotFound(format!("Package file {}", path.display())))?;
        if !meta.is_file() {
            return Err(InstallError::NotFound(format!(
                "Package file {}",
                path.display()
            )));
        }
        fs::File::open(path).map_err(|e| InstallError::context("Package file is not readable", e))?;
        let package = self.reader.read(path)?;
        package.validate()?;
        let name = package.assembly.package.clone();
        let version = package.assembly.version.clone();

        if run.is_installed(&name, &version) {
            debug!("{name}={version} already processed in this run");
            return Ok(InstallOutcome {
                package: name,
                version,
                changed: false,
            });
        }

        let result = self.install_package(package, path, options, run);
        if let Err(e) = &result {
            self.reporter.failed(
                &PackageName::new(name.as_str()),
                &Version::new(version.as_str()),
                &e.to_string(),
            );
        }
        result
    }

    fn install_package(
        &self,
        mut package: Package,
        path: &Path,
        options: &InstallOptions,
        run: &mut InstallRun,
    ) -> Result<InstallOutcome, InstallError> {
        let name = package.assembly.package.clone();
        let version = package.assembly.version.clone();

        let tag = package.header.compiler_extension.clone();
        let strategy = self
            .strategies
            .get(&tag)
            .ok_or_else(|| InstallError::UnsupportedExtension(tag.clone()))?;

        if self.lock.lock()?.version(&name, &version).is_some() {
            if !options.reinstall {
                return Err(InstallError::AlreadyInstalled {
                    package: name,
                    version,
                });
            }
            self.prune_for_reinstall(&name, &version)?;
        }

        self.reporter.section(&format!("Installing {name}={version}"));
        let paths = InstallationPaths::new(self.layout.install_dir(&name, &version));
        let constants = compile_package_constants(&mut package, &paths);

        run.begin(&name, &version);
        let base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let dependencies = self.resolve_dependencies(&package, &base_dir, options, run);
        run.finish(&name, &version);
        let dependencies = dependencies?;

        let mut progress = Progress::new(self.reporter.as_ref(), &package);

        paths.create()?;
        progress.advance();

        self.write_metadata(&package, &paths, &constants, &dependencies)?;
        progress.advance();

        strategy
            .pre_install(&paths)
            .map_err(|e| InstallError::context("Pre-install hook failed", e))?;
        progress.advance();
        for unit in package.pre_install_units() {
            self.run_hook_unit(&package, unit)?;
            progress.advance();
        }

        self.materialize(&package, strategy.as_ref(), &paths, &mut progress)?;

        for unit in &package.execution_units {
            self.units.add_unit(&name, &version, unit, false)?;
            progress.advance();
        }

        if package.header.options.create_symlink {
            let main = package.main_execution_policy.as_deref().ok_or_else(|| {
                InstallError::context(
                    "Symlink requested",
                    format!("{name} does not define a main execution policy"),
                )
            })?;
            if package.execution_unit(main).is_none() {
                return Err(InstallError::context(
                    "Symlink requested",
                    format!("main execution policy '{main}' is not a unit of {name}"),
                ));
            }
            self.symlinks.add(&name, main)?;
        }

        strategy
            .post_install(&paths)
            .map_err(|e| InstallError::context("Post-install hook failed", e))?;
        progress.advance();
        for unit in package.post_install_units() {
            self.run_hook_unit(&package, unit)?;
            progress.advance();
        }

        if !options.skip_repositories {
            self.register_repositories(&package)?;
        }

        self.lock
            .lock_mut(|lock| {
                lock.add_package(&package, paths.root.clone(), dependencies);
            })?;
        self.lock.save()?;
        run.mark_installed(&name, &version);

        self.reporter.done(
            &package.assembly.package_name(),
            &package.assembly.typed_version(),
            "installed",
        );
        info!("Installed {name}={version} into {}", paths.root.display());
        Ok(InstallOutcome {
            package: name,
            version,
            changed: true,
        })
    }

    /// Drop the lock entry, files and units of a version about to be reinstalled.
    fn prune_for_reinstall(&self, name: &str, version: &str) -> Result<(), InstallError> {
        info!("Reinstalling {name}={version}");
        let removed = self
            .lock
            .lock_mut(|lock| lock.remove_package_version(name, version))?;
        self.lock.save()?;

        let location = self.layout.install_dir(name, version);
        if location.exists() {
            fs::remove_dir_all(&location)?;
        }
        for unit in removed.iter().flat_map(|e| e.execution_units.iter()) {
            if let Err(e) = self.units.remove_unit(name, version, unit) {
                warn!("Failed to remove unit '{unit}' of {name}={version}: {e}");
            }
        }
        Ok(())
    }

    fn resolve_dependencies(
        &self,
        package: &Package,
        base_dir: &Path,
        options: &InstallOptions,
        run: &mut InstallRun,
    ) -> Result<Vec<DependencyEntry>, InstallError> {
        let mut entries = Vec::with_capacity(package.header.dependencies.len());
        for dep in &package.header.dependencies {
            let entry = if options.skip_dependencies {
                self.check_skipped_dependency(dep)?
            } else {
                self.resolve_dependency(dep, base_dir, options, run)?
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Version recorded for a dependency that is already satisfied.
    fn locked_entry(&self, dep: &Dependency) -> Result<DependencyEntry, InstallError> {
        let lock = self.lock.lock()?;
        let version = match &dep.version {
            Some(v) => v.clone(),
            None => lock
                .package(&dep.name)
                .and_then(|p| p.latest_version.clone())
                .unwrap_or_else(|| pak_schema::LATEST.to_string()),
        };
        Ok(DependencyEntry::new(&dep.name, version))
    }

    fn check_skipped_dependency(&self, dep: &Dependency) -> Result<DependencyEntry, InstallError> {
        let met = self.lock.lock()?.satisfies(&dep.name, dep.version.as_deref());
        if !met && dep.source_type == DependencySourceType::Static {
            return Err(InstallError::StaticDependency(dep.memo_key()));
        }
        debug!("Skipping dependency {}", dep.memo_key());
        self.locked_entry(dep)
    }

    fn resolve_dependency(
        &self,
        dep: &Dependency,
        base_dir: &Path,
        options: &InstallOptions,
        run: &mut InstallRun,
    ) -> Result<DependencyEntry, InstallError> {
        let key = dep.memo_key();
        if let Some(version) = run.in_progress(&dep.name, dep.version.as_deref()) {
            debug!("Dependency cycle through {key}, using {version}");
            return Ok(DependencyEntry::new(&dep.name, version));
        }
        if !run.visit_dependency(&key) {
            debug!("Dependency {key} already resolved in this run");
            return self.locked_entry(dep);
        }

        if options.reinstall && self.lock.lock()?.package(&dep.name).is_some() {
            info!("Reinstall requested, removing dependency {key} first");
            match &dep.version {
                Some(v) if self.lock.lock()?.version(&dep.name, v).is_some() => {
                    self.uninstall_version_inner(&dep.name, v)?;
                }
                Some(_) => {}
                None => {
                    self.uninstall_package_inner(&dep.name)?;
                }
            }
        }

        if self.lock.lock()?.satisfies(&dep.name, dep.version.as_deref()) {
            debug!("Dependency {key} is met");
            return self.locked_entry(dep);
        }

        let missing = || InstallError::MissingDependency {
            name: dep.name.clone(),
            version: dep
                .version
                .clone()
                .unwrap_or_else(|| pak_schema::LATEST.to_string()),
        };
        let outcome = match dep.source_type {
            DependencySourceType::Static => {
                return Err(InstallError::StaticDependency(key));
            }
            DependencySourceType::None => return Err(missing()),
            DependencySourceType::Local => {
                let source = dep.source.as_deref().ok_or_else(missing)?;
                let path = base_dir.join(source);
                info!("Installing dependency {key} from {}", path.display());
                self.install_with(&path, options, run)?
            }
            DependencySourceType::Remote => {
                let source = dep.source.as_deref().ok_or_else(missing)?;
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    InstallError::context("Remote dependencies are not enabled", &key)
                })?;
                self.reporter.info(&format!("Fetching {key} from {source}"));
                let fetched = fetcher.fetch(source, options.fetch_options(), self.credential.as_ref())?;
                self.install_with(&fetched.path, options, run)?
            }
        };

        if outcome.package != dep.name {
            warn!(
                "Dependency {key} resolved to package {}={}",
                outcome.package, outcome.version
            );
        }
        Ok(DependencyEntry::new(&dep.name, outcome.version))
    }

    fn write_metadata(
        &self,
        package: &Package,
        paths: &InstallationPaths,
        constants: &crate::constants::ConstantMap,
        dependencies: &[DependencyEntry],
    ) -> Result<(), InstallError> {
        fn json<T: Serialize + ?Sized>(dir: &Path, file: &str, value: &T) -> Result<(), InstallError> {
            let data = serde_json::to_vec_pretty(value)
                .map_err(|e| InstallError::context("Failed to encode metadata", e))?;
            fs::write(dir.join(file), data)?;
            Ok(())
        }
        json(&paths.data, "assembly.json", &package.assembly)?;
        json(
            &paths.data,
            "extension.json",
            &ExtensionInfo {
                compiler_extension: &package.header.compiler_extension,
            },
        )?;
        json(&paths.data, "constants.json", constants)?;
        json(&paths.data, "dependencies.json", dependencies)?;
        package.write_file(&paths.data.join("package.pak"))?;
        debug!("Wrote metadata into {}", paths.data.display());
        Ok(())
    }

    /// Run a hook unit as a temporary unit. Failures are warnings; an
    /// end-process handle aborts the install.
    fn run_hook_unit(&self, package: &Package, unit: &str) -> Result<(), InstallError> {
        match self.units.temporary_execute(package, unit) {
            Ok(exit) => {
                if let Some(code) = exit.terminate {
                    return Err(InstallError::Terminated(code));
                }
                if !exit.success() {
                    self.reporter.warning(&format!(
                        "Hook unit '{unit}' exited with {:?}",
                        exit.code
                    ));
                }
            }
            Err(e) => {
                self.reporter
                    .warning(&format!("Hook unit '{unit}' failed: {e}"));
            }
        }
        Ok(())
    }

    fn materialize(
        &self,
        package: &Package,
        strategy: &dyn InstallerStrategy,
        paths: &InstallationPaths,
        progress: &mut Progress<'_>,
    ) -> Result<(), InstallError> {
        for component in &package.components {
            if let Some(data) = strategy.process_component(component)? {
                write_payload(&paths.source, &component.name, &data)?;
            }
            progress.advance();
        }
        for resource in &package.resources {
            if let Some(data) = strategy.process_resource(resource)? {
                write_payload(&paths.source, &resource.name, &data)?;
            }
            progress.advance();
        }
        Ok(())
    }

    fn register_repositories(&self, package: &Package) -> Result<(), InstallError> {
        let declared = package
            .header
            .update_source
            .iter()
            .filter_map(|u| u.repository.clone())
            .chain(package.header.repositories.iter().cloned());
        for repo in declared {
            if self.sources.get(&repo.name)?.is_none() {
                let name = repo.name.clone();
                if self.sources.add(repo)? {
                    self.reporter
                        .info(&format!("Registered remote source '{name}'"));
                }
            }
        }
        Ok(())
    }

    /// Uninstall one version.
    pub fn uninstall_package_version(&self, name: &str, version: &str) -> Result<(), InstallError> {
        require_system(self.scope.as_ref(), "uninstall packages")?;
        let _guard = self.lock.acquire()?;
        self.uninstall_version_inner(name, version)
    }

    /// Uninstall every version, continuing past per-version failures.
    /// Returns the number of versions removed.
    pub fn uninstall_package(&self, name: &str) -> Result<usize, InstallError> {
        require_system(self.scope.as_ref(), "uninstall packages")?;
        let _guard = self.lock.acquire()?;
        if self.lock.lock()?.package(name).is_none() {
            return Err(InstallError::NotFound(format!("Package {name}")));
        }
        self.uninstall_package_inner(name)
    }

    fn uninstall_package_inner(&self, name: &str) -> Result<usize, InstallError> {
        let versions: Vec<String> = self
            .lock
            .lock()?
            .package(name)
            .map(|p| p.versions().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        let mut removed = 0;
        for version in versions {
            match self.uninstall_version_inner(name, &version) {
                Ok(()) => removed += 1,
                Err(e) => {
                    self.reporter
                        .warning(&format!("Failed to uninstall {name}={version}: {e}"));
                }
            }
        }
        Ok(removed)
    }

    fn uninstall_version_inner(&self, name: &str, version: &str) -> Result<(), InstallError> {
        require_system(self.scope.as_ref(), "uninstall packages")?;
        let entry = self
            .lock
            .lock()?
            .version(name, version)
            .cloned()
            .ok_or_else(|| InstallError::NotFound(format!("Package {name}={version}")))?;
        let version = entry.version.as_str();
        let pkg_name = PackageName::new(name);
        let pkg_version = Version::new(version);
        self.reporter.removing(&pkg_name, &pkg_version);

        match self.lock.lock_mut(|lock| lock.remove_package_version(name, version)) {
            Ok(Some(_)) => {}
            Ok(None) => warn!("{name}={version} vanished from the lock store"),
            Err(e) => warn!("Failed to remove {name}={version} from the lock store: {e}"),
        }
        // Saving re-syncs the symlink registry.
        self.lock.save()?;

        self.remove_tree(&entry.location);

        for unit in &entry.execution_units {
            if let Err(e) = self.units.remove_unit(name, version, unit) {
                self.reporter
                    .warning(&format!("Failed to remove unit '{unit}': {e}"));
            }
        }

        self.reporter.done(&pkg_name, &pkg_version, "removed");
        info!("Uninstalled {name}={version}");
        Ok(())
    }

    fn remove_tree(&self, location: &Path) {
        if !location.exists() {
            self.reporter.warning(&format!(
                "Install location {} does not exist",
                location.display()
            ));
            return;
        }
        for entry in WalkDir::new(location).contents_first(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to walk {}: {e}", location.display());
                    continue;
                }
            };
            let res = if entry.file_type().is_dir() {
                fs::remove_dir(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            if let Err(e) = res {
                warn!("Failed to remove {}: {e}", entry.path().display());
            }
        }
    }

    pub fn package(&self, name: &str) -> Result<PackageEntry, InstallError> {
        self.lock
            .lock()?
            .package(name)
            .cloned()
            .ok_or_else(|| InstallError::NotFound(format!("Package {name}")))
    }

    /// Look up an installed version (`latest` accepted).
    pub fn package_version(&self, name: &str, version: &str) -> Result<VersionEntry, InstallError> {
        self.lock
            .lock()?
            .version(name, version)
            .cloned()
            .ok_or_else(|| InstallError::NotFound(format!("Package {name}={version}")))
    }

    pub fn installed_packages(&self) -> Result<Vec<PackageEntry>, InstallError> {
        Ok(self.lock.lock()?.packages.into_values().collect())
    }

    /// Dependency tree of `name`, or of every installed package.
    pub fn package_tree(&self, name: Option<&str>) -> Result<DependencyTree, InstallError> {
        if let Some(n) = name {
            if self.lock.lock()?.package(n).is_none() {
                return Err(InstallError::NotFound(format!("Package {n}")));
            }
        }
        Ok(self.lock.lock()?.dependency_tree(name))
    }
}

/// Write a payload below `base`, refusing paths that escape it.
fn write_payload(base: &Path, name: &str, data: &[u8]) -> Result<(), InstallError> {
    let relative = Path::new(name);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, PathComponent::ParentDir | PathComponent::Prefix(_)))
    {
        return Err(InstallError::context("Invalid payload path", name));
    }
    let target = base.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, data)?;
    debug!("Wrote {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_payload_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_payload(dir.path(), "../evil", b"x").is_err());
        assert!(write_payload(dir.path(), "/etc/evil", b"x").is_err());
        write_payload(dir.path(), "lib/a/b.txt", b"x").unwrap();
        assert_eq!(fs::read(dir.path().join("lib/a/b.txt")).unwrap(), b"x");
    }
}
