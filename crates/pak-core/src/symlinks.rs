//! Symlink Registry.
//!
//! Maps a package to a user-invocable command name. The command name is the
//! last `.`-segment of the package name and the link points at the launcher of
//! the package's main unit for its latest locked version. Entries are
//! reconciled against the lock store after every lock save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pak_schema::{PackageLock, package_id, unit_id};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError};
use crate::lock::LockListener;
use crate::paths::Layout;
use crate::reporter::Reporter;
use crate::scope::{ScopeError, ScopeResolver, require_system};

#[derive(Error, Debug)]
pub enum SymlinkError {
    #[error(transparent)]
    AccessDenied(#[from] ScopeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Failed to update symlink {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkEntry {
    pub package: String,
    /// Execution unit the command runs.
    pub unit: String,
    /// Whether the filesystem link has been created.
    pub registered: bool,
}

impl SymlinkEntry {
    pub fn command_name(&self) -> &str {
        short_name(&self.package)
    }
}

fn short_name(package: &str) -> &str {
    package.rsplit('.').next().unwrap_or(package)
}

pub struct SymlinkRegistry {
    path: PathBuf,
    bin_dir: PathBuf,
    layout: Layout,
    scope: Arc<dyn ScopeResolver>,
    reporter: Arc<dyn Reporter>,
    entries: Mutex<Option<Vec<SymlinkEntry>>>,
}

impl std::fmt::Debug for SymlinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymlinkRegistry")
            .field("path", &self.path)
            .field("bin_dir", &self.bin_dir)
            .finish_non_exhaustive()
    }
}

impl SymlinkRegistry {
    pub fn new(
        layout: &Layout,
        bin_dir: impl Into<PathBuf>,
        scope: Arc<dyn ScopeResolver>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            path: layout.symlinks_file(),
            bin_dir: bin_dir.into(),
            layout: layout.clone(),
            scope,
            reporter,
            entries: Mutex::new(None),
        }
    }

    /// Loaded entries; a corrupt file is replaced by an empty registry.
    fn loaded(&self) -> MutexGuard<'_, Option<Vec<SymlinkEntry>>> {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let entries = codec::read(&self.path).unwrap_or_else(|e| {
                warn!("Symlink registry is unreadable, starting empty: {e}");
                Vec::new()
            });
            *guard = Some(entries);
        }
        guard
    }

    fn save(&self, entries: &[SymlinkEntry]) -> Result<(), SymlinkError> {
        codec::write_atomic(&self.path, &entries)?;
        debug!("Saved symlink registry {}", self.path.display());
        Ok(())
    }

    pub fn entries(&self) -> Vec<SymlinkEntry> {
        self.loaded().clone().unwrap_or_default()
    }

    pub fn link_path(&self, package: &str) -> PathBuf {
        self.bin_dir.join(short_name(package))
    }

    /// Expose `unit` of `package` as a command, replacing any previous entry.
    pub fn add(&self, package: &str, unit: &str) -> Result<(), SymlinkError> {
        require_system(self.scope.as_ref(), "add a symlink")?;
        self.remove(package)?;
        let mut guard = self.loaded();
        let entries = guard.get_or_insert_with(Vec::new);
        entries.push(SymlinkEntry {
            package: package.to_string(),
            unit: unit.to_string(),
            registered: false,
        });
        self.save(entries)?;
        info!("Added symlink entry for {package} -> {unit}");
        Ok(())
    }

    /// Drop the entry for `package`, deleting its link if it was created.
    pub fn remove(&self, package: &str) -> Result<(), SymlinkError> {
        require_system(self.scope.as_ref(), "remove a symlink")?;
        let mut guard = self.loaded();
        let entries = guard.get_or_insert_with(Vec::new);
        let Some(pos) = entries.iter().position(|e| e.package == package) else {
            return Ok(());
        };
        let entry = entries.remove(pos);
        if entry.registered {
            remove_link(&self.link_path(&entry.package))?;
        }
        self.save(entries)
    }

    /// Reconcile filesystem links with the lock.
    ///
    /// Unregistered entries get a link to the latest version's launcher unless
    /// the path is taken or the package is not locked. Registered entries
    /// whose package is gone are removed along with their link.
    pub fn sync(&self, lock: &PackageLock) -> Result<(), SymlinkError> {
        require_system(self.scope.as_ref(), "sync symlinks")?;
        let mut guard = self.loaded();
        let entries = guard.get_or_insert_with(Vec::new);
        let mut changed = false;

        entries.retain(|entry| {
            if lock.package(&entry.package).is_some() {
                return true;
            }
            if entry.registered {
                let link = self.link_path(&entry.package);
                if let Err(e) = remove_link(&link) {
                    self.reporter.warning(&e.to_string());
                }
                info!("Removed stale symlink {}", link.display());
            } else {
                debug!("Dropping symlink entry of uninstalled {}", entry.package);
            }
            changed = true;
            false
        });

        for entry in entries.iter_mut() {
            let link = self.link_path(&entry.package);
            let Some(target) = self.target(lock, entry) else {
                if !entry.registered {
                    self.reporter.warning(&format!(
                        "Package {} has no latest version, skipping symlink",
                        entry.package
                    ));
                }
                continue;
            };

            if entry.registered {
                // Re-point links left behind by an older latest version.
                if fs::read_link(&link).is_ok_and(|current| current != target) {
                    if let Err(e) = remove_link(&link).and_then(|()| create_link(&target, &link)) {
                        self.reporter.warning(&e.to_string());
                    }
                }
                continue;
            }

            if fs::symlink_metadata(&link).is_ok() {
                self.reporter.warning(&format!(
                    "Symlink {} already exists, skipping",
                    link.display()
                ));
                continue;
            }
            match create_link(&target, &link) {
                Ok(()) => {
                    info!("Linked {} -> {}", link.display(), target.display());
                    entry.registered = true;
                    changed = true;
                }
                Err(e) => {
                    self.reporter.warning(&format!(
                        "Failed to create symlink {}, skipping: {e}",
                        link.display()
                    ));
                }
            }
        }

        if changed {
            self.save(entries)?;
        }
        Ok(())
    }

    fn target(&self, lock: &PackageLock, entry: &SymlinkEntry) -> Option<PathBuf> {
        let latest = lock.package(&entry.package)?.latest_version.as_deref()?;
        Some(
            self.layout
                .unit_dir(&package_id(&entry.package, latest))
                .join(unit_id(&entry.unit)),
        )
    }
}

impl LockListener for SymlinkRegistry {
    fn lock_saved(&self, lock: &PackageLock) {
        if let Err(e) = self.sync(lock) {
            warn!("Symlink sync failed: {e}");
        }
    }
}

fn remove_link(path: &Path) -> Result<(), SymlinkError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(path).map_err(|source| SymlinkError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
        Ok(_) => {
            warn!("{} is not a symlink, leaving it in place", path.display());
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn create_link(target: &Path, link: &Path) -> Result<(), SymlinkError> {
    let io = |source| SymlinkError::Io {
        path: link.to_path_buf(),
        source,
    };
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(io)
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are only supported on unix hosts",
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use crate::scope::{FixedScope, Scope};
    use pak_schema::{Assembly, Package};

    fn registry(root: &Path) -> SymlinkRegistry {
        SymlinkRegistry::new(
            &Layout::new(root),
            root.join("bin"),
            Arc::new(FixedScope(Scope::System)),
            Arc::new(NullReporter),
        )
    }

    fn lock_with(name: &str, versions: &[&str]) -> PackageLock {
        let mut lock = PackageLock::new();
        for v in versions {
            let pkg = Package {
                assembly: Assembly {
                    package: name.to_string(),
                    version: (*v).to_string(),
                    ..Assembly::default()
                },
                ..Package::default()
            };
            lock.add_package(&pkg, "/x", vec![]);
        }
        lock
    }

    #[test]
    fn test_sync_links_latest_launcher() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add("com.example.foo", "main").unwrap();
        reg.sync(&lock_with("com.example.foo", &["1.0.0", "1.2.0"])).unwrap();

        let link = dir.path().join("bin/foo");
        let target = fs::read_link(&link).unwrap();
        let expected = Layout::new(dir.path())
            .unit_dir(&package_id("com.example.foo", "1.2.0"))
            .join(unit_id("main"));
        assert_eq!(target, expected);
        assert!(reg.entries()[0].registered);
    }

    #[test]
    fn test_sync_skips_foreign_file_and_unlocked_package() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/foo"), "mine").unwrap();
        reg.add("com.example.foo", "main").unwrap();
        reg.add("com.example.bar", "main").unwrap();

        reg.sync(&lock_with("com.example.foo", &["1.0.0"])).unwrap();
        let entries = reg.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package, "com.example.foo");
        assert!(!entries[0].registered);
        assert_eq!(fs::read_to_string(dir.path().join("bin/foo")).unwrap(), "mine");
        assert!(!dir.path().join("bin/bar").exists());
    }

    #[test]
    fn test_sync_drops_unregistered_entries_of_unlocked_packages() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add("com.example.bar", "main").unwrap();
        reg.sync(&PackageLock::new()).unwrap();
        assert!(reg.entries().is_empty());
        assert!(registry(dir.path()).entries().is_empty());
    }

    #[test]
    fn test_sync_drops_uninstalled_packages() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.add("com.example.foo", "main").unwrap();
        reg.sync(&lock_with("com.example.foo", &["1.0.0"])).unwrap();
        reg.sync(&PackageLock::new()).unwrap();
        assert!(reg.entries().is_empty());
        assert!(fs::symlink_metadata(dir.path().join("bin/foo")).is_err());
    }

    #[test]
    fn test_re_add_replaces_entry_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let lock = lock_with("com.example.foo", &["1.0.0"]);
        reg.add("com.example.foo", "main").unwrap();
        reg.sync(&lock).unwrap();
        reg.add("com.example.foo", "other").unwrap();
        assert_eq!(reg.entries().len(), 1);
        assert!(!reg.entries()[0].registered);
        assert!(fs::symlink_metadata(dir.path().join("bin/foo")).is_err());
        reg.sync(&lock).unwrap();
        assert!(fs::read_link(dir.path().join("bin/foo"))
            .unwrap()
            .ends_with(unit_id("other")));
    }

    #[test]
    fn test_registry_persists() {
        let dir = tempfile::tempdir().unwrap();
        registry(dir.path()).add("com.example.foo", "main").unwrap();
        assert_eq!(registry(dir.path()).entries().len(), 1);
    }
}
