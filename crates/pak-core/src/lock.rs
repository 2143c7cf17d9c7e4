//! Package Lock Store.
//!
//! Load/cache/persist around [`PackageLock`]. Query and mutation logic lives
//! on the lock itself; this module gates writes on the system scope, caches
//! the decoded lock for the lifetime of the store and tells listeners (the
//! symlink registry) after every save.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use pak_schema::PackageLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError};
use crate::paths::Layout;
use crate::scope::{ScopeError, ScopeResolver, require_system};

#[derive(Error, Debug)]
pub enum LockError {
    #[error(transparent)]
    AccessDenied(#[from] ScopeError),

    #[error("Lock store {path} is corrupt: {source}")]
    Corrupt { path: PathBuf, source: CodecError },

    #[error(transparent)]
    Codec(CodecError),

    #[error("Could not acquire lock on {path}: {source}")]
    Busy {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<CodecError> for LockError {
    fn from(err: CodecError) -> Self {
        if let CodecError::Decode { path, .. } = &err {
            let path = path.clone();
            return Self::Corrupt { path, source: err };
        }
        Self::Codec(err)
    }
}

/// Notified after every successful [`LockStore::save`].
pub trait LockListener: Send + Sync {
    fn lock_saved(&self, lock: &PackageLock);
}

/// Exclusive advisory lock over lock-store mutation, released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock-store guard: {e}");
        }
    }
}

pub struct LockStore {
    path: PathBuf,
    guard_path: PathBuf,
    scope: Arc<dyn ScopeResolver>,
    cache: Mutex<Option<PackageLock>>,
    listeners: Mutex<Vec<Arc<dyn LockListener>>>,
}

impl std::fmt::Debug for LockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LockStore {
    pub fn new(layout: &Layout, scope: Arc<dyn ScopeResolver>) -> Self {
        Self {
            path: layout.lock_file(),
            guard_path: layout.lock_guard_file(),
            scope,
            cache: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_listener(&self, listener: Arc<dyn LockListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn cache(&self) -> MutexGuard<'_, Option<PackageLock>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached lock, reading it from disk on first use. A missing or empty
    /// file yields an empty lock.
    pub fn load(&self) -> Result<PackageLock, LockError> {
        let mut cache = self.cache();
        if let Some(lock) = cache.as_ref() {
            return Ok(lock.clone());
        }
        let lock: PackageLock = codec::read(&self.path)?;
        debug!(
            "Loaded lock store {} ({} packages)",
            self.path.display(),
            lock.packages.len()
        );
        *cache = Some(lock.clone());
        Ok(lock)
    }

    /// Load, or start fresh if the stored lock cannot be decoded.
    pub fn construct(&self) -> PackageLock {
        match self.load() {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Starting a fresh lock store: {e}");
                let lock = PackageLock::new();
                *self.cache() = Some(lock.clone());
                lock
            }
        }
    }

    /// Snapshot of the current lock.
    pub fn lock(&self) -> Result<PackageLock, LockError> {
        self.load()
    }

    /// Mutate the cached lock in place. Call [`Self::save`] to persist.
    pub fn lock_mut<R>(&self, f: impl FnOnce(&mut PackageLock) -> R) -> Result<R, LockError> {
        self.load()?;
        let mut cache = self.cache();
        let lock = cache.get_or_insert_with(PackageLock::new);
        Ok(f(lock))
    }

    /// Persist the cached lock and notify listeners. No-op if nothing is loaded.
    pub fn save(&self) -> Result<(), LockError> {
        require_system(self.scope.as_ref(), "save the lock store")?;
        let snapshot = {
            let cache = self.cache();
            let Some(lock) = cache.as_ref() else {
                return Ok(());
            };
            codec::write_atomic(&self.path, lock)?;
            lock.clone()
        };
        info!("Saved lock store {}", self.path.display());

        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.lock_saved(&snapshot);
        }
        Ok(())
    }

    /// Block until this process holds the exclusive mutation lock.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        require_system(self.scope.as_ref(), "lock the lock store")?;
        let busy = |source| LockError::Busy {
            path: self.guard_path.clone(),
            source,
        };
        if let Some(parent) = self.guard_path.parent() {
            std::fs::create_dir_all(parent).map_err(busy)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.guard_path)
            .map_err(busy)?;
        FileExt::lock_exclusive(&file).map_err(busy)?;
        // A lock taken by another process may have changed the file.
        *self.cache() = None;
        Ok(LockGuard { file })
    }
}
