//! Remote Sources registry.
//!
//! User-defined sources are persisted in `sources.reg`. The builtin `github`
//! and `gitlab` sources always exist and cannot be shadowed or removed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::path::PathBuf;

use pak_schema::{DefinedRemoteSource, RemoteSourceKind};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::{self, CodecError};
use crate::paths::Layout;
use crate::scope::{ScopeError, ScopeResolver, require_system};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    AccessDenied(#[from] ScopeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Remote source '{0}' is not defined")]
    Undefined(String),
}

/// Sources every installation knows about.
pub fn builtin_sources() -> Vec<DefinedRemoteSource> {
    vec![
        DefinedRemoteSource {
            name: "github".to_string(),
            kind: RemoteSourceKind::Github,
            host: "api.github.com".to_string(),
            ssl: true,
        },
        DefinedRemoteSource {
            name: "gitlab".to_string(),
            kind: RemoteSourceKind::Gitlab,
            host: "gitlab.com".to_string(),
            ssl: true,
        },
    ]
}

pub fn is_builtin(name: &str) -> bool {
    builtin_sources().iter().any(|s| s.name.eq_ignore_ascii_case(name))
}

pub struct SourceRegistry {
    path: PathBuf,
    scope: Arc<dyn ScopeResolver>,
    sources: Mutex<Option<Vec<DefinedRemoteSource>>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SourceRegistry {
    pub fn new(layout: &Layout, scope: Arc<dyn ScopeResolver>) -> Self {
        Self {
            path: layout.sources_file(),
            scope,
            sources: Mutex::new(None),
        }
    }

    fn loaded(&self) -> Result<MutexGuard<'_, Option<Vec<DefinedRemoteSource>>>, SourceError> {
        let mut guard = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(codec::read(&self.path)?);
        }
        Ok(guard)
    }

    /// User-defined sources as stored on disk.
    pub fn load(&self) -> Result<Vec<DefinedRemoteSource>, SourceError> {
        Ok(self.loaded()?.clone().unwrap_or_default())
    }

    pub fn save(&self) -> Result<(), SourceError> {
        require_system(self.scope.as_ref(), "save remote sources")?;
        let guard = self.loaded()?;
        let sources = guard.as_deref().unwrap_or_default();
        codec::write_atomic(&self.path, &sources)?;
        debug!("Saved {} remote sources", sources.len());
        Ok(())
    }

    /// Define a source. Returns false if the name is taken (builtins included).
    pub fn add(&self, source: DefinedRemoteSource) -> Result<bool, SourceError> {
        require_system(self.scope.as_ref(), "add a remote source")?;
        if is_builtin(&source.name) {
            return Ok(false);
        }
        {
            let mut guard = self.loaded()?;
            let sources = guard.get_or_insert_with(Vec::new);
            if sources.iter().any(|s| s.name.eq_ignore_ascii_case(&source.name)) {
                return Ok(false);
            }
            info!("Defined remote source '{}' ({})", source.name, source.host);
            sources.push(source);
        }
        self.save()?;
        Ok(true)
    }

    /// Remove a user-defined source. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, SourceError> {
        require_system(self.scope.as_ref(), "remove a remote source")?;
        {
            let mut guard = self.loaded()?;
            let sources = guard.get_or_insert_with(Vec::new);
            let before = sources.len();
            sources.retain(|s| !s.name.eq_ignore_ascii_case(name));
            if sources.len() == before {
                return Ok(false);
            }
        }
        self.save()?;
        info!("Removed remote source '{name}'");
        Ok(true)
    }

    /// Look a source up by name, builtins first.
    pub fn get(&self, name: &str) -> Result<Option<DefinedRemoteSource>, SourceError> {
        if let Some(b) = builtin_sources()
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            return Ok(Some(b));
        }
        Ok(self
            .load()?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    /// Builtins followed by user-defined sources.
    pub fn list(&self) -> Result<Vec<DefinedRemoteSource>, SourceError> {
        let mut all = builtin_sources();
        all.extend(self.load()?);
        Ok(all)
    }
}
