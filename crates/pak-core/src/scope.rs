//! Privilege scope.
//!
//! Only the system scope may mutate shared state. Every mutating entry point
//! calls [`require_system`] before touching disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Privilege context an operation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// May mutate shared state.
    System,
    /// Read-mostly.
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::System => "system",
            Scope::User => "user",
        })
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Scope::System),
            "user" => Ok(Scope::User),
            other => Err(format!("unknown scope '{other}'")),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Insufficient permissions: {action} requires system scope (current scope: {current})")]
    AccessDenied { action: String, current: Scope },
}

/// Answers "which scope am I running under".
pub trait ScopeResolver: Send + Sync {
    fn scope(&self) -> Scope;
}

impl<T: ScopeResolver + ?Sized> ScopeResolver for std::sync::Arc<T> {
    fn scope(&self) -> Scope {
        (**self).scope()
    }
}

/// Always reports the same scope.
#[derive(Debug, Clone, Copy)]
pub struct FixedScope(pub Scope);

impl ScopeResolver for FixedScope {
    fn scope(&self) -> Scope {
        self.0
    }
}

/// Reads `PAK_SCOPE`, falling back to a writability probe of the system root.
#[derive(Debug, Clone)]
pub struct DetectedScope {
    system_root: PathBuf,
}

impl DetectedScope {
    pub fn new(system_root: impl Into<PathBuf>) -> Self {
        Self {
            system_root: system_root.into(),
        }
    }
}

impl ScopeResolver for DetectedScope {
    fn scope(&self) -> Scope {
        if let Ok(val) = std::env::var("PAK_SCOPE") {
            match val.parse() {
                Ok(scope) => return scope,
                Err(e) => tracing::warn!("Ignoring PAK_SCOPE: {e}"),
            }
        }
        if is_writable(&self.system_root) {
            Scope::System
        } else {
            Scope::User
        }
    }
}

/// Probe the nearest existing ancestor of `path` by creating a temp file in it.
fn is_writable(path: &Path) -> bool {
    let Some(existing) = path.ancestors().find(|p| p.is_dir()) else {
        return false;
    };
    tempfile::Builder::new()
        .prefix(".pak-probe")
        .tempfile_in(existing)
        .is_ok()
}

/// Fail with [`ScopeError::AccessDenied`] unless running under the system scope.
pub fn require_system(resolver: &dyn ScopeResolver, action: &str) -> Result<(), ScopeError> {
    match resolver.scope() {
        Scope::System => Ok(()),
        current => Err(ScopeError::AccessDenied {
            action: action.to_string(),
            current,
        }),
    }
}
