//! Errors for install and uninstall operations

use pak_schema::PackageError;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::lock::LockError;
use crate::scope::ScopeError;
use crate::sources::SourceError;
use crate::strategy::StrategyError;
use crate::symlinks::SymlinkError;
use crate::units::UnitError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    AccessDenied(#[from] ScopeError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{package}={version} is already installed")]
    AlreadyInstalled { package: String, version: String },

    #[error("No installer is available for compiler extension '{0}'")]
    UnsupportedExtension(String),

    #[error("The runner '{0}' is not supported")]
    UnsupportedRunner(String),

    #[error("Lock store error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Dependency {name}={version} is not installed and has no usable source")]
    MissingDependency { name: String, version: String },

    #[error("Dependency {0} must be statically linked but is not installed")]
    StaticDependency(String),

    #[error(transparent)]
    Unit(UnitError),

    #[error("Invalid package: {0}")]
    Package(#[from] PackageError),

    #[error("Installer strategy failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Symlink(SymlinkError),

    #[error(transparent)]
    Source(SourceError),

    #[error("An exit handler ended the process with code {0}")]
    Terminated(i32),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

impl From<UnitError> for InstallError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::AccessDenied(e) => Self::AccessDenied(e),
            UnitError::UnsupportedRunner(r) => Self::UnsupportedRunner(r),
            other => Self::Unit(other),
        }
    }
}

impl From<SymlinkError> for InstallError {
    fn from(err: SymlinkError) -> Self {
        match err {
            SymlinkError::AccessDenied(e) => Self::AccessDenied(e),
            other => Self::Symlink(other),
        }
    }
}

impl From<SourceError> for InstallError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::AccessDenied(e) => Self::AccessDenied(e),
            other => Self::Source(other),
        }
    }
}

impl From<anyhow::Error> for InstallError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
