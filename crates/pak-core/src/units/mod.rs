//! Execution Unit Registry.
//!
//! Units are stored per package version under `runners/`:
//!
//! ```text
//! runners/<package_id>.inx              index (postcard)
//! runners/<package_id>/<unit_id><ext>   script payload
//! runners/<package_id>/<unit_id>        launcher (0755)
//! ```
//!
//! `package_id` and `unit_id` come from [`pak_schema::package_id`] and
//! [`pak_schema::unit_id`], so arbitrary names map to safe, stable paths.

mod index;
mod launcher;
mod process;
mod registry;

use std::path::PathBuf;

use pak_schema::Runner;
use thiserror::Error;

use crate::codec::CodecError;
use crate::scope::ScopeError;

pub use index::{IndexedUnit, UnitIndex};
pub use launcher::launcher_script;
pub use process::{ProcessOutcome, ProcessSpec};
pub use registry::{ExitAction, MAX_CHAIN_DEPTH, UnitRegistry, select_exit_handlers};

#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    AccessDenied(#[from] ScopeError),

    #[error("The runner '{0}' is not supported")]
    UnsupportedRunner(String),

    #[error("The interpreter for runner '{0}' was not found on this host")]
    RunnerUnavailable(Runner),

    #[error("There are no available units for '{package}={version}'")]
    NoUnits { package: String, version: String },

    #[error("The execution unit '{name}' was not found for '{package}={version}'")]
    UnitNotFound {
        name: String,
        package: String,
        version: String,
    },

    #[error("Follow-up chain starting at '{name}' exceeded {depth} units")]
    ChainTooDeep { name: String, depth: usize },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of executing a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitExit {
    /// Exit code of the interpreter; `None` if it was killed or never started.
    pub code: Option<i32>,
    /// Set when an end-process exit handle fired; the caller should exit with it.
    pub terminate: Option<i32>,
}

impl UnitExit {
    pub fn success(&self) -> bool {
        self.code == Some(0) && self.terminate.is_none()
    }
}

/// Parse a policy's runner identifier.
pub fn parse_runner(id: &str) -> Result<Runner, UnitError> {
    id.parse()
        .map_err(|_| UnitError::UnsupportedRunner(id.to_string()))
}
