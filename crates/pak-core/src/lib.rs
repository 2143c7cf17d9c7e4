pub mod codec;
pub mod config;
pub mod constants;
pub mod container;
pub mod fetch;
pub mod installer;
pub mod lock;
pub mod paths;
pub mod runner;
pub mod scope;
pub mod sources;
pub mod strategy;
pub mod symlinks;
pub mod units;

pub mod reporter;

pub use config::Config;
pub use installer::{InstallError, InstallOptions, InstallOutcome, PackageManager};
pub use lock::LockStore;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};
pub use scope::{DetectedScope, FixedScope, Scope, ScopeResolver};
pub use strategy::InstallerStrategy;
pub use units::{UnitExit, UnitRegistry};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pak-core/", env!("CARGO_PKG_VERSION"));
