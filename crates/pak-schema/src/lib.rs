//! Shared data model for pak.
//!
//! Package containers, the lock model, hashed on-disk ids and remote locator
//! parsing live here so that the runtime and the CLI agree on one set of
//! types.

pub mod hash;
pub mod lock;
pub mod package;
pub mod remote;
pub mod types;

// Re-exports
pub use hash::{HashId, package_id, unit_id};
pub use lock::{DependencyEntry, DependencyTree, PackageEntry, PackageLock, VersionEntry};
pub use package::{
    Assembly, Component, Dependency, Execute, ExecutionPolicy, ExecutionUnit, ExitHandle,
    ExitHandlers, Header, InstallerHooks, Package, PackageError, PackageOptions, Resource,
    UpdateSource, is_valid_package_name, is_valid_version,
};
pub use remote::{
    Credential, DefinedRemoteSource, InvalidLocator, RemotePackageInput, RemoteSourceKind,
    RepositoryFiles, RepositoryQueryResults,
};
pub use types::*;
