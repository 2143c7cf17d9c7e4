//! Reporter trait for dependency injection
//!
//! Core logic reports progress and status through this trait without being
//! coupled to a terminal implementation.

use pak_schema::{PackageName, Version};

pub trait Reporter: Send + Sync {
    /// A new section or phase has started (e.g. "Installing", "Fetching").
    fn section(&self, title: &str);

    /// Install progress of a package; `current` never exceeds `total`.
    fn installing(&self, name: &PackageName, version: &Version, current: u64, total: u64);

    /// A package version is being removed.
    fn removing(&self, name: &PackageName, version: &Version);

    /// A package operation completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// A package operation failed.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn installing(&self, name: &PackageName, version: &Version, current: u64, total: u64) {
        (**self).installing(name, version, current, total);
    }
    fn removing(&self, name: &PackageName, version: &Version) {
        (**self).removing(name, version);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A no-op reporter for silent operations (e.g., embedding, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn installing(&self, _: &PackageName, _: &Version, _: u64, _: u64) {}
    fn removing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
