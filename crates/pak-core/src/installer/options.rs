use crate::fetch::FetchOptions;

/// Switches for one install call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Replace an installed version instead of failing.
    pub reinstall: bool,
    /// Do not resolve dependencies. Unmet static-link dependencies still fail.
    pub skip_dependencies: bool,
    /// Do not register repositories the package declares.
    pub skip_repositories: bool,
    /// Prefer static package assets when fetching.
    pub prefer_static: bool,
    /// Build remote dependencies from source instead of using package files.
    pub build_source: bool,
}

impl InstallOptions {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            prefer_static: self.prefer_static,
            build_source: self.build_source,
        }
    }
}
