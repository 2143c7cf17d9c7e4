use std::path::{Path, PathBuf};

use pak_schema::HashId;

/// Default root of the system scope.
pub const SYSTEM_ROOT: &str = "/var/lib/pak";

/// Returns the system root (`PAK_ROOT` or `/var/lib/pak`).
///
/// Both scopes read this root; only the system scope may write to it.
pub fn system_root() -> PathBuf {
    std::env::var_os("PAK_ROOT").map_or_else(|| PathBuf::from(SYSTEM_ROOT), PathBuf::from)
}

/// Every on-disk location used by one scope, derived from a single root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock store: `<root>/package.lck`
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("package.lck")
    }

    /// Advisory lock guarding lock-store mutation: `<root>/package.lck.lock`
    pub fn lock_guard_file(&self) -> PathBuf {
        self.root.join("package.lck.lock")
    }

    /// Symlink registry: `<root>/symlinks.reg`
    pub fn symlinks_file(&self) -> PathBuf {
        self.root.join("symlinks.reg")
    }

    /// Remote sources registry: `<root>/sources.reg`
    pub fn sources_file(&self) -> PathBuf {
        self.root.join("sources.reg")
    }

    /// Execution unit storage: `<root>/runners`
    pub fn runners_dir(&self) -> PathBuf {
        self.root.join("runners")
    }

    /// Unit index of one package version: `<root>/runners/<id>.inx`
    pub fn unit_index(&self, package_id: &HashId) -> PathBuf {
        self.runners_dir().join(format!("{package_id}.inx"))
    }

    /// Script and launcher directory of one package version: `<root>/runners/<id>`
    pub fn unit_dir(&self, package_id: &HashId) -> PathBuf {
        self.runners_dir().join(package_id)
    }

    /// Installed packages: `<root>/packages`
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Install tree of one package version: `<root>/packages/<name>=<version>`
    pub fn install_dir(&self, package: &str, version: &str) -> PathBuf {
        self.packages_dir().join(format!("{package}={version}"))
    }

    /// Scratch space on the same volume: `<root>/tmp`
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Configuration file: `<root>/config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

/// The sub-directories of one package version's install tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationPaths {
    /// `<install>`
    pub root: PathBuf,
    /// `<install>/bin`
    pub bin: PathBuf,
    /// `<install>/data`
    pub data: PathBuf,
    /// `<install>/source`
    pub source: PathBuf,
}

impl InstallationPaths {
    /// Derive the sub-paths of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            bin: root.join("bin"),
            data: root.join("data"),
            source: root.join("source"),
            root,
        }
    }

    /// Create every directory.
    pub fn create(&self) -> std::io::Result<()> {
        for dir in [&self.root, &self.bin, &self.data, &self.source] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths_share_root() {
        let layout = Layout::new("/tmp/pak");
        assert_eq!(layout.lock_file(), PathBuf::from("/tmp/pak/package.lck"));
        assert_eq!(
            layout.install_dir("com.example.foo", "1.0.0"),
            PathBuf::from("/tmp/pak/packages/com.example.foo=1.0.0")
        );
        let id = pak_schema::package_id("com.example.foo", "1.0.0");
        assert!(layout.unit_index(&id).ends_with(format!("{id}.inx")));
        assert_eq!(layout.unit_dir(&id).parent(), Some(layout.runners_dir().as_path()));
    }

    #[test]
    fn test_installation_paths() {
        let paths = InstallationPaths::new("/opt/x");
        assert_eq!(paths.bin, PathBuf::from("/opt/x/bin"));
        assert_eq!(paths.data, PathBuf::from("/opt/x/data"));
        assert_eq!(paths.source, PathBuf::from("/opt/x/source"));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.org/a/b/tool.pak"), "tool.pak");
        assert_eq!(filename_from_url("https://x.org/a.zip?token=1"), "a.zip");
    }
}
