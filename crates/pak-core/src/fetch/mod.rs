//! Remote Fetch Cascade.
//!
//! A remote dependency locator (`vendor/package[=version]@source`) is turned
//! into a local package file by querying the named source and then trying,
//! in order, the zip archive, the tarball, the prebuilt package file and a
//! git checkout of the matching tag. The first attempt that yields a package
//! wins; every failed attempt is kept in [`AttemptFailures`].

pub mod archive;
pub mod compiler;
pub mod git;
pub mod services;
pub mod transport;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pak_schema::{
    Credential, InvalidLocator, RemotePackageInput, RepositoryFiles, RepositoryQueryResults,
};
use tempfile::TempDir;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

pub use archive::ExtractError;
pub use compiler::{PrebuiltLocator, SourceCompiler};
pub use git::{GitClient, SystemGit};
pub use services::{GithubService, GitlabService, RepositoryService, service_for};
pub use transport::{HttpTransport, Transport};

use crate::paths::filename_from_url;
use crate::sources::{SourceError, SourceRegistry, is_builtin};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("{0}")]
    Git(String),

    #[error("No package file found in {}", .0.display())]
    Compile(PathBuf),

    #[error(transparent)]
    InvalidLocator(#[from] InvalidLocator),

    #[error("Locator '{0}' does not name a remote source")]
    MissingSource(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Remote source '{0}' is not defined")]
    UndefinedSource(String),

    #[error("No release of {package} matches version {version}")]
    NoRelease { package: String, version: String },

    #[error("No assets found for {0}")]
    NoAssets(String),

    #[error("Every fetch attempt for {package} failed: {failures}")]
    Exhausted {
        package: String,
        failures: AttemptFailures,
    },
}

/// Asset kinds, in the order the cascade tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Zipball,
    Tarball,
    Package,
    Git,
}

impl AttemptKind {
    pub const ORDER: [AttemptKind; 4] = [Self::Zipball, Self::Tarball, Self::Package, Self::Git];

    /// URL this kind would use, if the source offered one.
    pub fn url(self, files: &RepositoryFiles) -> Option<&str> {
        match self {
            Self::Zipball => files.zipball_url.as_deref(),
            Self::Tarball => files.tarball_url.as_deref(),
            Self::Package => files.package_url.as_deref(),
            Self::Git => files
                .git_http_url
                .as_deref()
                .or(files.git_ssh_url.as_deref()),
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zipball => "zip archive",
            Self::Tarball => "tarball",
            Self::Package => "package file",
            Self::Git => "git repository",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub kind: AttemptKind,
    pub message: String,
}

/// Failed attempts of one cascade run, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptFailures(Vec<FetchAttempt>);

impl AttemptFailures {
    pub fn push(&mut self, kind: AttemptKind, message: impl Into<String>) {
        self.0.push(FetchAttempt {
            kind,
            message: message.into(),
        });
    }

    pub fn attempts(&self) -> &[FetchAttempt] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages with adjacent duplicates collapsed.
    pub fn messages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.0.iter().map(|a| a.message.as_str()).collect();
        out.dedup();
        out
    }
}

impl fmt::Display for AttemptFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Prefer `*-static.pak` assets.
    pub prefer_static: bool,
    /// Skip the prebuilt package file and build from source.
    pub build_source: bool,
}

/// A package file produced by the cascade.
///
/// The file lives in a scratch directory that is deleted when this value is
/// dropped.
#[derive(Debug)]
pub struct FetchedPackage {
    pub path: PathBuf,
    pub version: Option<String>,
    pub kind: AttemptKind,
    _workspace: TempDir,
}

pub struct RemoteFetcher {
    sources: Arc<SourceRegistry>,
    transport: Arc<dyn Transport>,
    git: Arc<dyn GitClient>,
    compiler: Arc<dyn SourceCompiler>,
    runtime: Handle,
    work_dir: PathBuf,
}

impl fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl RemoteFetcher {
    /// `runtime` drives the async transport; callers must not be running on
    /// one of its worker threads.
    pub fn new(
        sources: Arc<SourceRegistry>,
        transport: Arc<dyn Transport>,
        runtime: Handle,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            transport,
            git: Arc::new(SystemGit),
            compiler: Arc::new(PrebuiltLocator),
            runtime,
            work_dir: work_dir.into(),
        }
    }

    pub fn with_git(mut self, git: Arc<dyn GitClient>) -> Self {
        self.git = git;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn SourceCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Resolve `locator` into a local package file.
    pub fn fetch(
        &self,
        locator: &str,
        options: FetchOptions,
        credential: Option<&Credential>,
    ) -> Result<FetchedPackage, FetchError> {
        let input: RemotePackageInput = locator.parse()?;
        let name = input
            .source
            .clone()
            .ok_or_else(|| FetchError::MissingSource(locator.to_string()))?;
        let source = self
            .sources
            .get(&name)?
            .ok_or_else(|| FetchError::UndefinedSource(name.clone()))?;
        debug!(
            "Resolved source '{name}' ({}, {})",
            source.host,
            if is_builtin(&name) { "builtin" } else { "user-defined" }
        );

        let service = service_for(source, Arc::clone(&self.transport));
        let results = self.query(service.as_ref(), &input, options, credential);
        if results.files.is_empty() {
            return Err(FetchError::NoAssets(input.to_string()));
        }
        let version = results
            .version
            .clone()
            .unwrap_or_else(|| input.version_or_latest().to_string());

        fs::create_dir_all(&self.work_dir)?;
        let workspace = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(&self.work_dir)?;

        let mut failures = AttemptFailures::default();
        for kind in AttemptKind::ORDER {
            let Some(url) = kind.url(&results.files) else {
                continue;
            };
            if kind == AttemptKind::Package && options.build_source {
                debug!("Skipping {kind} for {input}: building from source");
                continue;
            }
            info!("Fetching {input} via {kind} ({url})");
            match self.attempt(kind, url, &version, workspace.path(), options, credential) {
                Ok(path) => {
                    info!("Fetched {input} via {kind}: {}", path.display());
                    return Ok(FetchedPackage {
                        path,
                        version: results.version,
                        kind,
                        _workspace: workspace,
                    });
                }
                Err(e) => {
                    warn!("Fetching {input} via {kind} failed: {e}");
                    failures.push(kind, e.to_string());
                }
            }
        }

        if failures.is_empty() {
            return Err(FetchError::NoAssets(input.to_string()));
        }
        Err(FetchError::Exhausted {
            package: input.to_string(),
            failures,
        })
    }

    /// Merge native-package, git and release metadata in that order.
    /// A failing query is logged and contributes nothing.
    fn query(
        &self,
        service: &dyn RepositoryService,
        input: &RemotePackageInput,
        options: FetchOptions,
        credential: Option<&Credential>,
    ) -> RepositoryQueryResults {
        let mut merged = RepositoryQueryResults::default();
        let mut absorb = |what: &str, result: Result<RepositoryQueryResults, FetchError>| match result {
            Ok(r) => merged.merge(r),
            Err(e) => warn!("Querying {what} for {input} failed: {e}"),
        };

        if !options.build_source {
            absorb(
                "native package",
                self.runtime
                    .block_on(service.release_package(input, options.prefer_static, credential)),
            );
        }
        absorb(
            "git repository",
            self.runtime.block_on(service.git_repository(input, credential)),
        );
        absorb(
            "release",
            self.runtime.block_on(service.release_archive(input, credential)),
        );
        merged
    }

    fn attempt(
        &self,
        kind: AttemptKind,
        url: &str,
        version: &str,
        workspace: &Path,
        options: FetchOptions,
        credential: Option<&Credential>,
    ) -> Result<PathBuf, FetchError> {
        match kind {
            AttemptKind::Zipball => {
                let file = workspace.join("source.zip");
                self.download(url, &file, credential)?;
                let dir = workspace.join("zipball");
                archive::extract_zip(&file, &dir)?;
                archive::strip_components(&dir)?;
                self.compiler.compile(&dir, options.prefer_static)
            }
            AttemptKind::Tarball => {
                let file = workspace.join("source.tar.gz");
                self.download(url, &file, credential)?;
                let dir = workspace.join("tarball");
                archive::extract_tar_gz(&file, &dir)?;
                archive::strip_components(&dir)?;
                self.compiler.compile(&dir, options.prefer_static)
            }
            AttemptKind::Package => {
                let name = match filename_from_url(url) {
                    n if n.ends_with(".pak") => n.to_string(),
                    _ => "package.pak".to_string(),
                };
                let file = workspace.join(name);
                self.download(url, &file, credential)?;
                Ok(file)
            }
            AttemptKind::Git => {
                let dir = workspace.join("git");
                self.git.clone_repo(url, &dir)?;
                let tags = self.git.tags(&dir)?;
                let tag = git::matching_tag(&tags, version).ok_or_else(|| {
                    FetchError::Git(format!("No tag matches version {version}"))
                })?;
                self.git.checkout(&dir, &tag)?;
                self.compiler.compile(&dir, options.prefer_static)
            }
        }
    }

    fn download(
        &self,
        url: &str,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<(), FetchError> {
        self.runtime
            .block_on(self.transport.download(url, dest, credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Layout;
    use crate::scope::{FixedScope, Scope};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Serves canned JSON and download bodies; downloads of unknown URLs fail.
    #[derive(Default)]
    struct FakeTransport {
        json: BTreeMap<String, serde_json::Value>,
        bodies: BTreeMap<String, Vec<u8>>,
        downloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get_json(
            &self,
            url: &str,
            _: Option<&Credential>,
        ) -> Result<serde_json::Value, FetchError> {
            self.json.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn download(
            &self,
            url: &str,
            dest: &Path,
            _: Option<&Credential>,
        ) -> Result<(), FetchError> {
            self.downloads.lock().unwrap().push(url.to_string());
            let body = self.bodies.get(url).ok_or(FetchError::Status {
                url: url.to_string(),
                status: 500,
            })?;
            fs::write(dest, body)?;
            Ok(())
        }
    }

    /// Clones into an empty tree with the given tags.
    struct FakeGit {
        tags: Vec<String>,
        with_package: bool,
    }

    impl GitClient for FakeGit {
        fn clone_repo(&self, _: &str, dest: &Path) -> Result<(), FetchError> {
            fs::create_dir_all(dest)?;
            Ok(())
        }

        fn tags(&self, _: &Path) -> Result<Vec<String>, FetchError> {
            Ok(self.tags.clone())
        }

        fn checkout(&self, repo: &Path, _: &str) -> Result<(), FetchError> {
            if self.with_package {
                fs::write(repo.join("tool.pak"), b"pak")?;
            }
            Ok(())
        }
    }

    fn tar_gz_with(path: &str) -> Vec<u8> {
        let gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, b"pak".as_slice()).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn releases(files: &RepositoryFiles) -> serde_json::Value {
        serde_json::json!([{
            "tag_name": "v1.0.0",
            "name": "Tool",
            "body": "notes",
            "zipball_url": files.zipball_url,
            "tarball_url": files.tarball_url,
            "assets": files.package_url.as_ref().map(|u| vec![serde_json::json!({
                "name": "tool.pak", "browser_download_url": u
            })]).unwrap_or_default()
        }])
    }

    struct Fixture {
        _rt: tokio::runtime::Runtime,
        _dir: tempfile::TempDir,
        transport: Arc<FakeTransport>,
        fetcher: RemoteFetcher,
    }

    fn fixture(files: RepositoryFiles, bodies: &[(&str, Vec<u8>)], git: FakeGit) -> Fixture {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let sources = Arc::new(SourceRegistry::new(
            &layout,
            Arc::new(FixedScope(Scope::System)),
        ));

        let mut transport = FakeTransport::default();
        transport.json.insert(
            "https://api.github.com/repos/acme/tool/releases".to_string(),
            releases(&files),
        );
        if let Some(http) = &files.git_http_url {
            transport.json.insert(
                "https://api.github.com/repos/acme/tool".to_string(),
                serde_json::json!({ "name": "tool", "clone_url": http }),
            );
        }
        for (url, body) in bodies {
            transport.bodies.insert((*url).to_string(), body.clone());
        }
        let transport = Arc::new(transport);

        let fetcher = RemoteFetcher::new(
            sources,
            transport.clone(),
            rt.handle().clone(),
            layout.tmp_dir(),
        )
        .with_git(Arc::new(git));
        Fixture {
            _rt: rt,
            _dir: dir,
            transport,
            fetcher,
        }
    }

    fn no_git() -> FakeGit {
        FakeGit {
            tags: vec![],
            with_package: false,
        }
    }

    #[test]
    fn test_failed_zip_falls_through_to_tarball() {
        let files = RepositoryFiles {
            zipball_url: Some("https://dl/tool.zip".to_string()),
            tarball_url: Some("https://dl/tool.tar.gz".to_string()),
            git_http_url: Some("https://git/acme/tool.git".to_string()),
            ..RepositoryFiles::default()
        };
        let f = fixture(
            files,
            &[("https://dl/tool.tar.gz", tar_gz_with("tool-1.0.0/dist/tool.pak"))],
            no_git(),
        );

        let fetched = f
            .fetcher
            .fetch("acme/tool@github", FetchOptions::default(), None)
            .unwrap();
        assert_eq!(fetched.kind, AttemptKind::Tarball);
        assert!(fetched.path.ends_with("dist/tool.pak"));
        assert_eq!(fetched.version.as_deref(), Some("1.0.0"));
        assert_eq!(
            *f.transport.downloads.lock().unwrap(),
            vec!["https://dl/tool.zip", "https://dl/tool.tar.gz"]
        );
    }

    #[test]
    fn test_all_attempts_fail_with_structured_list() {
        let files = RepositoryFiles {
            zipball_url: Some("https://dl/tool.zip".to_string()),
            package_url: Some("https://dl/tool.pak".to_string()),
            git_http_url: Some("https://git/acme/tool.git".to_string()),
            ..RepositoryFiles::default()
        };
        let f = fixture(files, &[], no_git());

        let err = f
            .fetcher
            .fetch("acme/tool=1.0.0@github", FetchOptions::default(), None)
            .unwrap_err();
        let FetchError::Exhausted { failures, .. } = err else {
            panic!("expected exhausted cascade, got {err}");
        };
        let kinds: Vec<AttemptKind> = failures.attempts().iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AttemptKind::Zipball, AttemptKind::Package, AttemptKind::Git]
        );
        assert!(failures.attempts()[2].message.contains("No tag matches"));
    }

    #[test]
    fn test_build_source_skips_package_file() {
        let files = RepositoryFiles {
            package_url: Some("https://dl/tool.pak".to_string()),
            git_http_url: Some("https://git/acme/tool.git".to_string()),
            ..RepositoryFiles::default()
        };
        let git = FakeGit {
            tags: vec!["v1.0.0".to_string()],
            with_package: true,
        };
        let f = fixture(files, &[("https://dl/tool.pak", b"pak".to_vec())], git);

        let options = FetchOptions {
            build_source: true,
            ..FetchOptions::default()
        };
        let fetched = f.fetcher.fetch("acme/tool@github", options, None).unwrap();
        assert_eq!(fetched.kind, AttemptKind::Git);
        assert!(f.transport.downloads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_package_file_is_used_directly() {
        let files = RepositoryFiles {
            package_url: Some("https://dl/tool.pak".to_string()),
            ..RepositoryFiles::default()
        };
        let f = fixture(files, &[("https://dl/tool.pak", b"pak".to_vec())], no_git());
        let fetched = f
            .fetcher
            .fetch("acme/tool@github", FetchOptions::default(), None)
            .unwrap();
        assert_eq!(fetched.kind, AttemptKind::Package);
        assert_eq!(fs::read(&fetched.path).unwrap(), b"pak");
    }

    #[test]
    fn test_no_assets_and_undefined_source() {
        let f = fixture(RepositoryFiles::default(), &[], no_git());
        assert!(matches!(
            f.fetcher.fetch("acme/tool@github", FetchOptions::default(), None),
            Err(FetchError::NoAssets(_))
        ));
        assert!(matches!(
            f.fetcher.fetch("acme/tool@nowhere", FetchOptions::default(), None),
            Err(FetchError::UndefinedSource(_))
        ));
        assert!(matches!(
            f.fetcher.fetch("acme/tool", FetchOptions::default(), None),
            Err(FetchError::MissingSource(_))
        ));
    }

    #[test]
    fn test_adjacent_duplicate_messages_collapse() {
        let mut failures = AttemptFailures::default();
        failures.push(AttemptKind::Zipball, "network down");
        failures.push(AttemptKind::Tarball, "network down");
        failures.push(AttemptKind::Git, "no tag");
        failures.push(AttemptKind::Git, "network down");
        assert_eq!(failures.to_string(), "network down; no tag; network down");
        assert_eq!(failures.attempts().len(), 4);
    }
}
