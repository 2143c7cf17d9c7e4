//! Repository services: what GitHub and GitLab know about a package.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use pak_schema::{
    Credential, DefinedRemoteSource, LATEST, RemotePackageInput, RemoteSourceKind,
    RepositoryFiles, RepositoryQueryResults, compare_versions,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::FetchError;
use super::transport::Transport;

/// Queries one remote source for release, git and native-package metadata.
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Clone URLs and repository description.
    async fn git_repository(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError>;

    /// Source archives attached to the matching release.
    async fn release_archive(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError>;

    /// A prebuilt `.pak` asset of the matching release.
    async fn release_package(
        &self,
        input: &RemotePackageInput,
        prefer_static: bool,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError>;
}

/// Build the service matching a source's API flavour.
pub fn service_for(
    source: DefinedRemoteSource,
    transport: Arc<dyn Transport>,
) -> Box<dyn RepositoryService> {
    match source.kind {
        RemoteSourceKind::Github => Box::new(GithubService::new(source, transport)),
        RemoteSourceKind::Gitlab => Box::new(GitlabService::new(source, transport)),
    }
}

/// Pick the release for `version`.
///
/// `latest` is the highest tag. Otherwise an exact tag (with or without a
/// leading `v`) wins, falling back to the closest higher release.
pub fn select_release<'a, T>(releases: &'a [T], tag: impl Fn(&T) -> &str, version: &str) -> Option<&'a T> {
    if version == LATEST {
        return releases
            .iter()
            .max_by(|a, b| compare_versions(tag(a), tag(b)));
    }
    let wanted = version.trim_start_matches('v');
    if let Some(exact) = releases
        .iter()
        .find(|r| tag(r).trim_start_matches('v') == wanted)
    {
        return Some(exact);
    }
    releases
        .iter()
        .filter(|r| compare_versions(tag(r), version) == Ordering::Greater)
        .min_by(|a, b| compare_versions(tag(a), tag(b)))
}

fn is_static_asset(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with("-static.pak") || lower.ends_with("_static.pak")
}

/// Pick a `.pak` asset from `(name, url)` pairs.
pub fn select_package_asset<'a>(
    assets: impl IntoIterator<Item = (&'a str, &'a str)>,
    prefer_static: bool,
) -> Option<String> {
    let paks: Vec<(&str, &str)> = assets
        .into_iter()
        .filter(|(name, _)| name.to_ascii_lowercase().ends_with(".pak"))
        .collect();
    let preferred = paks
        .iter()
        .find(|(name, _)| is_static_asset(name) == prefer_static);
    preferred
        .or_else(|| paks.first())
        .map(|(_, url)| (*url).to_string())
}

async fn get<T: DeserializeOwned>(
    transport: &dyn Transport,
    url: &str,
    credential: Option<&Credential>,
) -> Result<T, FetchError> {
    let value = transport.get_json(url, credential).await?;
    Ok(serde_json::from_value(value)?)
}

fn no_release(input: &RemotePackageInput, version: &str) -> FetchError {
    FetchError::NoRelease {
        package: input.to_string(),
        version: version.to_string(),
    }
}

fn tag_version(tag: &str) -> String {
    tag.trim_start_matches('v').to_string()
}

// GitHub

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: Option<String>,
    description: Option<String>,
    clone_url: Option<String>,
    ssh_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    name: Option<String>,
    body: Option<String>,
    zipball_url: Option<String>,
    tarball_url: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

/// GitHub REST API (`/repos/{owner}/{repo}`).
pub struct GithubService {
    source: DefinedRemoteSource,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for GithubService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubService")
            .field("source", &self.source.name)
            .finish_non_exhaustive()
    }
}

impl GithubService {
    pub fn new(source: DefinedRemoteSource, transport: Arc<dyn Transport>) -> Self {
        Self { source, transport }
    }

    fn repo_url(&self, input: &RemotePackageInput) -> String {
        format!(
            "{}/repos/{}/{}",
            self.source.base_url(),
            input.vendor,
            input.package
        )
    }

    async fn release(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<GithubRelease, FetchError> {
        let url = format!("{}/releases", self.repo_url(input));
        let releases: Vec<GithubRelease> = get(self.transport.as_ref(), &url, credential).await?;
        let version = input.version_or_latest();
        let chosen = select_release(&releases, |r| r.tag_name.as_str(), version)
            .map(|r| r.tag_name.clone())
            .ok_or_else(|| no_release(input, version))?;
        releases
            .into_iter()
            .find(|r| r.tag_name == chosen)
            .ok_or_else(|| no_release(input, version))
    }
}

#[async_trait]
impl RepositoryService for GithubService {
    async fn git_repository(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let repo: GithubRepo = get(self.transport.as_ref(), &self.repo_url(input), credential).await?;
        Ok(RepositoryQueryResults {
            files: RepositoryFiles {
                git_http_url: repo.clone_url,
                git_ssh_url: repo.ssh_url,
                ..RepositoryFiles::default()
            },
            version: None,
            release_name: repo.name,
            release_description: repo.description,
        })
    }

    async fn release_archive(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let release = self.release(input, credential).await?;
        Ok(RepositoryQueryResults {
            files: RepositoryFiles {
                zipball_url: release.zipball_url,
                tarball_url: release.tarball_url,
                ..RepositoryFiles::default()
            },
            version: Some(tag_version(&release.tag_name)),
            release_name: release.name,
            release_description: release.body,
        })
    }

    async fn release_package(
        &self,
        input: &RemotePackageInput,
        prefer_static: bool,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let release = self.release(input, credential).await?;
        let package_url = select_package_asset(
            release
                .assets
                .iter()
                .map(|a| (a.name.as_str(), a.browser_download_url.as_str())),
            prefer_static,
        );
        Ok(RepositoryQueryResults {
            files: RepositoryFiles {
                package_url,
                ..RepositoryFiles::default()
            },
            version: Some(tag_version(&release.tag_name)),
            release_name: release.name,
            release_description: release.body,
        })
    }
}

// GitLab

#[derive(Debug, Deserialize)]
struct GitlabProject {
    name: Option<String>,
    description: Option<String>,
    http_url_to_repo: Option<String>,
    ssh_url_to_repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitlabRelease {
    tag_name: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    assets: GitlabAssets,
}

#[derive(Debug, Default, Deserialize)]
struct GitlabAssets {
    #[serde(default)]
    sources: Vec<GitlabSource>,
    #[serde(default)]
    links: Vec<GitlabLink>,
}

#[derive(Debug, Deserialize)]
struct GitlabSource {
    format: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct GitlabLink {
    name: String,
    url: String,
}

/// GitLab REST API (`/api/v4/projects/{owner}%2F{repo}`).
pub struct GitlabService {
    source: DefinedRemoteSource,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for GitlabService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabService")
            .field("source", &self.source.name)
            .finish_non_exhaustive()
    }
}

impl GitlabService {
    pub fn new(source: DefinedRemoteSource, transport: Arc<dyn Transport>) -> Self {
        Self { source, transport }
    }

    fn project_url(&self, input: &RemotePackageInput) -> String {
        format!(
            "{}/api/v4/projects/{}%2F{}",
            self.source.base_url(),
            input.vendor,
            input.package
        )
    }

    async fn release(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<GitlabRelease, FetchError> {
        let url = format!("{}/releases", self.project_url(input));
        let releases: Vec<GitlabRelease> = get(self.transport.as_ref(), &url, credential).await?;
        let version = input.version_or_latest();
        let chosen = select_release(&releases, |r| r.tag_name.as_str(), version)
            .map(|r| r.tag_name.clone())
            .ok_or_else(|| no_release(input, version))?;
        releases
            .into_iter()
            .find(|r| r.tag_name == chosen)
            .ok_or_else(|| no_release(input, version))
    }
}

#[async_trait]
impl RepositoryService for GitlabService {
    async fn git_repository(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let project: GitlabProject =
            get(self.transport.as_ref(), &self.project_url(input), credential).await?;
        Ok(RepositoryQueryResults {
            files: RepositoryFiles {
                git_http_url: project.http_url_to_repo,
                git_ssh_url: project.ssh_url_to_repo,
                ..RepositoryFiles::default()
            },
            version: None,
            release_name: project.name,
            release_description: project.description,
        })
    }

    async fn release_archive(
        &self,
        input: &RemotePackageInput,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let release = self.release(input, credential).await?;
        let source = |format: &str| {
            release
                .assets
                .sources
                .iter()
                .find(|s| s.format == format)
                .map(|s| s.url.clone())
        };
        let files = RepositoryFiles {
            zipball_url: source("zip"),
            tarball_url: source("tar.gz"),
            ..RepositoryFiles::default()
        };
        Ok(RepositoryQueryResults {
            files,
            version: Some(tag_version(&release.tag_name)),
            release_name: release.name,
            release_description: release.description,
        })
    }

    async fn release_package(
        &self,
        input: &RemotePackageInput,
        prefer_static: bool,
        credential: Option<&Credential>,
    ) -> Result<RepositoryQueryResults, FetchError> {
        let release = self.release(input, credential).await?;
        let package_url = select_package_asset(
            release
                .assets
                .links
                .iter()
                .map(|l| (l.name.as_str(), l.url.as_str())),
            prefer_static,
        );
        Ok(RepositoryQueryResults {
            files: RepositoryFiles {
                package_url,
                ..RepositoryFiles::default()
            },
            version: Some(tag_version(&release.tag_name)),
            release_name: release.name,
            release_description: release.description,
        })
    }
}
