//! Git access for the last step of the fetch cascade.

use std::path::Path;
use std::process::Command;

use pak_schema::{LATEST, compare_versions};
use tracing::debug;

use super::FetchError;

/// The handful of git operations the cascade needs.
pub trait GitClient: Send + Sync {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), FetchError>;

    fn tags(&self, repo: &Path) -> Result<Vec<String>, FetchError>;

    fn checkout(&self, repo: &Path, reference: &str) -> Result<(), FetchError>;
}

/// Shells out to the `git` binary on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl SystemGit {
    fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, FetchError> {
        let git = which::which("git").map_err(|_| FetchError::Git("git is not installed".to_string()))?;
        let mut cmd = Command::new(git);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!("git {}", args.join(" "));
        let output = cmd.args(args).env("GIT_TERMINAL_PROMPT", "0").output()?;
        if !output.status.success() {
            return Err(FetchError::Git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl GitClient for SystemGit {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", "--quiet", url, &dest]).map(drop)
    }

    fn tags(&self, repo: &Path) -> Result<Vec<String>, FetchError> {
        Ok(self
            .run(Some(repo), &["tag", "--list"])?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn checkout(&self, repo: &Path, reference: &str) -> Result<(), FetchError> {
        self.run(Some(repo), &["checkout", "--quiet", reference]).map(drop)
    }
}

/// Tag to check out for `version`: the highest tag for `latest`, otherwise
/// the tag equal to the version with or without a leading `v`.
pub fn matching_tag(tags: &[String], version: &str) -> Option<String> {
    if version == LATEST {
        return tags
            .iter()
            .filter(|t| pak_schema::to_semver(t).is_some())
            .max_by(|a, b| compare_versions(a, b))
            .cloned();
    }
    let wanted = version.trim_start_matches('v');
    tags.iter()
        .find(|t| t.trim_start_matches('v') == wanted)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_matching_tag() {
        let t = tags(&["v1.0.0", "v1.10.0", "v1.9.0", "nightly"]);
        assert_eq!(matching_tag(&t, "latest").as_deref(), Some("v1.10.0"));
        assert_eq!(matching_tag(&t, "1.9.0").as_deref(), Some("v1.9.0"));
        assert_eq!(matching_tag(&t, "2.0.0"), None);
        assert_eq!(matching_tag(&[], "latest"), None);
    }
}
