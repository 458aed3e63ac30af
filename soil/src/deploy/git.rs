//! Git repository helpers

use std::path::Path;

use tracing::{debug, info};

use crate::errors::SoilError;
use crate::process::{ExecPolicy, Executor};
use crate::utils::split_last;

/// A repository reference of the form `https://host/owner/repo[@branch]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub url: String,
    pub branch: Option<String>,
}

impl RepoRef {
    pub fn parse(reference: &str) -> Result<Self, SoilError> {
        repo_from_ref(reference)
            .ok_or_else(|| {
                SoilError::Config(format!("Invalid repository reference: {}", reference))
            })
    }

    /// Last path segment of the url, used as the local checkout name
    pub fn name(&self) -> &str {
        split_last(&self.url, "/")
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{}@{}", self.url, branch),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Split `https://github.com/user/repo@branch-or-tag` into url and branch.
///
/// Only http(s) urls with exactly three path components (host, owner,
/// repository) are accepted.
pub fn repo_from_ref(reference: &str) -> Option<RepoRef> {
    let (url, branch) = match reference.rsplit_once('@') {
        Some((_, "")) => return None,
        Some((url, branch)) => (url, Some(branch.to_string())),
        None => (reference, None),
    };

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let segments: Vec<&str> = rest.split('/').collect();
    let valid_segment =
        |s: &&str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || "_.-".contains(c));
    if segments.len() != 3 || !segments.iter().all(valid_segment) {
        return None;
    }

    Some(RepoRef {
        url: url.to_string(),
        branch,
    })
}

/// Clone a repository unless something already exists at `path`
pub async fn clone_repository(
    executor: &dyn Executor,
    repo: &RepoRef,
    path: &Path,
) -> Result<(), SoilError> {
    info!("Checking out repo {}...", repo);

    if tokio::fs::try_exists(path).await? {
        info!(
            "Local git repo for {} already exists at {}, skipping...",
            repo.url,
            path.display()
        );
        return Ok(());
    }

    let mut args = vec!["git".to_string(), "clone".to_string(), repo.url.clone()];
    if let Some(branch) = &repo.branch {
        args.push("-b".to_string());
        args.push(branch.clone());
    }
    args.push(path.display().to_string());

    executor.run(&args, ExecPolicy::EXEC).await?;
    Ok(())
}

/// Short hash of the checked out commit
pub async fn repo_head(executor: &dyn Executor, path: &Path) -> Result<String, SoilError> {
    let args = [
        "git".to_string(),
        format!("-C {}", path.display()),
        "rev-parse".to_string(),
        "--short".to_string(),
        "HEAD".to_string(),
    ];
    let commit = executor.run(&args, ExecPolicy::EXEC_SILENT).await?;
    let commit = commit.trim().to_string();
    debug!("Got git HEAD: {}", commit);
    Ok(commit)
}
