//! Version-control seam used by the sync engine
//!
//! The engine only needs three primitives: clone a URL into a path, open an
//! existing clone, and fast-forward it. [`GitCli`] provides them by running
//! the `git` binary; tests substitute their own implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::operations::{
    clone_repository, get_current_branch, get_head_commit, get_origin_url, pull_fast_forward,
    show_toplevel,
};

/// Default per-operation timeout for git commands
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 600;

/// Handle to an existing local clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalClone {
    pub path: PathBuf,
    /// URL of the `origin` remote
    pub origin_url: String,
    /// Checked-out branch
    pub branch: String,
}

/// Why an existing path could not be opened as a local clone
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("{} is not a git repository", .0.display())]
    NotARepository(PathBuf),
    #[error("no 'origin' remote configured")]
    MissingOrigin,
    #[error("detached HEAD")]
    DetachedHead,
    /// git could not be run or answered unexpectedly
    #[error(transparent)]
    Git(#[from] anyhow::Error),
}

impl OpenError {
    /// True when the path holds no usable clone at all, so replacing it
    /// cannot lose local work
    pub fn is_replaceable(&self) -> bool {
        matches!(
            self,
            OpenError::NotADirectory(_) | OpenError::NotARepository(_) | OpenError::MissingOrigin
        )
    }
}

/// What a successful pull did to the local branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullChange {
    UpToDate,
    FastForwarded { from: Option<String>, to: String },
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clones `url` into `path`
    async fn clone_to(&self, url: &str, path: &Path) -> Result<()>;

    /// Opens `path` as a local clone with an `origin` remote
    async fn open_local(&self, path: &Path) -> Result<LocalClone, OpenError>;

    /// Fast-forwards the clone's current branch from `origin`
    async fn pull(&self, repo: &LocalClone) -> Result<PullChange>;
}

/// [`VersionControl`] backed by the `git` command line
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS))
    }
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_to(&self, url: &str, path: &Path) -> Result<()> {
        clone_repository(url, path, self.timeout).await
    }

    async fn open_local(&self, path: &Path) -> Result<LocalClone, OpenError> {
        if !path.is_dir() {
            return Err(OpenError::NotADirectory(path.to_path_buf()));
        }

        // A plain directory nested in some other work tree would still
        // answer rev-parse, so the top level has to be the path itself.
        let toplevel = match show_toplevel(path, self.timeout).await? {
            Some(toplevel) => PathBuf::from(toplevel),
            None => return Err(OpenError::NotARepository(path.to_path_buf())),
        };
        let expected = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| OpenError::Git(anyhow::Error::new(e).context("cannot resolve path")))?;
        let actual = tokio::fs::canonicalize(&toplevel).await.unwrap_or(toplevel);
        if actual != expected {
            return Err(OpenError::NotARepository(path.to_path_buf()));
        }

        let origin_url = get_origin_url(path, self.timeout)
            .await?
            .ok_or(OpenError::MissingOrigin)?;
        let branch = get_current_branch(path, self.timeout)
            .await?
            .ok_or(OpenError::DetachedHead)?;

        Ok(LocalClone {
            path: path.to_path_buf(),
            origin_url,
            branch,
        })
    }

    async fn pull(&self, repo: &LocalClone) -> Result<PullChange> {
        let before = get_head_commit(&repo.path, self.timeout).await?;
        pull_fast_forward(&repo.path, self.timeout).await?;
        let after = get_head_commit(&repo.path, self.timeout).await?;

        match after {
            Some(to) if before.as_deref() != Some(to.as_str()) => {
                Ok(PullChange::FastForwarded { from: before, to })
            }
            _ => Ok(PullChange::UpToDate),
        }
    }
}
