//! Version control operations layer
//!
//! Defines the command surface the reconciler drives and the one-shot local
//! initialization of a working copy using git2-rs.

use super::types::{PullOutcome, RepositoryHandle, WorkingCopyStatus};
use async_trait::async_trait;
use git2::{Repository, RepositoryInitOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during version control operations
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a working copy: {0}")]
    NotAWorkingCopy(PathBuf),

    #[error("Remote not configured: {0}")]
    RemoteNotFound(String),

    #[error("Rebase onto {upstream} stopped on conflicts in: {}", paths.join(", "))]
    Conflict { upstream: String, paths: Vec<String> },

    #[error("Push of {refname} rejected: {reason}")]
    PushRejected { refname: String, reason: String },

    #[error("HEAD is detached at {head}, away from {branch}; check out {branch} to resume")]
    DetachedHead { head: String, branch: String },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Path {0} is outside the working copy")]
    OutsideWorkingCopy(PathBuf),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type VcsResult<T> = Result<T, VcsError>;

/// The version control command surface used by a reconciliation cycle.
///
/// Every call may fail independently. Implementations are bound to a single
/// working copy.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Update remote-tracking references from `remote`.
    async fn fetch(&self, remote: &str) -> VcsResult<()>;

    /// Branch HEAD points to, or `None` when HEAD is unborn or detached.
    async fn current_branch(&self) -> VcsResult<Option<String>>;

    /// Integrate the fetched `remote`/`branch` tip into the local `branch`,
    /// replaying local unpublished commits on top of it.
    ///
    /// A conflicting replay is rolled back and reported as [`VcsError::Conflict`].
    /// A HEAD detached away from the tip of `branch` is refused with
    /// [`VcsError::DetachedHead`] before anything is checked out.
    async fn pull_rebase(&self, remote: &str, branch: &str) -> VcsResult<PullOutcome>;

    /// Record exactly `path` in the index.
    async fn stage(&self, path: &Path) -> VcsResult<()>;

    async fn status(&self) -> VcsResult<WorkingCopyStatus>;

    /// Commit the index onto `branch`, returning the new commit id.
    ///
    /// Fails with [`VcsError::DetachedHead`] when HEAD is detached somewhere
    /// other than the tip of `branch`.
    async fn commit(&self, branch: &str, message: &str) -> VcsResult<String>;

    async fn push(&self, remote: &str, branch: &str) -> VcsResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Whether [`initialize_working_copy`] had to create anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new repository was created and bound to the remote
    Initialized,
    /// Existing metadata was found; the remote was added because it was missing
    RemoteAdded,
    /// Existing repository and remote were reused untouched
    Reused,
}

/// Create (if needed) the working copy at `path` and bind it to `remote_url`.
///
/// The remote URL is only ever written once: when the remote already exists
/// the handle reports the URL found on disk, even if it differs from
/// `remote_url`.
pub fn initialize_working_copy(
    path: impl AsRef<Path>,
    remote_name: &str,
    remote_url: &str,
    default_branch: &str,
) -> VcsResult<(RepositoryHandle, InitOutcome)> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("Creating working copy directory {}", path.display());
        std::fs::create_dir_all(path)?;
    }

    let (repo, mut outcome) = if path.join(".git").exists() {
        (Repository::open(path)?, InitOutcome::Reused)
    } else {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(default_branch);
        (Repository::init_opts(path, &opts)?, InitOutcome::Initialized)
    };

    let configured_url = match repo.find_remote(remote_name) {
        Ok(remote) => remote
            .url()
            .map(str::to_string)
            .ok_or_else(|| VcsError::RemoteNotFound(remote_name.to_string()))?,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            repo.remote(remote_name, remote_url)?;
            if outcome == InitOutcome::Reused {
                outcome = InitOutcome::RemoteAdded;
            }
            remote_url.to_string()
        }
        Err(e) => return Err(e.into()),
    };

    let root = repo
        .workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| VcsError::NotAWorkingCopy(path.to_path_buf()))?;

    info!(
        "Working copy {} bound to {} ({:?})",
        root.display(),
        configured_url,
        outcome
    );

    Ok((
        RepositoryHandle::new(root, remote_name, configured_url),
        outcome,
    ))
}
