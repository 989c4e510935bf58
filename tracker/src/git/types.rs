//! Version control value types
//!
//! Plain data exchanged between the reconciler and a [`VersionControl`](super::VersionControl)
//! backend.

use forge::AccessToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A working copy bound to exactly one remote.
///
/// # Examples
///
/// ```
/// use tracker::git::RepositoryHandle;
///
/// let handle = RepositoryHandle::new(
///     "/tmp/code-tracking",
///     "origin",
///     "https://github.com/octocat/code-tracking.git",
/// );
/// assert_eq!(handle.remote_name, "origin");
/// assert!(handle.artifact_path("code_1.md").ends_with("code_1.md"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    /// Root of the working copy (the directory holding `.git`)
    pub path: PathBuf,

    /// Name of the remote the working copy publishes to
    pub remote_name: String,

    /// URL configured for that remote when the working copy was first initialized
    pub remote_url: String,
}

impl RepositoryHandle {
    pub fn new(
        path: impl Into<PathBuf>,
        remote_name: impl Into<String>,
        remote_url: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            remote_name: remote_name.into(),
            remote_url: remote_url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute location of a file inside the working copy
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }
}

/// Result of integrating the remote branch into the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullOutcome {
    /// Local branch already contains the remote tip
    UpToDate,
    /// The remote does not have the branch yet; the first push creates it
    NoUpstream,
    /// No local unpublished commits; the branch was moved to the remote tip
    FastForwarded,
    /// Local unpublished commits were replayed on top of the remote tip
    Rebased { replayed: usize },
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullOutcome::UpToDate => write!(f, "up to date"),
            PullOutcome::NoUpstream => write!(f, "no upstream branch yet"),
            PullOutcome::FastForwarded => write!(f, "fast-forwarded"),
            PullOutcome::Rebased { replayed } => {
                write!(f, "rebased {} local commit(s)", replayed)
            }
        }
    }
}

/// Snapshot of pending changes in a working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopyStatus {
    /// Paths with changes recorded in the index
    pub staged: Vec<String>,

    /// Modified tracked paths not recorded in the index
    pub unstaged: Vec<String>,

    /// Paths git does not track yet
    #[serde(default)]
    pub untracked: Vec<String>,

    /// Paths with unresolved conflicts
    pub conflicted: Vec<String>,
}

impl WorkingCopyStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a commit right now would record anything
    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }
}

/// Identity recorded on commits when the repository has no `user.name`/`user.email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self::new("itrack", "itrack@localhost")
    }
}

/// Username/token pair presented to HTTPS transports.
#[derive(Debug, Clone)]
pub struct GitCredentials {
    pub username: String,
    pub token: AccessToken,
}

impl GitCredentials {
    pub fn new(username: impl Into<String>, token: AccessToken) -> Self {
        Self {
            username: username.into(),
            token,
        }
    }
}
