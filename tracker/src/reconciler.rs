//! The reconciliation cycle: sync with the remote branch, record one artifact,
//! commit it and try to publish it.
//!
//! Divergence is tolerated, never resolved: a cycle that cannot integrate the
//! remote branch stops before touching the working copy. A rejected push keeps
//! the local commit, which the next successful push publishes.

use crate::artifact::{iso_timestamp, ArtifactError, ArtifactLayout, CommitCounter};
use crate::config::TrackerConfig;
use crate::git::{PullOutcome, RepositoryHandle, VcsError, VersionControl};
use crate::locks::RepoLocks;
use crate::notify::{Notice, Notifier};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Failures that end a cycle early. None of them are fatal to the process.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("A cycle is already running on {0}")]
    Busy(PathBuf),

    #[error("Could not determine the current branch: {0}")]
    Branch(#[source] VcsError),

    #[error("Fetch from {remote} failed: {source}")]
    Fetch {
        remote: String,
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("Pull of {branch} failed: {source}")]
    Pull {
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Staging failed: {0}")]
    Stage(#[source] VcsError),

    #[error("Status query failed: {0}")]
    Status(#[source] VcsError),

    #[error("Commit failed: {0}")]
    Commit(#[source] VcsError),
}

impl CycleError {
    /// Short name of the step that failed
    pub fn step(&self) -> &'static str {
        match self {
            CycleError::Busy(_) => "busy",
            CycleError::Branch(_) => "branch",
            CycleError::Fetch { .. } => "fetch",
            CycleError::Pull { .. } => "pull",
            CycleError::Artifact(_) => "write",
            CycleError::Stage(_) => "stage",
            CycleError::Status(_) => "status",
            CycleError::Commit(_) => "commit",
        }
    }

    fn notice(&self) -> Notice {
        match self {
            CycleError::Busy(path) => Notice::CycleSkipped { path: path.clone() },
            CycleError::Fetch { remote, source, .. } => Notice::FetchFailed {
                remote: remote.clone(),
                reason: source.to_string(),
            },
            CycleError::Pull { branch, source } => Notice::SyncFailed {
                branch: branch.clone(),
                reason: source.to_string(),
            },
            other => Notice::CycleFailed {
                step: other.step(),
                reason: other.to_string(),
            },
        }
    }
}

/// A commit recorded by a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub ordinal: u64,
    pub artifact: PathBuf,
    pub commit: String,
    pub branch: String,
    pub summary: String,
    pub pull: PullOutcome,
    /// Artifacts from earlier cycles that never got committed, included in this commit
    pub recovered: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Committed and pushed
    Published(CommitRecord),
    /// Committed locally; the push failed and is retried by the next cycle
    PushFailed { record: CommitRecord, reason: String },
    /// Nothing was staged after writing the artifact
    NoChanges { branch: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Branch used when the working copy reports none (unborn or detached HEAD)
    pub default_branch: String,
    pub layout: ArtifactLayout,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_branch: "master".to_string(),
            layout: ArtifactLayout::default(),
        }
    }
}

impl From<&TrackerConfig> for ReconcilerConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            default_branch: config.default_branch.clone(),
            layout: config.artifact_layout(),
        }
    }
}

/// Owns one working copy and its artifact counter.
pub struct Reconciler {
    handle: RepositoryHandle,
    vcs: Arc<dyn VersionControl>,
    config: ReconcilerConfig,
    counter: CommitCounter,
    notifier: Arc<dyn Notifier>,
    locks: RepoLocks,
}

impl Reconciler {
    /// Bind to `handle`, resuming the counter after the artifacts already on disk.
    pub fn new(
        handle: RepositoryHandle,
        vcs: Arc<dyn VersionControl>,
        config: ReconcilerConfig,
        notifier: Arc<dyn Notifier>,
        locks: RepoLocks,
    ) -> Result<Self, ArtifactError> {
        let counter = CommitCounter::recover(handle.path(), &config.layout)?;
        debug!(
            "Reconciler for {} starts at artifact {}",
            handle.path().display(),
            counter.current()
        );
        Ok(Self {
            handle,
            vcs,
            config,
            counter,
            notifier,
            locks,
        })
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn counter(&self) -> CommitCounter {
        self.counter
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    async fn resolve_branch(&self) -> Result<String, CycleError> {
        let reported = self.vcs.current_branch().await.map_err(CycleError::Branch)?;
        Ok(reported
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.default_branch.clone()))
    }

    /// Run one cycle and report its result through the notifier.
    ///
    /// The result is returned for callers that want it, but every outcome has
    /// already been reported when this returns.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let result = self.synchronize_and_commit().await;
        let notice = match &result {
            Ok(CycleOutcome::Published(record)) => Notice::Committed {
                summary: record.summary.clone(),
                branch: record.branch.clone(),
            },
            Ok(CycleOutcome::PushFailed { record, reason }) => Notice::PushFailed {
                summary: record.summary.clone(),
                branch: record.branch.clone(),
                reason: reason.clone(),
            },
            Ok(CycleOutcome::NoChanges { .. }) => Notice::NoChanges,
            Err(e) => e.notice(),
        };
        self.notifier.notify(&notice);
        result
    }

    /// Untracked artifacts left by an earlier cycle that failed after writing.
    fn orphaned_artifacts(&self, dir: &Path, untracked: &[String]) -> Vec<PathBuf> {
        untracked
            .iter()
            .filter(|name| self.config.layout.parse_ordinal(name).is_some())
            .map(|name| dir.join(name))
            .collect()
    }

    /// Sync, write the next artifact, stage it, commit and push.
    pub async fn synchronize_and_commit(&mut self) -> Result<CycleOutcome, CycleError> {
        let path = self.handle.path().to_path_buf();
        let guard = self
            .locks
            .try_acquire(&path)
            .ok_or_else(|| CycleError::Busy(path.clone()))?;
        debug!("Holding cycle lock on {}", guard.path().display());

        let remote = self.handle.remote_name.clone();
        let branch = self.resolve_branch().await?;
        debug!("Cycle on {} targets {}/{}", path.display(), remote, branch);

        self.vcs
            .fetch(&remote)
            .await
            .map_err(|source| CycleError::Fetch {
                remote: remote.clone(),
                branch: branch.clone(),
                source,
            })?;

        let pull = self
            .vcs
            .pull_rebase(&remote, &branch)
            .await
            .map_err(|source| CycleError::Pull {
                branch: branch.clone(),
                source,
            })?;
        debug!("Pull of {}: {}", branch, pull);

        // artifacts pulled from elsewhere must not be overwritten
        self.counter
            .observe(self.config.layout.high_water_mark(&path)?);

        let now = Utc::now();
        let ordinal = self.counter.current();
        let artifact = self.config.layout.write(&path, ordinal, now)?;
        self.counter.advance();

        self.vcs.stage(&artifact).await.map_err(CycleError::Stage)?;

        let status = self.vcs.status().await.map_err(CycleError::Status)?;

        let mut recovered = self.orphaned_artifacts(&path, &status.untracked);
        recovered.retain(|orphan| orphan != &artifact);
        for orphan in &recovered {
            self.vcs.stage(orphan).await.map_err(CycleError::Stage)?;
        }
        if !recovered.is_empty() {
            info!(
                "Including {} artifact(s) left uncommitted by an earlier cycle",
                recovered.len()
            );
        }

        if !status.has_staged_changes() && recovered.is_empty() {
            info!("Artifact {} produced no changes", artifact.display());
            return Ok(CycleOutcome::NoChanges { branch });
        }

        let summary = format!("Auto-commit: {}", iso_timestamp(now));
        let commit = self
            .vcs
            .commit(&branch, &summary)
            .await
            .map_err(CycleError::Commit)?;

        let record = CommitRecord {
            ordinal,
            artifact,
            commit,
            branch,
            summary,
            pull,
            recovered,
        };

        match self.vcs.push(&remote, &record.branch).await {
            Ok(()) => {
                info!("Published {} on {}", record.commit, record.branch);
                Ok(CycleOutcome::Published(record))
            }
            Err(e) => Ok(CycleOutcome::PushFailed {
                record,
                reason: e.to_string(),
            }),
        }
    }
}
