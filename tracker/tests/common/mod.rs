#![allow(dead_code)]

use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{Repository, RepositoryInitOptions, Signature};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracker::git::{
    initialize_working_copy, Git2Backend, PullOutcome, RepositoryHandle, VcsError, VcsResult,
    VersionControl, WorkingCopyStatus,
};
use tracker::{MemoryNotifier, Reconciler, ReconcilerConfig, RepoLocks};

pub const BRANCH: &str = "master";

/// A bare "hosted" repository plus a workspace, all inside one temp dir.
pub struct Sandbox {
    pub dir: TempDir,
    pub remote: PathBuf,
    pub workspace: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote.git");
        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head(BRANCH);
        Repository::init_opts(&remote, &opts).unwrap();

        let workspace = dir.path().join("workspace");
        std::fs::create_dir(&workspace).unwrap();

        Self {
            dir,
            remote,
            workspace,
        }
    }

    pub fn remote_url(&self) -> String {
        self.remote.to_string_lossy().into_owned()
    }

    pub fn working_copy(&self) -> RepositoryHandle {
        let (handle, _) = initialize_working_copy(
            self.workspace.join("code-tracking"),
            "origin",
            &self.remote_url(),
            BRANCH,
        )
        .unwrap();
        handle
    }

    pub fn reconciler_with(
        &self,
        vcs: Arc<dyn VersionControl>,
        notifier: &MemoryNotifier,
    ) -> Reconciler {
        Reconciler::new(
            self.working_copy(),
            vcs,
            ReconcilerConfig::default(),
            Arc::new(notifier.clone()),
            RepoLocks::new(),
        )
        .unwrap()
    }

    pub fn reconciler(&self, notifier: &MemoryNotifier) -> Reconciler {
        let backend = Git2Backend::new(self.working_copy());
        self.reconciler_with(Arc::new(backend), notifier)
    }

    /// A second clone of the remote, standing in for another machine.
    pub fn other_clone(&self) -> Repository {
        RepoBuilder::new()
            .branch(BRANCH)
            .clone(&self.remote_url(), &self.dir.path().join("other"))
            .unwrap()
    }

    pub fn remote_repo(&self) -> Repository {
        Repository::open_bare(&self.remote).unwrap()
    }

    /// Commit messages on the remote branch, newest first, following first parents.
    pub fn remote_history(&self) -> Vec<String> {
        history(&self.remote_repo(), &format!("refs/heads/{}", BRANCH))
    }

    pub fn remote_has_file(&self, name: &str) -> bool {
        let repo = self.remote_repo();
        let tree = repo
            .find_reference(&format!("refs/heads/{}", BRANCH))
            .and_then(|r| r.peel_to_tree())
            .unwrap();
        let found = tree.get_name(name).is_some();
        found
    }
}

pub fn history(repo: &Repository, reference: &str) -> Vec<String> {
    let Ok(reference) = repo.find_reference(reference) else {
        return Vec::new();
    };
    let mut commit = reference.peel_to_commit().ok();
    let mut messages = Vec::new();
    while let Some(c) = commit {
        assert!(c.parent_count() <= 1, "history is not linear");
        messages.push(c.message().unwrap_or_default().to_string());
        commit = c.parent(0).ok();
    }
    messages
}

/// Write `name` in the repository's working directory and commit it on HEAD.
pub fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let sig = Signature::now("Other Machine", "other@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

pub fn push(repo: &Repository) {
    let mut remote = repo.find_remote("origin").unwrap();
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", BRANCH);
    remote.push(&[refspec.as_str()], None).unwrap();
}

/// Real backend whose push can be switched to fail.
pub struct FlakyPush {
    pub inner: Git2Backend,
    pub fail: AtomicBool,
}

impl FlakyPush {
    pub fn new(inner: Git2Backend) -> Self {
        Self {
            inner,
            fail: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionControl for FlakyPush {
    async fn fetch(&self, remote: &str) -> VcsResult<()> {
        self.inner.fetch(remote).await
    }

    async fn current_branch(&self) -> VcsResult<Option<String>> {
        self.inner.current_branch().await
    }

    async fn pull_rebase(&self, remote: &str, branch: &str) -> VcsResult<PullOutcome> {
        self.inner.pull_rebase(remote, branch).await
    }

    async fn stage(&self, path: &Path) -> VcsResult<()> {
        self.inner.stage(path).await
    }

    async fn status(&self) -> VcsResult<WorkingCopyStatus> {
        self.inner.status().await
    }

    async fn commit(&self, branch: &str, message: &str) -> VcsResult<String> {
        self.inner.commit(branch, message).await
    }

    async fn push(&self, remote: &str, branch: &str) -> VcsResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VcsError::PushRejected {
                refname: format!("refs/heads/{}", branch),
                reason: "remote unavailable".to_string(),
            });
        }
        self.inner.push(remote, branch).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky-push"
    }
}
