//! libgit2-backed [`VersionControl`] implementation.
//!
//! git2 calls block, so every operation opens the repository on the blocking
//! thread pool and runs there.

use super::operations::{VcsError, VcsResult, VersionControl};
use super::types::{CommitAuthor, GitCredentials, PullOutcome, RepositoryHandle, WorkingCopyStatus};
use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, PushOptions, Reference, RemoteCallbacks,
    Repository, Signature, Status, StatusOptions,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGED: Status = Status::INDEX_NEW
    .union(Status::INDEX_MODIFIED)
    .union(Status::INDEX_DELETED)
    .union(Status::INDEX_RENAMED)
    .union(Status::INDEX_TYPECHANGE);

const UNSTAGED: Status = Status::WT_MODIFIED
    .union(Status::WT_DELETED)
    .union(Status::WT_RENAMED)
    .union(Status::WT_TYPECHANGE);

#[derive(Debug, Clone)]
pub struct Git2Backend {
    handle: RepositoryHandle,
    credentials: Option<GitCredentials>,
    author: CommitAuthor,
}

impl Git2Backend {
    pub fn new(handle: RepositoryHandle) -> Self {
        Self {
            handle,
            credentials: None,
            author: CommitAuthor::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: GitCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_author(mut self, author: CommitAuthor) -> Self {
        self.author = author;
        self
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    async fn with_repo<T, F>(&self, op: F) -> VcsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository, &Git2Backend) -> VcsResult<T> + Send + 'static,
    {
        let ctx = self.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(ctx.handle.path())
                .map_err(|_| VcsError::NotAWorkingCopy(ctx.handle.path.clone()))?;
            op(&repo, &ctx)
        })
        .await
        .map_err(|e| VcsError::Task(e.to_string()))?
    }

    fn remote_callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(creds) = &self.credentials {
            let mut attempts = 0;
            callbacks.credentials(move |_url, _username_from_url, allowed| {
                attempts += 1;
                // libgit2 keeps asking as long as we keep answering
                if attempts > 1 {
                    return Err(git2::Error::from_str("credentials rejected by remote"));
                }
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    Cred::userpass_plaintext(&creds.username, creds.token.expose())
                } else {
                    Cred::default()
                }
            });
        }
        callbacks
    }

    fn signature(&self, repo: &Repository) -> VcsResult<Signature<'static>> {
        match repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now(&self.author.name, &self.author.email)?),
        }
    }

    fn relative_path(&self, repo: &Repository, path: &Path) -> VcsResult<PathBuf> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        let workdir = repo
            .workdir()
            .ok_or_else(|| VcsError::NotAWorkingCopy(self.handle.path.clone()))?;
        path.strip_prefix(workdir)
            .map(Path::to_path_buf)
            .map_err(|_| VcsError::OutsideWorkingCopy(path.to_path_buf()))
    }
}

fn find_optional_reference<'r>(
    repo: &'r Repository,
    name: &str,
) -> VcsResult<Option<Reference<'r>>> {
    match repo.find_reference(name) {
        Ok(reference) => Ok(Some(reference)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Refuse to work on `branch_ref` while HEAD is detached anywhere but its tip.
///
/// The index follows HEAD, so committing it onto a branch HEAD is not on
/// would silently revert whatever the branch has beyond HEAD.
fn ensure_on_branch(repo: &Repository, branch_ref: &str) -> VcsResult<()> {
    if !repo.head_detached()? {
        return Ok(());
    }
    let head = repo.head()?.target();
    let tip = find_optional_reference(repo, branch_ref)?.and_then(|r| r.target());
    match (head, tip) {
        (Some(head), Some(tip)) if head == tip => Ok(()),
        (head, _) => Err(VcsError::DetachedHead {
            head: head.map(|oid| oid.to_string()).unwrap_or_default(),
            branch: branch_ref.to_string(),
        }),
    }
}

fn checkout_commit(repo: &Repository, oid: git2::Oid) -> VcsResult<()> {
    let commit = repo.find_commit(oid)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    Ok(())
}

fn conflicted_paths(repo: &Repository) -> VcsResult<Vec<String>> {
    let index = repo.index()?;
    if !index.has_conflicts() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    Ok(paths)
}

fn rebase_onto(
    repo: &Repository,
    local: &Reference<'_>,
    upstream: &Reference<'_>,
    upstream_name: &str,
    sig: &Signature<'_>,
) -> VcsResult<usize> {
    let branch_commit = repo.reference_to_annotated_commit(local)?;
    let upstream_commit = repo.reference_to_annotated_commit(upstream)?;
    let mut rebase = repo.rebase(Some(&branch_commit), Some(&upstream_commit), None, None)?;

    let mut replayed = 0;
    while let Some(op) = rebase.next() {
        if let Err(e) = op {
            rebase.abort()?;
            return Err(e.into());
        }

        let paths = conflicted_paths(repo)?;
        if !paths.is_empty() {
            rebase.abort()?;
            return Err(VcsError::Conflict {
                upstream: upstream_name.to_string(),
                paths,
            });
        }

        match rebase.commit(None, sig, None) {
            Ok(_) => replayed += 1,
            // patch already present upstream
            Err(e) if e.code() == ErrorCode::Applied => {}
            Err(e) => {
                rebase.abort()?;
                return Err(e.into());
            }
        }
    }

    rebase.finish(Some(sig))?;
    Ok(replayed)
}

#[async_trait]
impl VersionControl for Git2Backend {
    async fn fetch(&self, remote: &str) -> VcsResult<()> {
        let remote = remote.to_string();
        self.with_repo(move |repo, ctx| {
            debug!("Fetching from {}", remote);
            let mut remote = repo
                .find_remote(&remote)
                .map_err(|_| VcsError::RemoteNotFound(remote.clone()))?;
            let mut opts = FetchOptions::new();
            opts.remote_callbacks(ctx.remote_callbacks());
            remote.fetch(&[] as &[&str], Some(&mut opts), None)?;
            Ok(())
        })
        .await
    }

    async fn current_branch(&self) -> VcsResult<Option<String>> {
        self.with_repo(|repo, _| match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn pull_rebase(&self, remote: &str, branch: &str) -> VcsResult<PullOutcome> {
        let upstream_name = format!("{}/{}", remote, branch);
        let branch = branch.to_string();
        self.with_repo(move |repo, ctx| {
            let upstream_ref = format!("refs/remotes/{}", upstream_name);
            let local_ref = format!("refs/heads/{}", branch);
            ensure_on_branch(repo, &local_ref)?;

            let Some(upstream) = find_optional_reference(repo, &upstream_ref)? else {
                debug!("{} does not exist yet", upstream_name);
                return Ok(PullOutcome::NoUpstream);
            };
            let upstream_oid = upstream
                .target()
                .ok_or_else(|| VcsError::InvalidReference(upstream_ref.clone()))?;

            let Some(mut local) = find_optional_reference(repo, &local_ref)? else {
                // unborn local branch adopts the remote history as is
                checkout_commit(repo, upstream_oid)?;
                repo.reference(&local_ref, upstream_oid, false, "itrack: adopt upstream")?;
                repo.set_head(&local_ref)?;
                info!("Adopted {} as {}", upstream_name, branch);
                return Ok(PullOutcome::FastForwarded);
            };
            let local_oid = local
                .target()
                .ok_or_else(|| VcsError::InvalidReference(local_ref.clone()))?;

            if local_oid == upstream_oid {
                return Ok(PullOutcome::UpToDate);
            }

            let (ahead, behind) = repo.graph_ahead_behind(local_oid, upstream_oid)?;
            if behind == 0 {
                return Ok(PullOutcome::UpToDate);
            }

            if ahead == 0 {
                checkout_commit(repo, upstream_oid)?;
                local.set_target(upstream_oid, "itrack: fast-forward")?;
                repo.set_head(&local_ref)?;
                info!("Fast-forwarded {} by {} commit(s)", branch, behind);
                return Ok(PullOutcome::FastForwarded);
            }

            let sig = ctx.signature(repo)?;
            let replayed = rebase_onto(repo, &local, &upstream, &upstream_name, &sig)?;
            info!(
                "Replayed {} local commit(s) onto {} ({} behind)",
                replayed, upstream_name, behind
            );
            Ok(PullOutcome::Rebased { replayed })
        })
        .await
    }

    async fn stage(&self, path: &Path) -> VcsResult<()> {
        let path = path.to_path_buf();
        self.with_repo(move |repo, ctx| {
            let relative = ctx.relative_path(repo, &path)?;
            let mut index = repo.index()?;
            index.add_path(&relative)?;
            index.write()?;
            debug!("Staged {}", relative.display());
            Ok(())
        })
        .await
    }

    async fn status(&self) -> VcsResult<WorkingCopyStatus> {
        self.with_repo(|repo, _| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);

            let mut status = WorkingCopyStatus::new();
            for entry in repo.statuses(Some(&mut opts))?.iter() {
                let Some(path) = entry.path() else {
                    continue;
                };
                let flags = entry.status();
                if flags.contains(Status::CONFLICTED) {
                    status.conflicted.push(path.to_string());
                }
                if flags.intersects(STAGED) {
                    status.staged.push(path.to_string());
                }
                if flags.intersects(UNSTAGED) {
                    status.unstaged.push(path.to_string());
                }
                if flags.contains(Status::WT_NEW) {
                    status.untracked.push(path.to_string());
                }
            }
            Ok(status)
        })
        .await
    }

    async fn commit(&self, branch: &str, message: &str) -> VcsResult<String> {
        let branch_ref = format!("refs/heads/{}", branch);
        let message = message.to_string();
        self.with_repo(move |repo, ctx| {
            ensure_on_branch(repo, &branch_ref)?;
            let sig = ctx.signature(repo)?;
            let mut index = repo.index()?;
            let tree = repo.find_tree(index.write_tree()?)?;

            let parent = match find_optional_reference(repo, &branch_ref)? {
                Some(reference) => Some(reference.peel_to_commit()?),
                None => None,
            };
            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

            let oid = repo.commit(Some(&branch_ref), &sig, &sig, &message, &tree, &parents)?;

            let head = repo.find_reference("HEAD")?;
            if head.symbolic_target() != Some(branch_ref.as_str()) {
                repo.set_head(&branch_ref)?;
            }

            debug!("Committed {} on {}", oid, branch_ref);
            Ok(oid.to_string())
        })
        .await
    }

    async fn push(&self, remote: &str, branch: &str) -> VcsResult<()> {
        let remote = remote.to_string();
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.with_repo(move |repo, ctx| {
            let mut git_remote = repo
                .find_remote(&remote)
                .map_err(|_| VcsError::RemoteNotFound(remote.clone()))?;

            let rejected: RefCell<Option<(String, String)>> = RefCell::new(None);
            let mut callbacks = ctx.remote_callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(reason) = status {
                    *rejected.borrow_mut() = Some((refname.to_string(), reason.to_string()));
                }
                Ok(())
            });

            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            git_remote.push(&[refspec.as_str()], Some(&mut opts))?;
            drop(opts);

            if let Some((refname, reason)) = rejected.into_inner() {
                warn!("Remote rejected {}: {}", refname, reason);
                return Err(VcsError::PushRejected { refname, reason });
            }

            info!("Pushed {} to {}", refspec, remote);
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "libgit2"
    }
}
