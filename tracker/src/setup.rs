//! One-shot setup: provision the remote, bind the local working copy and build
//! the reconciler that will own it.

use crate::artifact::ArtifactError;
use crate::config::{Credentials, TrackerConfig};
use crate::git::{initialize_working_copy, Git2Backend, InitOutcome, RepositoryHandle, VcsError};
use crate::locks::RepoLocks;
use crate::notify::{Notice, Notifier};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use forge::{CreateRepositoryRequest, ForgeError, ProvisionStatus, RemoteProvisioner};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failures that prevent tracking from starting at all.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Workspace folder {0} not found")]
    WorkspaceMissing(PathBuf),

    #[error("Could not provision remote repository: {0}")]
    Provision(#[from] ForgeError),

    #[error("Could not initialize working copy: {0}")]
    WorkingCopy(#[from] VcsError),

    #[error("Could not scan existing artifacts: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Setup task failed: {0}")]
    Task(String),
}

/// Create the remote repository (or accept the existing one) and bind the
/// working copy `<workspace>/<repo_name>` to it.
pub async fn provision_and_initialize(
    config: &TrackerConfig,
    provisioner: &dyn RemoteProvisioner,
    notifier: &dyn Notifier,
) -> Result<RepositoryHandle, SetupError> {
    let result = provision_inner(config, provisioner, notifier).await;
    if let Err(e) = &result {
        notifier.notify(&Notice::SetupFailed {
            reason: e.to_string(),
        });
    }
    result
}

async fn provision_inner(
    config: &TrackerConfig,
    provisioner: &dyn RemoteProvisioner,
    notifier: &dyn Notifier,
) -> Result<RepositoryHandle, SetupError> {
    config.validate().map_err(SetupError::InvalidConfig)?;

    if !config.workspace.is_dir() {
        return Err(SetupError::WorkspaceMissing(config.workspace.clone()));
    }

    let request = CreateRepositoryRequest::new(&config.repo_name).with_private(config.private);
    debug!(
        "Provisioning {} through {}",
        request.name,
        provisioner.provider_name()
    );

    let provisioned = match provisioner.ensure_repository(&request).await {
        Ok(provisioned) => provisioned,
        Err(e) => {
            notifier.notify(&Notice::ProvisioningFailed {
                reason: e.to_string(),
            });
            return Err(e.into());
        }
    };

    notifier.notify(&match provisioned.status {
        ProvisionStatus::Created => Notice::RepositoryCreated {
            name: provisioned.name.clone(),
        },
        ProvisionStatus::AlreadyExists => Notice::RepositoryExists {
            name: provisioned.name.clone(),
        },
    });

    let path = config.working_copy_path();
    let remote_name = config.remote_name.clone();
    let default_branch = config.default_branch.clone();
    let clone_url = provisioned.clone_url.clone();

    let (handle, outcome) = tokio::task::spawn_blocking(move || {
        initialize_working_copy(&path, &remote_name, &clone_url, &default_branch)
    })
    .await
    .map_err(|e| SetupError::Task(e.to_string()))??;

    debug!("Working copy {}: {:?}", handle.path().display(), outcome);
    if outcome == InitOutcome::Reused && handle.remote_url != provisioned.clone_url {
        warn!(
            "{} keeps its existing remote {} (provisioned {})",
            handle.path().display(),
            handle.remote_url,
            provisioned.clone_url
        );
    }
    notifier.notify(&Notice::WorkingCopyInitialized {
        path: handle.path().to_path_buf(),
    });

    Ok(handle)
}

/// Build the reconciler for `handle` using the libgit2 backend.
pub fn build_reconciler(
    config: &TrackerConfig,
    handle: RepositoryHandle,
    credentials: &Credentials,
    notifier: Arc<dyn Notifier>,
    locks: RepoLocks,
) -> Result<Reconciler, SetupError> {
    let backend = Git2Backend::new(handle.clone())
        .with_credentials(credentials.git())
        .with_author(config.author());

    Ok(Reconciler::new(
        handle,
        Arc::new(backend),
        ReconcilerConfig::from(config),
        notifier,
        locks,
    )?)
}
