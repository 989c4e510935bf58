mod common;

use async_trait::async_trait;
use common::Sandbox;
use forge::{
    AccessToken, CreateRepositoryRequest, ForgeError, ForgeResult, ProvisionStatus,
    ProvisionedRepository, RemoteProvisioner,
};
use git2::Repository;
use std::sync::Arc;
use tracker::{
    build_reconciler, provision_and_initialize, CycleOutcome, MemoryNotifier, Notice, RepoLocks,
    SetupError, TrackerConfig,
};
use tracker::config::Credentials;

/// Answers every request with a fixed status and the sandbox's bare remote.
struct LocalProvisioner {
    clone_url: String,
    status: Option<ProvisionStatus>,
}

#[async_trait]
impl RemoteProvisioner for LocalProvisioner {
    async fn ensure_repository(
        &self,
        request: &CreateRepositoryRequest,
    ) -> ForgeResult<ProvisionedRepository> {
        match self.status {
            Some(status) => Ok(ProvisionedRepository {
                name: request.name.clone(),
                clone_url: self.clone_url.clone(),
                status,
            }),
            None => Err(ForgeError::Authentication { status: 401 }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

fn provisioner(sandbox: &Sandbox, status: Option<ProvisionStatus>) -> LocalProvisioner {
    LocalProvisioner {
        clone_url: sandbox.remote_url(),
        status,
    }
}

fn credentials() -> Credentials {
    Credentials {
        username: "octocat".to_string(),
        token: AccessToken::new("not-a-real-token"),
    }
}

#[tokio::test]
async fn test_setup_creates_working_copy() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let config = TrackerConfig::new().with_workspace(&sandbox.workspace);

    let handle = provision_and_initialize(
        &config,
        &provisioner(&sandbox, Some(ProvisionStatus::Created)),
        &notifier,
    )
    .await
    .unwrap();

    assert_eq!(
        handle.path().canonicalize().unwrap(),
        sandbox.workspace.join("code-tracking").canonicalize().unwrap()
    );
    assert_eq!(handle.remote_url, sandbox.remote_url());

    let repo = Repository::open(handle.path()).unwrap();
    let origin = repo.find_remote("origin").unwrap();
    assert_eq!(origin.url(), Some(sandbox.remote_url().as_str()));

    let notices = notifier.notices();
    assert_eq!(
        notices[0],
        Notice::RepositoryCreated {
            name: "code-tracking".to_string()
        }
    );
    assert!(matches!(notices[1], Notice::WorkingCopyInitialized { .. }));
}

#[tokio::test]
async fn test_setup_accepts_existing_repository() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let config = TrackerConfig::new().with_workspace(&sandbox.workspace);
    let provisioner = provisioner(&sandbox, Some(ProvisionStatus::AlreadyExists));

    provision_and_initialize(&config, &provisioner, &notifier)
        .await
        .unwrap();
    provision_and_initialize(&config, &provisioner, &notifier)
        .await
        .unwrap();

    let notices = notifier.notices();
    assert_eq!(notices.len(), 4);
    assert!(matches!(notices[0], Notice::RepositoryExists { .. }));
    assert!(matches!(notices[3], Notice::WorkingCopyInitialized { .. }));
    assert!(!notices
        .iter()
        .any(|n| matches!(n, Notice::SetupFailed { .. })));
}

#[tokio::test]
async fn test_setup_requires_existing_workspace() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let missing = sandbox.dir.path().join("nowhere");
    let config = TrackerConfig::new().with_workspace(&missing);

    let err = provision_and_initialize(
        &config,
        &provisioner(&sandbox, Some(ProvisionStatus::Created)),
        &notifier,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SetupError::WorkspaceMissing(_)));
    assert!(!missing.exists());
    assert!(matches!(
        notifier.last(),
        Some(Notice::SetupFailed { .. })
    ));
}

#[tokio::test]
async fn test_provisioning_failure_leaves_workspace_untouched() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let config = TrackerConfig::new().with_workspace(&sandbox.workspace);

    let err = provision_and_initialize(&config, &provisioner(&sandbox, None), &notifier)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SetupError::Provision(ForgeError::Authentication { status: 401 })
    ));
    assert!(!sandbox.workspace.join("code-tracking").exists());

    let notices = notifier.notices();
    assert_eq!(notices.len(), 2);
    assert!(matches!(notices[0], Notice::ProvisioningFailed { .. }));
    assert!(matches!(notices[1], Notice::SetupFailed { .. }));
}

#[tokio::test]
async fn test_setup_rejects_invalid_config() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let config = TrackerConfig::new()
        .with_workspace(&sandbox.workspace)
        .with_repo_name("../escape");

    let err = provision_and_initialize(
        &config,
        &provisioner(&sandbox, Some(ProvisionStatus::Created)),
        &notifier,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SetupError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_built_reconciler_publishes_to_provisioned_remote() {
    let sandbox = Sandbox::new();
    let notifier = MemoryNotifier::new();
    let config = TrackerConfig::new().with_workspace(&sandbox.workspace);

    let handle = provision_and_initialize(
        &config,
        &provisioner(&sandbox, Some(ProvisionStatus::Created)),
        &notifier,
    )
    .await
    .unwrap();

    let mut reconciler = build_reconciler(
        &config,
        handle,
        &credentials(),
        Arc::new(notifier.clone()),
        RepoLocks::new(),
    )
    .unwrap();

    assert!(matches!(
        reconciler.run_cycle().await.unwrap(),
        CycleOutcome::Published(_)
    ));
    assert!(sandbox.remote_has_file("code_1.md"));
}
