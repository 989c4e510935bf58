pub mod artifact;
pub mod config;
pub mod git;
pub mod locks;
pub mod notify;
pub mod reconciler;
pub mod scheduler;
pub mod setup;

pub use artifact::{ArtifactError, ArtifactLayout, CommitCounter};
pub use config::{resolve_credentials, ConfigError, Credentials, TrackerConfig};
pub use git::{
    initialize_working_copy, Git2Backend, PullOutcome, RepositoryHandle, VcsError, VersionControl,
    WorkingCopyStatus,
};
pub use locks::{CycleGuard, RepoLocks};
pub use notify::{ConsoleNotifier, MemoryNotifier, Notice, Notifier, Severity};
pub use reconciler::{CommitRecord, CycleError, CycleOutcome, Reconciler, ReconcilerConfig};
pub use scheduler::{start_tracking, SchedulerError, TrackingHandle};
pub use setup::{build_reconciler, provision_and_initialize, SetupError};
