//! User-visible notifications.
//!
//! Every state transition of setup and of a cycle is reported as a [`Notice`].
//! Notices are also logged through `tracing` at the matching level.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RepositoryCreated { name: String },
    RepositoryExists { name: String },
    ProvisioningFailed { reason: String },
    WorkingCopyInitialized { path: PathBuf },
    SetupFailed { reason: String },
    TrackingStarted { path: PathBuf, interval: Duration },
    TrackingStopped { path: PathBuf },
    CycleSkipped { path: PathBuf },
    FetchFailed { remote: String, reason: String },
    SyncFailed { branch: String, reason: String },
    Committed { summary: String, branch: String },
    PushFailed { summary: String, branch: String, reason: String },
    NoChanges,
    CycleFailed { step: &'static str, reason: String },
}

impl Notice {
    pub fn severity(&self) -> Severity {
        match self {
            Notice::RepositoryCreated { .. }
            | Notice::RepositoryExists { .. }
            | Notice::WorkingCopyInitialized { .. }
            | Notice::TrackingStarted { .. }
            | Notice::TrackingStopped { .. }
            | Notice::Committed { .. }
            | Notice::NoChanges => Severity::Info,
            Notice::CycleSkipped { .. }
            | Notice::FetchFailed { .. }
            | Notice::SyncFailed { .. }
            | Notice::PushFailed { .. } => Severity::Warning,
            Notice::ProvisioningFailed { .. }
            | Notice::SetupFailed { .. }
            | Notice::CycleFailed { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RepositoryCreated { name } => {
                write!(f, "GitHub repository {} created successfully.", name)
            }
            Notice::RepositoryExists { name } => {
                write!(f, "GitHub repository {} already exists.", name)
            }
            Notice::ProvisioningFailed { reason } => {
                write!(f, "Error creating GitHub repository: {}", reason)
            }
            Notice::WorkingCopyInitialized { path } => {
                write!(f, "Local repository initialized at {}.", path.display())
            }
            Notice::SetupFailed { reason } => write!(f, "Error setting up tracking: {}", reason),
            Notice::TrackingStarted { path, interval } => write!(
                f,
                "Tracking {} every {}s.",
                path.display(),
                interval.as_secs()
            ),
            Notice::TrackingStopped { path } => {
                write!(f, "Stopped tracking {}.", path.display())
            }
            Notice::CycleSkipped { path } => write!(
                f,
                "Skipped commit: a previous cycle on {} is still running.",
                path.display()
            ),
            Notice::FetchFailed { remote, reason } => write!(
                f,
                "Could not reach remote {}; nothing was committed: {}",
                remote, reason
            ),
            Notice::SyncFailed { branch, reason } => write!(
                f,
                "Could not sync with remote branch {}; nothing was committed: {}",
                branch, reason
            ),
            Notice::Committed { summary, branch } => {
                write!(f, "Committed and pushed changes to {}: {}", branch, summary)
            }
            Notice::PushFailed {
                summary,
                branch,
                reason,
            } => write!(
                f,
                "Committed locally ({}) but push to {} failed; will retry next cycle: {}",
                summary, branch, reason
            ),
            Notice::NoChanges => write!(f, "No changes to commit."),
            Notice::CycleFailed { step, reason } => {
                write!(f, "Error during commit process ({}): {}", step, reason)
            }
        }
    }
}

/// Channel through which notices reach the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

fn log_notice(notice: &Notice) {
    match notice.severity() {
        Severity::Info => info!("{}", notice),
        Severity::Warning => warn!("{}", notice),
        Severity::Error => error!("{}", notice),
    }
}

/// Prints notices to the terminal: info to stdout, warnings and errors to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        log_notice(notice);
        match notice.severity() {
            Severity::Info => println!("✓ {}", notice),
            Severity::Warning => eprintln!("! {}", notice),
            Severity::Error => eprintln!("✗ {}", notice),
        }
    }
}

/// Keeps every notice in memory; used when embedding the tracker and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices
            .lock()
            .ok()
            .and_then(|notices| notices.last().cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.clear();
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: &Notice) {
        log_notice(notice);
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}
