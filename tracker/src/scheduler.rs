//! Fixed-period timer driving reconciliation cycles.

use crate::notify::Notice;
use crate::reconciler::Reconciler;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Interval must be greater than 0")]
    ZeroInterval,

    #[error("Tracking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running timer for one working copy.
///
/// Dropping the handle cancels the timer as well; [`TrackingHandle::stop`]
/// additionally waits for an in-flight cycle and hands the reconciler back.
pub struct TrackingHandle {
    path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Reconciler>,
}

impl TrackingHandle {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop firing. A cycle already in progress runs to completion first.
    pub async fn stop(mut self) -> Result<Reconciler, SchedulerError> {
        if let Some(shutdown) = self.shutdown.take() {
            // the task may already be gone
            let _ = shutdown.send(());
        }
        Ok((&mut self.task).await?)
    }
}

/// Fire a cycle on `reconciler` every `interval`, first one `interval` from now.
///
/// Cycles of one timer never overlap; ticks missed while a cycle runs are
/// dropped rather than replayed.
pub fn start_tracking(
    reconciler: Reconciler,
    interval: Duration,
) -> Result<TrackingHandle, SchedulerError> {
    if interval.is_zero() {
        return Err(SchedulerError::ZeroInterval);
    }

    let path = reconciler.handle().path().to_path_buf();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    reconciler.notifier().notify(&Notice::TrackingStarted {
        path: path.clone(),
        interval,
    });

    let task = tokio::spawn(run_timer(reconciler, interval, shutdown_rx));

    Ok(TrackingHandle {
        path,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn run_timer(
    mut reconciler: Reconciler,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> Reconciler {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                cycles += 1;
                debug!("Timer fired (cycle {})", cycles);
                // the result has already been reported to the user
                let _ = reconciler.run_cycle().await;
            }
        }
    }

    info!(
        "Timer for {} stopped after {} cycle(s)",
        reconciler.handle().path().display(),
        cycles
    );
    reconciler.notifier().notify(&Notice::TrackingStopped {
        path: reconciler.handle().path().to_path_buf(),
    });
    reconciler
}
