//! Timer-driven pass loops and cooperative shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use super::Controller;
use crate::engine::TransferEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    RemoteScan,
    LocalScan,
    DownloadingScan,
}

impl Controller {
    async fn run_pass(&self, pass: Pass) {
        match pass {
            Pass::RemoteScan => self.remote_scan().await,
            Pass::LocalScan => self.local_scan().await,
            Pass::DownloadingScan => self.downloading_scan().await,
        }
    }

    /// Start the three pass loops. Each loop runs its first pass immediately.
    pub fn spawn(self: Arc<Self>) -> ControllerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let schedule = [
            (Pass::RemoteScan, self.settings.remote_scan_interval),
            (Pass::LocalScan, self.settings.local_scan_interval),
            (Pass::DownloadingScan, self.settings.downloading_scan_interval),
        ];
        let mut tasks = JoinSet::new();
        for (pass, period) in schedule {
            tasks.spawn(pass_loop(Arc::clone(&self), pass, period, stop_rx.clone()));
        }
        tracing::info!("controller started");
        ControllerHandle {
            stop: stop_tx,
            tasks,
            engine: Arc::clone(&self.engine),
            grace: self.settings.shutdown_grace,
        }
    }
}

/// A pass that has started always runs to completion; the stop signal is only
/// observed between passes.
async fn pass_loop(
    controller: Arc<Controller>,
    pass: Pass,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => controller.run_pass(pass).await,
        }
    }
    tracing::debug!(?pass, "pass loop stopped");
}

/// Returned by [`Controller::spawn`]. Dropping it without calling
/// [`ControllerHandle::shutdown`] aborts the pass loops.
pub struct ControllerHandle {
    stop: watch::Sender<bool>,
    tasks: JoinSet<()>,
    engine: Arc<TransferEngine>,
    grace: Duration,
}

impl ControllerHandle {
    /// Stop scheduling passes, wait up to the shutdown grace for running
    /// passes, then close the lftp session.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    if e.is_panic() {
                        tracing::warn!("controller pass panicked: {}", e);
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "passes still running after {} ms; aborting them",
                self.grace.as_millis()
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
        self.engine.shutdown().await;
        tracing::info!("controller stopped");
    }
}
