//! `pullsync run` – start lftp, configure it, and drive the controller until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pullsync_core::controller::{Controller, ControllerSettings};
use pullsync_core::engine::{LftpProcess, TransferEngine};
use pullsync_core::extract::CommandExtractor;
use pullsync_core::model::{ItemSnapshot, LifecycleState, SharedModel};
use pullsync_core::scanner::{FsLocalLister, LftpRemoteLister};

use crate::cli::load_config;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const STATE_ORDER: [LifecycleState; 7] = [
    LifecycleState::Queued,
    LifecycleState::Downloading,
    LifecycleState::Downloaded,
    LifecycleState::Extracting,
    LifecycleState::Extracted,
    LifecycleState::DownloadFailed,
    LifecycleState::ExtractFailed,
];

pub async fn run_daemon(config: Option<&Path>, lftp: &Path, extractor: &Path) -> Result<()> {
    let (cfg, path) = load_config(config)?;
    tracing::info!(path = %path.display(), "loaded config");
    tracing::debug!("config: {:?}", cfg.redacted());

    let session = LftpProcess::spawn(lftp).context("start lftp")?;
    let engine = Arc::new(TransferEngine::new(Box::new(session), cfg.command_timeout()));
    engine
        .configure(&cfg.credentials(), &cfg.connection_limits())
        .await
        .context("configure lftp session")?;

    let remote = LftpRemoteLister::new(
        lftp,
        cfg.credentials(),
        cfg.lftp.remote_path.clone(),
        cfg.command_timeout(),
    );
    let controller = Arc::new(Controller::new(
        ControllerSettings::from_config(&cfg),
        engine,
        Box::new(remote),
        Box::new(FsLocalLister::new(&cfg.lftp.local_path)),
        Box::new(CommandExtractor::new(extractor)),
    ));

    let handle = Arc::clone(&controller).spawn();
    let reporter = tokio::spawn(report_changes(controller.model()));

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
    tracing::info!("Ctrl-C received, shutting down");
    reporter.abort();
    handle.shutdown().await;
    Ok(())
}

/// Log a one-line summary whenever any item changes state.
async fn report_changes(model: SharedModel) {
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    let mut last: Vec<(String, LifecycleState)> = Vec::new();
    loop {
        ticker.tick().await;
        let snapshot = model.snapshot();
        let states: Vec<_> = snapshot.iter().map(|s| (s.name.clone(), s.state)).collect();
        if states != last {
            tracing::info!("{}", summarize(&snapshot));
            last = states;
        }
    }
}

/// e.g. `5 items: 2 QUEUED, 3 DOWNLOADING`
pub(crate) fn summarize(snapshot: &[ItemSnapshot]) -> String {
    let counts: Vec<String> = STATE_ORDER
        .iter()
        .filter_map(|state| {
            let n = snapshot.iter().filter(|s| s.state == *state).count();
            (n > 0).then(|| format!("{} {}", n, state))
        })
        .collect();
    let noun = if snapshot.len() == 1 { "item" } else { "items" };
    if counts.is_empty() {
        format!("{} {}", snapshot.len(), noun)
    } else {
        format!("{} {}: {}", snapshot.len(), noun, counts.join(", "))
    }
}
