//! The orchestration state machine.
//!
//! Three passes reconcile the shared [`Model`] with the outside world:
//! the remote scan discovers names, the downloading scan polls lftp, admits
//! queued items and retires vanished jobs, and the local scan confirms
//! finished downloads and runs extraction. Passes never hold the model lock
//! across an `.await`: they lock, decide, unlock, do I/O, then lock again to
//! apply the outcome.

mod reconcile;
mod runtime;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::autoqueue::AutoQueue;
use crate::config::PullsyncConfig;
use crate::engine::{EngineError, TransferEngine, TransferOptions};
use crate::job_status::UNASSIGNED_JOB_ID;
use crate::extract::Extractor;
use crate::model::{Item, ItemKind, ItemSnapshot, LifecycleState, Model, SharedModel};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::scanner::{LocalLister, RemoteEntry, RemoteLister};

pub use runtime::ControllerHandle;

/// Everything the passes read from configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub remote_scan_interval: Duration,
    pub local_scan_interval: Duration,
    pub downloading_scan_interval: Duration,
    /// Global admission cap.
    pub max_parallel_downloads: u32,
    pub mirror_options: TransferOptions,
    pub pget_options: TransferOptions,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub extract_dir: PathBuf,
    pub retry: RetryPolicy,
    pub shutdown_grace: Duration,
    pub autoqueue: AutoQueue,
}

impl ControllerSettings {
    pub fn from_config(cfg: &PullsyncConfig) -> Self {
        let l = &cfg.lftp;
        let c = &cfg.controller;
        Self {
            remote_scan_interval: Duration::from_millis(c.interval_ms_remote_scan),
            local_scan_interval: Duration::from_millis(c.interval_ms_local_scan),
            downloading_scan_interval: Duration::from_millis(c.interval_ms_downloading_scan),
            max_parallel_downloads: l.num_max_parallel_downloads,
            mirror_options: TransferOptions {
                parallel_files: l.num_max_parallel_files_per_download,
                connections_per_file: l.num_max_connections_per_dir_file,
            },
            pget_options: TransferOptions {
                parallel_files: 1,
                connections_per_file: l.num_max_connections_per_root_file,
            },
            remote_path: l.remote_path.clone(),
            local_path: PathBuf::from(&l.local_path),
            extract_dir: cfg.extract_dir(),
            retry: RetryPolicy {
                max_retries: c.max_retries,
                confirmation_grace: Duration::from_millis(c.confirmation_grace_ms),
            },
            shutdown_grace: Duration::from_millis(c.shutdown_grace_ms),
            autoqueue: AutoQueue::from_config(&cfg.autoqueue),
        }
    }
}

/// Error returned by external requests ([`Controller::queue`], [`Controller::remove`]).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("`{0}` is not in the latest remote listing")]
    NotOnRemote(String),
    #[error("`{0}` is already tracked")]
    AlreadyPresent(String),
    #[error("no item named `{0}`")]
    UnknownItem(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Default)]
struct RemoteState {
    /// Latest successful remote listing.
    listing: Vec<RemoteEntry>,
    /// Names removed on request; not auto-queued again while still listed.
    dismissed: HashSet<String>,
}

pub struct Controller {
    settings: ControllerSettings,
    model: SharedModel,
    engine: Arc<TransferEngine>,
    remote: Box<dyn RemoteLister>,
    local: Box<dyn LocalLister>,
    extractor: Box<dyn Extractor>,
    remote_state: Mutex<RemoteState>,
}

impl Controller {
    pub fn new(
        settings: ControllerSettings,
        engine: Arc<TransferEngine>,
        remote: Box<dyn RemoteLister>,
        local: Box<dyn LocalLister>,
        extractor: Box<dyn Extractor>,
    ) -> Self {
        Self {
            settings,
            model: SharedModel::new(Model::new()),
            engine,
            remote,
            local,
            extractor,
            remote_state: Mutex::new(RemoteState::default()),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Shared read access to the model.
    pub fn model(&self) -> SharedModel {
        self.model.clone()
    }

    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.model.snapshot()
    }

    /// Queue every newly listed remote name the auto-queue policy admits.
    pub async fn remote_scan(&self) {
        let entries = match self.remote.list().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("remote scan failed: {}", e);
                return;
            }
        };

        let mut state = self.remote_state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .dismissed
            .retain(|name| entries.iter().any(|e| &e.name == name));
        let added = self.model.write(|m| {
            reconcile::apply_remote_listing(m, &entries, &self.settings.autoqueue, &state.dismissed)
        });
        let tracked = self.model.read(Model::len);
        tracing::debug!(listed = entries.len(), added, tracked, "remote scan");
        state.listing = entries;
    }

    /// Poll lftp, retire vanished jobs and admit queued items up to the cap.
    pub async fn downloading_scan(&self) {
        let status = match self.engine.poll_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("downloading scan skipped: {}", e);
                return;
            }
        };

        let now = Instant::now();
        let retry = &self.settings.retry;
        let admissions = self.model.write(|m| {
            reconcile::apply_status(m, &status, retry, now);
            reconcile::select_admissions(m, self.settings.max_parallel_downloads)
        });

        for (name, kind) in admissions {
            let result = self.start(&name, kind).await;
            if result.is_ok() && !self.model.read(|m| m.contains(&name)) {
                tracing::info!(item = %name, "item removed while starting; withdrawing its transfer");
                if let Err(e) = self.withdraw(&name).await {
                    tracing::warn!(item = %name, "could not withdraw transfer: {}", e);
                }
                continue;
            }
            let decision = self
                .model
                .write(|m| reconcile::apply_start_result(m, &name, result.as_ref().err(), retry));
            if decision == Some(RetryDecision::AbortPass) {
                tracing::warn!("lost lftp session while admitting `{}`; retrying next pass", name);
                break;
            }
        }
    }

    /// Confirm downloads that vanished from lftp and extract them if enabled.
    pub async fn local_scan(&self) {
        let entries = match self.local.list().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("local scan failed: {}", e);
                return;
            }
        };

        let confirmed = self.model.write(|m| reconcile::confirm_downloads(m, &entries));
        if !self.settings.autoqueue.auto_extract {
            return;
        }
        for (name, kind) in confirmed {
            let path = self.settings.local_path.join(&name);
            if self.extractor.is_extractable(&path, kind).await {
                self.extract_item(&name, kind, &path).await;
            }
        }
    }

    /// Manually queue a name from the latest remote listing.
    pub fn queue(&self, name: &str) -> Result<(), ControllerError> {
        let mut state = self.remote_state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = state
            .listing
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| ControllerError::NotOnRemote(name.to_string()))?;
        let inserted = self
            .model
            .write(|m| m.insert(Item::new(entry.name, entry.kind, entry.size)));
        if !inserted {
            return Err(ControllerError::AlreadyPresent(name.to_string()));
        }
        state.dismissed.remove(name);
        Ok(())
    }

    /// Forget an item. A downloading item has its lftp job cancelled, or its
    /// queued command deleted when lftp has not assigned an id yet.
    pub async fn remove(&self, name: &str) -> Result<(), ControllerError> {
        let (state, job_id) = self
            .model
            .read(|m| m.get(name).map(|i| (i.state, i.last_seen_job_id)))
            .ok_or_else(|| ControllerError::UnknownItem(name.to_string()))?;

        if state == LifecycleState::Downloading {
            match job_id {
                Some(id) => self.engine.cancel(id).await?,
                None => self.withdraw(name).await?,
            }
        }
        self.model.write(|m| m.remove(name));
        self.remote_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dismissed
            .insert(name.to_string());
        tracing::info!(item = %name, "item removed");
        Ok(())
    }

    /// Cancel or dequeue whatever lftp holds for `name`.
    async fn withdraw(&self, name: &str) -> Result<(), EngineError> {
        let jobs = self.engine.query_status().await?;
        let mut queued = false;
        for job in jobs.iter().filter(|j| j.name() == name) {
            if job.id() == UNASSIGNED_JOB_ID {
                queued = true;
            } else {
                self.engine.cancel(job.id()).await?;
            }
        }
        if queued {
            self.engine.dequeue(&self.remote_path(name)).await?;
        }
        Ok(())
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.settings.remote_path.trim_end_matches('/'), name)
    }

    async fn start(&self, name: &str, kind: ItemKind) -> Result<(), EngineError> {
        let remote = self.remote_path(name);
        let local = self.settings.local_path.join(name);
        let local = local.to_string_lossy();
        match kind {
            ItemKind::Directory => {
                self.engine
                    .start_mirror(&remote, &local, &self.settings.mirror_options)
                    .await
            }
            ItemKind::File => {
                self.engine
                    .start_pget(&remote, &local, &self.settings.pget_options)
                    .await
            }
        }
    }

    async fn extract_item(&self, name: &str, kind: ItemKind, path: &Path) {
        let started = self.model.write(|m| match m.get_mut(name) {
            Some(item) if item.state == LifecycleState::Downloaded => {
                item.transition(LifecycleState::Extracting);
                true
            }
            _ => false,
        });
        if !started {
            return;
        }

        let result = self
            .extractor
            .extract(path, kind, &self.settings.extract_dir)
            .await;
        self.model.write(|m| {
            let Some(item) = m.get_mut(name) else {
                return;
            };
            if item.state != LifecycleState::Extracting {
                return;
            }
            match result {
                Ok(()) => item.transition(LifecycleState::Extracted),
                Err(e) => {
                    tracing::warn!(item = %name, "extraction failed: {}", e);
                    item.transition(LifecycleState::ExtractFailed);
                }
            }
        });
    }
}
