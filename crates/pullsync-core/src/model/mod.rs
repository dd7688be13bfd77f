//! Orchestration-level record of every remote entry and its lifecycle.
//!
//! The [`Model`] is the only state shared by the controller passes. All
//! mutation goes through the controller (crate-private methods); readers get
//! owned [`ItemSnapshot`]s.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::job_status::TransferState;

/// Decided once, at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Queued,
    Downloading,
    Downloaded,
    Extracting,
    Extracted,
    DownloadFailed,
    ExtractFailed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Queued => "QUEUED",
            LifecycleState::Downloading => "DOWNLOADING",
            LifecycleState::Downloaded => "DOWNLOADED",
            LifecycleState::Extracting => "EXTRACTING",
            LifecycleState::Extracted => "EXTRACTED",
            LifecycleState::DownloadFailed => "DOWNLOAD_FAILED",
            LifecycleState::ExtractFailed => "EXTRACT_FAILED",
        }
    }

    /// States the controller never leaves on its own. `Downloaded` is only
    /// terminal when auto-extract does not pick the item up.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Extracted
                | LifecycleState::DownloadFailed
                | LifecycleState::ExtractFailed
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-state of `Downloading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    /// The engine still reports a job for the item.
    Active,
    /// The job vanished at `since`; waiting for the local scan to confirm.
    PendingConfirmation { since: Instant },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub state: LifecycleState,
    pub phase: DownloadPhase,
    pub retry_count: u32,
    /// Id of the engine job last seen for this item; `None` when not
    /// downloading or while lftp has not assigned one yet.
    pub last_seen_job_id: Option<i64>,
    pub transfer: Option<TransferState>,
    pub remote_size: Option<u64>,
}

impl Item {
    pub fn new(name: impl Into<String>, kind: ItemKind, remote_size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind,
            state: LifecycleState::Queued,
            phase: DownloadPhase::Active,
            retry_count: 0,
            last_seen_job_id: None,
            transfer: None,
            remote_size,
        }
    }

    pub fn is_pending_confirmation(&self) -> bool {
        self.state == LifecycleState::Downloading
            && matches!(self.phase, DownloadPhase::PendingConfirmation { .. })
    }

    /// Move to `state`, clearing download bookkeeping.
    pub(crate) fn transition(&mut self, state: LifecycleState) {
        tracing::info!(item = %self.name, from = %self.state, to = %state, "item state change");
        self.state = state;
        self.phase = DownloadPhase::Active;
        if state != LifecycleState::Downloading {
            self.last_seen_job_id = None;
        }
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            state: self.state,
            transfer: self.transfer,
            retry_count: self.retry_count,
        }
    }
}

/// Read-only copy of one item for the presentation side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub name: String,
    pub kind: ItemKind,
    pub state: LifecycleState,
    pub transfer: Option<TransferState>,
    pub retry_count: u32,
}

/// Items keyed by name, in discovery order.
#[derive(Debug, Default)]
pub struct Model {
    items: IndexMap<String, Item>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn count_in(&self, state: LifecycleState) -> usize {
        self.items.values().filter(|i| i.state == state).count()
    }

    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.items.values().map(Item::snapshot).collect()
    }

    /// Returns false (and leaves the model unchanged) if the name exists.
    pub(crate) fn insert(&mut self, item: Item) -> bool {
        if self.items.contains_key(&item.name) {
            return false;
        }
        tracing::info!(item = %item.name, kind = ?item.kind, "new item queued");
        self.items.insert(item.name.clone(), item);
        true
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.get_mut(name)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.values_mut()
    }

    /// Removes while keeping the order of the remaining items.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Item> {
        self.items.shift_remove(name)
    }
}

/// The model behind one lock. Cloning shares the same model.
///
/// Closures passed to [`SharedModel::read`] and [`SharedModel::write`] run
/// with the lock held and must not block.
#[derive(Debug, Clone, Default)]
pub struct SharedModel {
    inner: Arc<RwLock<Model>>,
}

impl SharedModel {
    pub fn new(model: Model) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Model) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.read(Model::snapshot)
    }
}
