//! Pure model updates applied by the passes while holding the model lock.

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;

use crate::autoqueue::AutoQueue;
use crate::engine::EngineError;
use crate::job_status::{JobState, JobStatus, UNASSIGNED_JOB_ID};
use crate::model::{DownloadPhase, Item, ItemKind, LifecycleState, Model};
use crate::retry::{classify, ErrorKind, RetryDecision, RetryPolicy};
use crate::scanner::{LocalEntry, RemoteEntry};
use crate::status_parser::ParsedStatus;

/// Add newly listed names the policy admits. Returns how many were added.
pub(crate) fn apply_remote_listing(
    model: &mut Model,
    entries: &[RemoteEntry],
    autoqueue: &AutoQueue,
    dismissed: &HashSet<String>,
) -> usize {
    let mut added = 0;
    for entry in entries {
        if let Some(item) = model.get_mut(&entry.name) {
            if entry.size.is_some() {
                item.remote_size = entry.size;
            }
            continue;
        }
        if dismissed.contains(&entry.name) || !autoqueue.admits(&entry.name) {
            continue;
        }
        if model.insert(Item::new(entry.name.clone(), entry.kind, entry.size)) {
            added += 1;
        }
    }
    added
}

/// Fold one status listing into the model.
///
/// Jobs are matched to items by name. A running entry wins over a queued one
/// with the same name. An item whose last known job sits in a block the
/// parser dropped is left alone until a readable listing shows it.
pub(crate) fn apply_status(
    model: &mut Model,
    status: &ParsedStatus,
    policy: &RetryPolicy,
    now: Instant,
) {
    let mut by_name: HashMap<&str, &JobStatus> = HashMap::new();
    for job in &status.jobs {
        by_name
            .entry(job.name())
            .and_modify(|seen| {
                if job.state() == JobState::Running {
                    *seen = job;
                }
            })
            .or_insert(job);
    }

    for item in model.iter_mut() {
        let job = by_name.get(item.name.as_str()).copied();
        match (item.state, job) {
            (LifecycleState::Downloading, Some(job)) => {
                observe(item, job);
                if item.is_pending_confirmation() {
                    tracing::debug!(item = %item.name, "job reappeared");
                    item.phase = DownloadPhase::Active;
                }
            }
            (LifecycleState::Downloading, None) => {
                if status.was_dropped(item.last_seen_job_id.unwrap_or(UNASSIGNED_JOB_ID)) {
                    tracing::debug!(item = %item.name, "job status unreadable this pass");
                    continue;
                }
                retire_vanished(item, policy, now);
            }
            (LifecycleState::Queued, Some(job)) => {
                tracing::info!(item = %item.name, job_id = job.id(), "adopting existing lftp job");
                item.transition(LifecycleState::Downloading);
                observe(item, job);
            }
            (LifecycleState::Downloaded, Some(job)) if job.state() == JobState::Running => {
                tracing::warn!(
                    item = %item.name,
                    job_id = job.id(),
                    "confirmed item is still transferring; tracking it again"
                );
                item.transition(LifecycleState::Downloading);
                observe(item, job);
            }
            (state, Some(job)) if state.is_terminal() => {
                tracing::debug!(item = %item.name, job_id = job.id(), "ignoring lftp job for finished item");
            }
            _ => {}
        }
    }
}

fn observe(item: &mut Item, job: &JobStatus) {
    if job.id() != UNASSIGNED_JOB_ID {
        item.last_seen_job_id = Some(job.id());
    }
    if let Some(total) = job.total_transfer_state() {
        item.transfer = Some(*total);
    }
}

fn retire_vanished(item: &mut Item, policy: &RetryPolicy, now: Instant) {
    match item.phase {
        DownloadPhase::Active => {
            tracing::debug!(item = %item.name, "job gone; waiting for local confirmation");
            item.phase = DownloadPhase::PendingConfirmation { since: now };
        }
        DownloadPhase::PendingConfirmation { since } if policy.grace_expired(since, now) => {
            item.retry_count += 1;
            match policy.decide(item.retry_count, ErrorKind::Vanished) {
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        item = %item.name,
                        retries = item.retry_count,
                        "download never confirmed; giving up"
                    );
                    item.transition(LifecycleState::DownloadFailed);
                }
                _ => {
                    tracing::warn!(
                        item = %item.name,
                        retries = item.retry_count,
                        "download not confirmed within grace window; requeueing"
                    );
                    item.transition(LifecycleState::Queued);
                    item.transfer = None;
                }
            }
        }
        DownloadPhase::PendingConfirmation { .. } => {}
    }
}

/// First queued items, in model order, that fit under the admission cap.
pub(crate) fn select_admissions(model: &Model, max_parallel: u32) -> Vec<(String, ItemKind)> {
    let downloading = model.count_in(LifecycleState::Downloading);
    let slots = (max_parallel as usize).saturating_sub(downloading);
    model
        .iter()
        .filter(|i| i.state == LifecycleState::Queued)
        .take(slots)
        .map(|i| (i.name.clone(), i.kind))
        .collect()
}

/// Record the outcome of one start command. `None` when the item is gone or
/// no longer queued.
pub(crate) fn apply_start_result(
    model: &mut Model,
    name: &str,
    error: Option<&EngineError>,
    policy: &RetryPolicy,
) -> Option<RetryDecision> {
    let item = model.get_mut(name)?;
    if item.state != LifecycleState::Queued {
        return None;
    }
    let Some(error) = error else {
        item.transition(LifecycleState::Downloading);
        item.transfer = None;
        return None;
    };

    let kind = classify(error);
    if kind == ErrorKind::Connection {
        return Some(RetryDecision::AbortPass);
    }
    item.retry_count += 1;
    let decision = policy.decide(item.retry_count, kind);
    if decision == RetryDecision::GiveUp {
        tracing::warn!(item = %name, retries = item.retry_count, "start rejected: {}; giving up", error);
        item.transition(LifecycleState::DownloadFailed);
    } else {
        tracing::warn!(item = %name, retries = item.retry_count, "start rejected: {}", error);
    }
    Some(decision)
}

/// Move items pending confirmation that now exist locally to `DOWNLOADED`.
/// Returns them in model order.
pub(crate) fn confirm_downloads(model: &mut Model, local: &[LocalEntry]) -> Vec<(String, ItemKind)> {
    let on_disk: HashMap<&str, &LocalEntry> = local.iter().map(|e| (e.name.as_str(), e)).collect();
    let mut confirmed = Vec::new();
    for item in model.iter_mut() {
        if !item.is_pending_confirmation() {
            continue;
        }
        let Some(entry) = on_disk.get(item.name.as_str()) else {
            continue;
        };
        if let Some(remote) = item.remote_size {
            // Directory sizes come from `du`, which counts the same regular
            // files the local lister sums.
            if entry.size < remote {
                tracing::debug!(
                    item = %item.name,
                    local = entry.size,
                    remote,
                    "local copy smaller than remote"
                );
                continue;
            }
        }
        item.transition(LifecycleState::Downloaded);
        confirmed.push((item.name.clone(), item.kind));
    }
    confirmed
}
