//! Synchronization engine.
//!
//! Drains the pending change queue against the remote store in creation
//! order, one pass at a time. Remote failures never escape a pass: they are
//! folded into a `SyncSummary` that is published once per pass. Only local
//! storage failures propagate to the caller.

mod scheduler;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::mirror::LocalMirrorStore;
use crate::models::{
    ChangeId, ChangeKind, LocalDocumentSnapshot, LocalFolderSnapshot, PageId, PendingChange,
};
use crate::queue::PendingChangeQueue;
use crate::remote::{RemoteResult, RemoteStore};
use crate::util::now_ms;
use crate::Result;

pub use scheduler::spawn_auto_sync;

const SUMMARY_CHANNEL_CAPACITY: usize = 16;

/// Why a sync request did not run a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another pass is running; a follow-up pass was scheduled
    AlreadyRunning,
    /// Nothing to send
    Empty,
    /// The remote service is unreachable
    Offline,
}

/// Result of a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    Completed(SyncSummary),
}

impl SyncOutcome {
    pub const fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub const fn summary(&self) -> Option<&SyncSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped { .. } => None,
        }
    }
}

/// Overall result of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    FullySucceeded,
    PartiallySucceeded,
    Failed,
}

/// Aggregate counts for one pass.
///
/// `failed` includes changes that were `discarded` because their target no
/// longer exists remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub discarded: usize,
}

impl SyncSummary {
    #[must_use]
    pub const fn status(&self) -> SummaryStatus {
        if self.failed == 0 {
            SummaryStatus::FullySucceeded
        } else if self.succeeded > 0 {
            SummaryStatus::PartiallySucceeded
        } else {
            SummaryStatus::Failed
        }
    }

    /// User-facing notification text
    #[must_use]
    pub fn message(&self) -> String {
        match self.status() {
            SummaryStatus::FullySucceeded => format!("{} changes synced", self.succeeded),
            SummaryStatus::PartiallySucceeded => {
                format!("{} synced, {} failed", self.succeeded, self.failed)
            }
            SummaryStatus::Failed => "sync failed".to_string(),
        }
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Idle,
    Running { retrigger: bool },
}

/// Marks a pass as running.
///
/// `finish_or_continue` releases the engine; dropping an unfinished guard
/// (error or cancellation) releases it too.
struct PassGuard<'a> {
    phase: &'a Mutex<SyncPhase>,
    released: bool,
}

impl PassGuard<'_> {
    /// Consume a retrigger request recorded while the pass was running, or
    /// return the engine to idle when there is none. Both happen under one
    /// lock so a request cannot slip in between.
    fn finish_or_continue(&mut self) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == (SyncPhase::Running { retrigger: true }) {
            *phase = SyncPhase::Running { retrigger: false };
            true
        } else {
            *phase = SyncPhase::Idle;
            self.released = true;
            false
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = SyncPhase::Idle;
        }
    }
}

/// What to record locally after the remote accepted a change
enum Confirmation {
    Document(LocalDocumentSnapshot),
    Folder(LocalFolderSnapshot),
    PageCreated(PageId),
}

pub struct SyncEngine<R: RemoteStore> {
    remote: Arc<R>,
    queue: PendingChangeQueue,
    mirror: LocalMirrorStore,
    phase: Mutex<SyncPhase>,
    summaries: broadcast::Sender<SyncSummary>,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(remote: Arc<R>, queue: PendingChangeQueue, mirror: LocalMirrorStore) -> Self {
        let (summaries, _) = broadcast::channel(SUMMARY_CHANNEL_CAPACITY);
        Self {
            remote,
            queue,
            mirror,
            phase: Mutex::new(SyncPhase::Idle),
            summaries,
        }
    }

    pub const fn queue(&self) -> &PendingChangeQueue {
        &self.queue
    }

    pub const fn mirror(&self) -> &LocalMirrorStore {
        &self.mirror
    }

    pub const fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Receive one summary per completed pass
    pub fn subscribe(&self) -> broadcast::Receiver<SyncSummary> {
        self.summaries.subscribe()
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.phase.lock().unwrap_or_else(PoisonError::into_inner),
            SyncPhase::Running { .. }
        )
    }

    fn try_begin(&self) -> Option<PassGuard<'_>> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            SyncPhase::Idle => {
                *phase = SyncPhase::Running { retrigger: false };
                Some(PassGuard {
                    phase: &self.phase,
                    released: false,
                })
            }
            SyncPhase::Running { .. } => {
                *phase = SyncPhase::Running { retrigger: true };
                None
            }
        }
    }

    /// Push every queued change to the remote store.
    ///
    /// A request arriving while a pass runs returns immediately; the running
    /// pass then follows up with the changes it did not attempt.
    pub async fn sync_pending_changes(&self) -> Result<SyncOutcome> {
        let Some(mut guard) = self.try_begin() else {
            tracing::debug!("Sync already in progress; follow-up pass scheduled");
            return Ok(SyncOutcome::skipped(SkipReason::AlreadyRunning));
        };

        let mut attempted = HashSet::new();
        let mut first = self.run_pass(&mut attempted).await?;

        while guard.finish_or_continue() {
            match (first, self.run_pass(&mut attempted).await?) {
                (None, follow_up) => first = follow_up,
                (Some(_), Some(follow_up)) => {
                    tracing::info!("Follow-up sync pass: {}", follow_up);
                }
                (Some(_), None) => {}
            }
        }

        Ok(first.map_or_else(
            || {
                tracing::debug!("No pending changes to sync");
                SyncOutcome::skipped(SkipReason::Empty)
            },
            SyncOutcome::Completed,
        ))
    }

    async fn run_pass(&self, attempted: &mut HashSet<ChangeId>) -> Result<Option<SyncSummary>> {
        let mut changes: Vec<PendingChange> = self
            .queue
            .snapshot()
            .await
            .into_iter()
            .filter(|change| !attempted.contains(&change.id))
            .collect();
        if changes.is_empty() {
            return Ok(None);
        }

        self.queue.begin_sync(now_ms()).await?;
        changes.sort_by_key(|change| change.created_at);
        tracing::info!("Starting sync of {} pending change(s)", changes.len());

        let drained = self.drain(&changes, attempted).await;
        let finished = self.queue.finish_sync().await;
        let summary = drained?;
        finished?;

        tracing::info!(
            "Sync completed: {} succeeded, {} failed ({} discarded)",
            summary.succeeded,
            summary.failed,
            summary.discarded
        );
        // No receivers is fine.
        let _ = self.summaries.send(summary);
        Ok(Some(summary))
    }

    async fn drain(
        &self,
        changes: &[PendingChange],
        attempted: &mut HashSet<ChangeId>,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        for change in changes {
            attempted.insert(change.id);
            match self.push_change(&change.kind).await {
                Ok(confirmation) => {
                    self.queue.dequeue_confirmed(&change.id).await?;
                    self.record_confirmation(confirmation).await?;
                    summary.succeeded += 1;
                    tracing::debug!("Synced {}", change.kind.describe());
                }
                Err(error) if error.is_terminal() => {
                    tracing::warn!(
                        "Dropping {}: target no longer exists ({})",
                        change.kind.describe(),
                        error
                    );
                    self.queue.dequeue_confirmed(&change.id).await?;
                    if let ChangeKind::PageUpdate(update) = &change.kind {
                        self.mirror.remove_document(&update.page_id).await?;
                    }
                    summary.failed += 1;
                    summary.discarded += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "Failed to sync {}: {} ({:?})",
                        change.kind.describe(),
                        error,
                        error.kind()
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn push_change(&self, kind: &ChangeKind) -> RemoteResult<Confirmation> {
        let confirmation = match kind {
            ChangeKind::PageUpdate(update) => {
                let row = self.remote.update_page(update).await?;
                Confirmation::Document(LocalDocumentSnapshot {
                    id: update.page_id.clone(),
                    elements: update.elements.clone(),
                    name: update.name.clone(),
                    updated_at: row.updated_at.timestamp_millis(),
                })
            }
            ChangeKind::PageCreate(create) => {
                Confirmation::PageCreated(self.remote.create_page(create).await?.page_id)
            }
            ChangeKind::FolderRename(rename) => {
                Confirmation::Folder(self.remote.rename_folder(rename).await?.into())
            }
            ChangeKind::FolderCreate(create) => {
                Confirmation::Folder(self.remote.create_folder(create).await?.into())
            }
        };
        Ok(confirmation)
    }

    async fn record_confirmation(&self, confirmation: Confirmation) -> Result<()> {
        match confirmation {
            Confirmation::Document(snapshot) => {
                self.mirror
                    .set_document(
                        &snapshot.id,
                        snapshot.elements,
                        snapshot.updated_at,
                        snapshot.name,
                    )
                    .await?;
            }
            Confirmation::Folder(snapshot) => {
                self.mirror.set_folder(&snapshot).await?;
            }
            Confirmation::PageCreated(page_id) => {
                tracing::debug!("Remote assigned id {} to queued page", page_id);
            }
        }
        Ok(())
    }
}
