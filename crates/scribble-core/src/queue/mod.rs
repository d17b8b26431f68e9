//! Pending change queue.
//!
//! Durable list of local mutations awaiting remote confirmation, plus the
//! sync metadata persisted next to it. Every mutation is written through to
//! storage before the in-memory copy changes, so a crash never loses a change
//! the caller was told about.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{ChangeId, ChangeKind, ChangeTarget, PendingChange};
use crate::services::DatabaseService;
use crate::util::now_ms;
use crate::Result;

/// Storage namespace owned by the queue
pub const QUEUE_NAMESPACE: &str = "offline-queue";

const PENDING_KEY: &str = "pending_changes";
const META_KEY: &str = "sync_meta";
const CORRUPT_SUFFIX: &str = ".corrupt-";

/// Sync bookkeeping persisted alongside the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// A pass is in progress
    #[serde(default)]
    pub is_syncing: bool,
    /// Start of the most recent pass (Unix ms)
    #[serde(default)]
    pub last_sync_attempt: Option<i64>,
}

#[derive(Debug, Default)]
struct QueueState {
    changes: Vec<PendingChange>,
    meta: SyncMeta,
}

/// Handle to the pending change queue; clones share the same state
#[derive(Clone)]
pub struct PendingChangeQueue {
    db: DatabaseService,
    state: Arc<Mutex<QueueState>>,
}

impl PendingChangeQueue {
    /// Load the queue and its metadata from storage.
    ///
    /// A persisted in-progress flag can only come from an interrupted process
    /// and is reset.
    pub async fn open(db: DatabaseService) -> Result<Self> {
        let changes = match db.kv_get(QUEUE_NAMESPACE, PENDING_KEY).await? {
            Some(entry) => match serde_json::from_str::<Vec<PendingChange>>(&entry.value) {
                Ok(changes) => changes,
                Err(error) => {
                    Self::quarantine_unreadable(&db, &entry.value, &error).await?;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut meta = match db.kv_get(QUEUE_NAMESPACE, META_KEY).await? {
            Some(entry) => serde_json::from_str::<SyncMeta>(&entry.value).unwrap_or_default(),
            None => SyncMeta::default(),
        };

        let queue = Self {
            db,
            state: Arc::new(Mutex::new(QueueState::default())),
        };

        if meta.is_syncing {
            tracing::info!("Resetting sync flag left over from an interrupted pass");
            meta.is_syncing = false;
            queue.persist_meta(&meta).await?;
        }

        if !changes.is_empty() {
            tracing::info!("Loaded {} pending change(s)", changes.len());
        }

        {
            let mut state = queue.state.lock().await;
            state.changes = changes;
            state.meta = meta;
        }

        Ok(queue)
    }

    /// Keep an unreadable change list under a side key so later writes to
    /// the live key cannot destroy it.
    async fn quarantine_unreadable(
        db: &DatabaseService,
        raw: &str,
        error: &serde_json::Error,
    ) -> Result<()> {
        let timestamp = now_ms();
        let backup_key = format!("{PENDING_KEY}{CORRUPT_SUFFIX}{timestamp}");
        db.kv_put(QUEUE_NAMESPACE, &backup_key, raw, timestamp)
            .await?;
        tracing::warn!(
            "Unreadable pending change list moved to {}/{}: {}",
            QUEUE_NAMESPACE,
            backup_key,
            error
        );
        Ok(())
    }

    async fn persist_changes(&self, changes: &[PendingChange]) -> Result<()> {
        let json = serde_json::to_string(changes)?;
        self.db
            .kv_put(QUEUE_NAMESPACE, PENDING_KEY, &json, now_ms())
            .await
    }

    async fn persist_meta(&self, meta: &SyncMeta) -> Result<()> {
        let json = serde_json::to_string(meta)?;
        self.db
            .kv_put(QUEUE_NAMESPACE, META_KEY, &json, now_ms())
            .await
    }

    /// Record a local mutation for later delivery.
    ///
    /// A queued change with the same target is superseded by the new one.
    pub async fn enqueue(&self, kind: ChangeKind) -> Result<PendingChange> {
        let mut state = self.state.lock().await;
        let change = PendingChange::new(kind, now_ms());

        let mut next = state.changes.clone();
        if let Some(target) = change.target() {
            let before = next.len();
            next.retain(|queued| queued.target().as_ref() != Some(&target));
            if next.len() < before {
                tracing::debug!("Superseded queued change for {:?}", target);
            }
        }
        next.push(change.clone());

        self.persist_changes(&next).await?;
        state.changes = next;

        tracing::debug!("Queued {} ({})", change.kind.describe(), change.id);
        Ok(change)
    }

    /// Remove a change the remote confirmed or rejected for good
    pub async fn dequeue_confirmed(&self, id: &ChangeId) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.changes.iter().any(|change| change.id == *id) {
            return Ok(false);
        }

        let next: Vec<PendingChange> = state
            .changes
            .iter()
            .filter(|change| change.id != *id)
            .cloned()
            .collect();
        self.persist_changes(&next).await?;
        state.changes = next;
        Ok(true)
    }

    /// Drop every queued change
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.persist_changes(&[]).await?;
        state.changes.clear();
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.changes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.changes.is_empty()
    }

    /// Copy of the queued changes in storage order
    pub async fn snapshot(&self) -> Vec<PendingChange> {
        self.state.lock().await.changes.clone()
    }

    pub async fn contains_target(&self, target: &ChangeTarget) -> bool {
        self.state
            .lock()
            .await
            .changes
            .iter()
            .any(|change| change.target().as_ref() == Some(target))
    }

    /// Mark a pass as started at `now`
    pub async fn begin_sync(&self, now: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let meta = SyncMeta {
            is_syncing: true,
            last_sync_attempt: Some(now),
        };
        self.persist_meta(&meta).await?;
        state.meta = meta;
        Ok(())
    }

    /// Mark the running pass as finished
    pub async fn finish_sync(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let meta = SyncMeta {
            is_syncing: false,
            ..state.meta
        };
        self.persist_meta(&meta).await?;
        state.meta = meta;
        Ok(())
    }

    pub async fn meta(&self) -> SyncMeta {
        self.state.lock().await.meta
    }

    pub async fn is_syncing(&self) -> bool {
        self.state.lock().await.meta.is_syncing
    }

    pub async fn last_sync_attempt(&self) -> Option<i64> {
        self.state.lock().await.meta.last_sync_attempt
    }

    /// Write the current in-memory state back to storage
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.persist_changes(&state.changes).await?;
        self.persist_meta(&state.meta).await
    }
}
