//! Workspace facade consumed by front-ends.
//!
//! Wires the network monitor, queue, mirror and sync engine together and
//! exposes the edit flows: write the mirror first, then try the remote
//! directly when online, and fall back to the queue otherwise.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::DatabaseService;
use crate::config::SyncTimings;
use crate::mirror::LocalMirrorStore;
use crate::models::{
    BinaryFiles, ChangeId, ChangeKind, ChangeTarget, ElementSet, FolderCreate, FolderId,
    FolderRename, LocalDocumentSnapshot, LocalFolderSnapshot, PageCreate, PageId, PageUpdate,
};
use crate::network::{ConnectivityProbe, NetworkMonitor};
use crate::queue::PendingChangeQueue;
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::{spawn_auto_sync, SkipReason, SyncEngine, SyncOutcome, SyncSummary};
use crate::util::now_ms;
use crate::Result;

/// Sync indicators shown by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_changes_count: usize,
    pub last_sync_attempt: Option<i64>,
}

/// Result of an edit to an existing page or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The remote accepted the edit
    Synced,
    /// The edit waits in the queue
    Queued(ChangeId),
}

/// Result of creating a page or folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome<Id> {
    /// The remote assigned this id
    Created(Id),
    /// The insert waits in the queue; the id is assigned when it syncs
    Queued(ChangeId),
}

pub struct Workspace<R: RemoteStore> {
    engine: Arc<SyncEngine<R>>,
    monitor: Arc<NetworkMonitor>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteStore> Workspace<R> {
    pub async fn open(
        db: DatabaseService,
        remote: Arc<R>,
        monitor: Arc<NetworkMonitor>,
    ) -> Result<Self> {
        let queue = PendingChangeQueue::open(db.clone()).await?;
        let mirror = LocalMirrorStore::new(db);
        Ok(Self {
            engine: Arc::new(SyncEngine::new(remote, queue, mirror)),
            monitor,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub const fn engine(&self) -> &Arc<SyncEngine<R>> {
        &self.engine
    }

    pub const fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &PendingChangeQueue {
        self.engine.queue()
    }

    pub fn mirror(&self) -> &LocalMirrorStore {
        self.engine.mirror()
    }

    fn remote(&self) -> &R {
        self.engine.remote()
    }

    /// Start connectivity probing and automatic sync in the background
    pub fn start<P: ConnectivityProbe>(&self, probe: P, timings: SyncTimings) {
        let probe_task = self.monitor.spawn_probe(probe, timings.probe_interval);
        let sync_task = spawn_auto_sync(
            Arc::clone(&self.engine),
            Arc::clone(&self.monitor),
            timings.sync_interval,
        );
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([probe_task, sync_task]);
    }

    /// Stop background tasks and flush queue state to storage
    pub async fn shutdown(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.queue().flush().await
    }

    pub async fn status(&self) -> SyncStatus {
        let meta = self.queue().meta().await;
        SyncStatus {
            is_online: self.monitor.is_online(),
            is_syncing: meta.is_syncing || self.engine.is_running(),
            pending_changes_count: self.queue().count().await,
            last_sync_attempt: meta.last_sync_attempt,
        }
    }

    /// Sync now on user request; does nothing while offline
    pub async fn manual_sync(&self) -> Result<SyncOutcome> {
        if !self.monitor.is_online() {
            return Ok(SyncOutcome::skipped(SkipReason::Offline));
        }
        self.engine.sync_pending_changes().await
    }

    pub fn subscribe_summaries(&self) -> broadcast::Receiver<SyncSummary> {
        self.engine.subscribe()
    }

    /// Last known content of a page, without touching the network
    pub async fn open_page(&self, page_id: &PageId) -> Result<Option<LocalDocumentSnapshot>> {
        self.mirror().get_document(page_id).await
    }

    /// Fetch a page from the remote and apply it unless the local copy is newer.
    ///
    /// Falls back to the mirror when offline or when the fetch fails.
    pub async fn refresh_page(&self, page_id: &PageId) -> Result<Option<LocalDocumentSnapshot>> {
        if self.monitor.is_online() {
            match self.remote().fetch_page(page_id).await {
                Ok(Some(row)) => {
                    let applied = self
                        .mirror()
                        .set_document(
                            page_id,
                            row.page_elements.elements,
                            row.updated_at.timestamp_millis(),
                            row.name,
                        )
                        .await?;
                    if !applied {
                        tracing::debug!("Local copy of page {} is newer than remote", page_id);
                    }
                }
                Ok(None) => tracing::warn!("Page {} not found remotely", page_id),
                Err(error) => {
                    tracing::warn!("Failed to fetch page {}: {}; using local copy", page_id, error);
                }
            }
        }
        self.open_page(page_id).await
    }

    /// Save page content: mirror first, then remote or queue
    pub async fn save_page(
        &self,
        page_id: &PageId,
        elements: ElementSet,
        name: impl Into<String>,
        files: Option<BinaryFiles>,
    ) -> Result<EditOutcome> {
        let name = name.into();
        self.mirror()
            .set_document(page_id, elements.clone(), now_ms(), name.clone())
            .await?;

        let update = PageUpdate {
            page_id: page_id.clone(),
            elements,
            name,
            files,
        };
        let target = ChangeTarget::Page(page_id.clone());
        if !self.should_push_directly(&target).await {
            return self.queue_edit(ChangeKind::PageUpdate(update)).await;
        }

        match self.remote().update_page(&update).await {
            Ok(row) => {
                self.mirror()
                    .set_document(
                        page_id,
                        update.elements,
                        row.updated_at.timestamp_millis(),
                        update.name,
                    )
                    .await?;
                Ok(EditOutcome::Synced)
            }
            Err(error) => self.recover_edit(ChangeKind::PageUpdate(update), error).await,
        }
    }

    /// Rename a folder: mirror first, then remote or queue
    pub async fn rename_folder(
        &self,
        folder_id: &FolderId,
        name: impl Into<String>,
    ) -> Result<EditOutcome> {
        let name = name.into();
        self.mirror()
            .rename_folder(folder_id, name.clone(), now_ms())
            .await?;

        let rename = FolderRename {
            folder_id: folder_id.clone(),
            name,
        };
        let target = ChangeTarget::Folder(folder_id.clone());
        if !self.should_push_directly(&target).await {
            return self.queue_edit(ChangeKind::FolderRename(rename)).await;
        }

        match self.remote().rename_folder(&rename).await {
            Ok(row) => {
                self.mirror().set_folder(&row.into()).await?;
                Ok(EditOutcome::Synced)
            }
            Err(error) => self.recover_edit(ChangeKind::FolderRename(rename), error).await,
        }
    }

    /// Create a page under a folder
    pub async fn create_page(
        &self,
        folder_id: &FolderId,
        elements: Option<ElementSet>,
        name: impl Into<String>,
    ) -> Result<CreateOutcome<PageId>> {
        let create = PageCreate {
            elements,
            folder_id: folder_id.clone(),
            name: name.into(),
        };
        if !self.monitor.is_online() {
            let change = self.queue().enqueue(ChangeKind::PageCreate(create)).await?;
            return Ok(CreateOutcome::Queued(change.id));
        }

        match self.remote().create_page(&create).await {
            Ok(row) => {
                self.mirror()
                    .set_document(
                        &row.page_id,
                        row.page_elements.elements,
                        row.updated_at.timestamp_millis(),
                        row.name,
                    )
                    .await?;
                Ok(CreateOutcome::Created(row.page_id))
            }
            Err(error) => {
                let change = self.queue_after_failure(ChangeKind::PageCreate(create), error).await?;
                Ok(CreateOutcome::Queued(change))
            }
        }
    }

    /// Create a folder
    pub async fn create_folder(&self, name: impl Into<String>) -> Result<CreateOutcome<FolderId>> {
        let create = FolderCreate { name: name.into() };
        if !self.monitor.is_online() {
            let change = self.queue().enqueue(ChangeKind::FolderCreate(create)).await?;
            return Ok(CreateOutcome::Queued(change.id));
        }

        match self.remote().create_folder(&create).await {
            Ok(row) => {
                let snapshot = LocalFolderSnapshot::from(row);
                self.mirror().set_folder(&snapshot).await?;
                Ok(CreateOutcome::Created(snapshot.id))
            }
            Err(error) => {
                let change = self
                    .queue_after_failure(ChangeKind::FolderCreate(create), error)
                    .await?;
                Ok(CreateOutcome::Queued(change))
            }
        }
    }

    /// Online and no older queued edit for the same target that would replay after this one
    async fn should_push_directly(&self, target: &ChangeTarget) -> bool {
        self.monitor.is_online() && !self.queue().contains_target(target).await
    }

    async fn queue_edit(&self, kind: ChangeKind) -> Result<EditOutcome> {
        let change = self.queue().enqueue(kind).await?;
        Ok(EditOutcome::Queued(change.id))
    }

    async fn recover_edit(&self, kind: ChangeKind, error: RemoteError) -> Result<EditOutcome> {
        let change = self.queue_after_failure(kind, error).await?;
        Ok(EditOutcome::Queued(change))
    }

    /// Queue a change whose direct push failed, unless retrying cannot help
    async fn queue_after_failure(&self, kind: ChangeKind, error: RemoteError) -> Result<ChangeId> {
        if error.is_terminal() || matches!(error, RemoteError::LimitReached { .. }) {
            return Err(error.into());
        }
        tracing::warn!(
            "Could not {} now ({}); queued for later sync",
            kind.describe(),
            error
        );
        Ok(self.queue().enqueue(kind).await?.id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::{PageElements, PageRow};
    use crate::test_support::{at_ms, Failure, RecordingRemote, RemoteCall, SERVER_EPOCH_MS};
    use crate::Error;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn workspace(online: bool) -> (Arc<RecordingRemote>, Workspace<RecordingRemote>) {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let remote = Arc::new(RecordingRemote::default());
        let monitor = NetworkMonitor::new(online, Duration::from_secs(1));
        let workspace = Workspace::open(db, Arc::clone(&remote), monitor)
            .await
            .unwrap();
        (remote, workspace)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_save_writes_mirror_and_queues() {
        let (remote, workspace) = workspace(false).await;
        let page = PageId::from("p1");

        let outcome = workspace
            .save_page(&page, vec![json!({"id": "e1"})], "Plan", None)
            .await
            .unwrap();

        assert!(matches!(outcome, EditOutcome::Queued(_)));
        assert!(remote.calls().is_empty());
        assert_eq!(
            workspace.open_page(&page).await.unwrap().unwrap().elements,
            vec![json!({"id": "e1"})]
        );
        assert_eq!(
            workspace.status().await,
            SyncStatus {
                is_online: false,
                is_syncing: false,
                pending_changes_count: 1,
                last_sync_attempt: None,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_save_goes_straight_to_remote() {
        let (remote, workspace) = workspace(true).await;
        let page = PageId::from("p1");

        let outcome = workspace.save_page(&page, Vec::new(), "Plan", None).await.unwrap();

        assert_eq!(outcome, EditOutcome::Synced);
        assert_eq!(remote.calls(), vec![RemoteCall::UpdatePage("p1".to_string())]);
        assert!(workspace.queue().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_falls_back_to_queue() {
        let (remote, workspace) = workspace(true).await;
        remote.fail("f1", Failure::Transient);

        let outcome = workspace
            .rename_folder(&FolderId::from("f1"), "Work")
            .await
            .unwrap();

        assert!(matches!(outcome, EditOutcome::Queued(_)));
        assert_eq!(workspace.queue().count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_edit_for_same_page_keeps_later_edits_queued() {
        let (remote, workspace) = workspace(false).await;
        let page = PageId::from("p1");
        workspace.save_page(&page, Vec::new(), "offline", None).await.unwrap();

        workspace.monitor().report_online();
        let outcome = workspace.save_page(&page, Vec::new(), "online", None).await.unwrap();

        assert!(matches!(outcome, EditOutcome::Queued(_)));
        assert!(remote.calls().is_empty());
        let queued = workspace.queue().snapshot().await;
        assert_eq!(queued.len(), 1);
        assert!(matches!(&queued[0].kind, ChangeKind::PageUpdate(update) if update.name == "online"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn not_found_edit_is_reported_not_queued() {
        let (remote, workspace) = workspace(true).await;
        remote.fail("gone", Failure::NotFound);

        let error = workspace
            .save_page(&PageId::from("gone"), Vec::new(), "x", None)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Remote(RemoteError::NotFound(_))));
        assert!(workspace.queue().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_sync_is_skipped_offline() {
        let (_remote, workspace) = workspace(false).await;
        workspace.create_folder("Ideas").await.unwrap();

        let outcome = workspace.manual_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::skipped(SkipReason::Offline));
        assert_eq!(workspace.queue().count().await, 1);

        workspace.monitor().report_online();
        let outcome = workspace.manual_sync().await.unwrap();
        assert_eq!(outcome.summary().unwrap().message(), "1 changes synced");
        assert_eq!(workspace.mirror().list_folders().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_creates_record_server_ids() {
        let (_remote, workspace) = workspace(true).await;

        let folder = workspace.create_folder("Ideas").await.unwrap();
        assert_eq!(folder, CreateOutcome::Created(FolderId::from("folder-1")));

        let page = workspace
            .create_page(&FolderId::from("folder-1"), None, "Sketch")
            .await
            .unwrap();
        assert_eq!(page, CreateOutcome::Created(PageId::from("page-2")));
        assert!(workspace
            .open_page(&PageId::from("page-2"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_never_reverts_newer_local_content() {
        let (remote, workspace) = workspace(true).await;
        let page = PageId::from("p1");
        remote.insert_page(PageRow {
            page_id: page.clone(),
            name: "remote".to_string(),
            page_elements: PageElements {
                elements: vec![json!({"id": "remote"})],
                files: None,
            },
            folder_id: None,
            user_id: "u1".to_string(),
            created_at: at_ms(SERVER_EPOCH_MS),
            updated_at: at_ms(SERVER_EPOCH_MS),
        });

        let fetched = workspace.refresh_page(&page).await.unwrap().unwrap();
        assert_eq!(fetched.name, "remote");

        workspace
            .mirror()
            .set_document(&page, Vec::new(), SERVER_EPOCH_MS + 1, "local")
            .await
            .unwrap();
        let refreshed = workspace.refresh_page(&page).await.unwrap().unwrap();
        assert_eq!(refreshed.name, "local");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_flushes_and_stops_tasks() {
        let (_remote, workspace) = workspace(true).await;
        workspace.start(StaticProbe, SyncTimings::default());
        workspace.create_folder("Ideas").await.unwrap();

        workspace.shutdown().await.unwrap();
        assert!(workspace.tasks.lock().unwrap().is_empty());
    }

    struct StaticProbe;

    impl ConnectivityProbe for StaticProbe {
        async fn probe(&self) -> bool {
            true
        }
    }
}
