//! Shared test fixtures: change builders and a recording remote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::models::{
    ChangeKind, FolderCreate, FolderId, FolderRename, PageCreate, PageId, PageUpdate,
};
use crate::remote::{FolderRow, PageElements, PageRow, RemoteError, RemoteResult, RemoteStore};

pub fn page_update(page_id: &str, name: &str) -> ChangeKind {
    ChangeKind::PageUpdate(PageUpdate {
        page_id: PageId::from(page_id),
        elements: vec![serde_json::json!({"id": format!("{page_id}-{name}"), "type": "rectangle"})],
        name: name.to_string(),
        files: None,
    })
}

pub fn page_create(folder_id: &str, name: &str) -> ChangeKind {
    ChangeKind::PageCreate(PageCreate {
        elements: None,
        folder_id: FolderId::from(folder_id),
        name: name.to_string(),
    })
}

pub fn folder_rename(folder_id: &str, name: &str) -> ChangeKind {
    ChangeKind::FolderRename(FolderRename {
        folder_id: FolderId::from(folder_id),
        name: name.to_string(),
    })
}

pub fn folder_create(name: &str) -> ChangeKind {
    ChangeKind::FolderCreate(FolderCreate {
        name: name.to_string(),
    })
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

/// One observed remote call, keyed by the row it touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    UpdatePage(String),
    CreatePage(String),
    RenameFolder(String),
    CreateFolder(String),
    FetchPage(String),
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transient,
    NotFound,
    Rejected,
}

impl Failure {
    fn to_error(self, key: &str) -> RemoteError {
        match self {
            Self::Transient => RemoteError::Api {
                status: 503,
                message: format!("{key} unavailable"),
            },
            Self::NotFound => RemoteError::NotFound(key.to_string()),
            Self::Rejected => RemoteError::Api {
                status: 400,
                message: format!("{key} rejected"),
            },
        }
    }
}

/// In-memory `RemoteStore` that records every call.
///
/// Server timestamps advance by one second per call starting at `SERVER_EPOCH_MS`.
pub struct RecordingRemote {
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<String, Failure>>,
    pages: Mutex<HashMap<String, PageRow>>,
    clock: AtomicI64,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

pub const SERVER_EPOCH_MS: i64 = 1_700_000_000_000;

impl Default for RecordingRemote {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            clock: AtomicI64::new(SERVER_EPOCH_MS),
            next_id: AtomicUsize::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

impl RecordingRemote {
    /// Make calls touching `key` (row id or created name) fail
    pub fn fail(&self, key: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), failure);
    }

    pub fn recover(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Hold the next remote call until `release` is called
    pub fn hold_next_call(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held call has started
    pub async fn wait_until_held(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn insert_page(&self, row: PageRow) {
        self.pages
            .lock()
            .unwrap()
            .insert(row.page_id.to_string(), row);
    }

    pub fn page(&self, page_id: &str) -> Option<PageRow> {
        self.pages.lock().unwrap().get(page_id).cloned()
    }

    async fn call(&self, call: RemoteCall, key: &str) -> RemoteResult<DateTime<Utc>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);

        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().get(key).copied();
        if let Some(failure) = failure {
            return Err(failure.to_error(key));
        }
        Ok(at_ms(self.clock.fetch_add(1_000, Ordering::SeqCst)))
    }

    fn assign_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl RemoteStore for RecordingRemote {
    async fn update_page(&self, update: &PageUpdate) -> RemoteResult<PageRow> {
        let key = update.page_id.to_string();
        let now = self.call(RemoteCall::UpdatePage(key.clone()), &key).await?;
        let row = PageRow {
            page_id: update.page_id.clone(),
            name: update.name.clone(),
            page_elements: PageElements {
                elements: update.elements.clone(),
                files: update.files.clone(),
            },
            folder_id: self.page(&key).and_then(|row| row.folder_id),
            user_id: "u1".to_string(),
            created_at: at_ms(SERVER_EPOCH_MS),
            updated_at: now,
        };
        self.insert_page(row.clone());
        Ok(row)
    }

    async fn create_page(&self, create: &PageCreate) -> RemoteResult<PageRow> {
        let now = self
            .call(RemoteCall::CreatePage(create.name.clone()), &create.name)
            .await?;
        let row = PageRow {
            page_id: PageId::new(self.assign_id("page")),
            name: create.name.clone(),
            page_elements: PageElements {
                elements: create.elements.clone().unwrap_or_default(),
                files: None,
            },
            folder_id: Some(create.folder_id.clone()),
            user_id: "u1".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.insert_page(row.clone());
        Ok(row)
    }

    async fn rename_folder(&self, rename: &FolderRename) -> RemoteResult<FolderRow> {
        let key = rename.folder_id.to_string();
        let now = self.call(RemoteCall::RenameFolder(key.clone()), &key).await?;
        Ok(FolderRow {
            folder_id: rename.folder_id.clone(),
            name: rename.name.clone(),
            icon: None,
            user_id: "u1".to_string(),
            created_at: at_ms(SERVER_EPOCH_MS),
            updated_at: now,
        })
    }

    async fn create_folder(&self, create: &FolderCreate) -> RemoteResult<FolderRow> {
        let now = self
            .call(RemoteCall::CreateFolder(create.name.clone()), &create.name)
            .await?;
        Ok(FolderRow {
            folder_id: FolderId::new(self.assign_id("folder")),
            name: create.name.clone(),
            icon: None,
            user_id: "u1".to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn fetch_page(&self, page_id: &PageId) -> RemoteResult<Option<PageRow>> {
        let key = page_id.to_string();
        match self.call(RemoteCall::FetchPage(key.clone()), &key).await {
            Ok(_) => Ok(self.page(&key)),
            Err(error) if error.is_terminal() => Ok(None),
            Err(error) => Err(error),
        }
    }
}
