//! Remote persistence boundary.
//!
//! The sync engine and the workspace only see `RemoteStore`; the PostgREST
//! client is one implementation. Errors carry a structural classification so
//! callers never inspect messages to decide whether to retry.

mod postgrest;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    BinaryFiles, ElementSet, FolderCreate, FolderId, FolderRename, LocalFolderSnapshot, PageCreate,
    PageId, PageUpdate,
};

pub use postgrest::{parse_content_range_total, PostgrestClient, PostgrestConfig};

/// How the sync engine should treat a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network, timeout, or server-side failure; retry on the next trigger
    Transient,
    /// The target row no longer exists; retrying is pointless
    NotFound,
    /// The service refused the request; kept queued and reported
    Rejected,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote service is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote row not found: {0}")]
    NotFound(String),
    #[error("Remote service error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Drawing limit reached: at most {limit} drawings allowed")]
    LimitReached { limit: u32 },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    /// Classify the failure for retry decisions
    #[must_use]
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::NotFound(_) => RemoteErrorKind::NotFound,
            Self::Http(error) if error.is_decode() => RemoteErrorKind::Rejected,
            Self::Http(_) => RemoteErrorKind::Transient,
            Self::Api { status, .. } if *status == 404 => RemoteErrorKind::NotFound,
            Self::Api { status, .. } if *status >= 500 || *status == 408 || *status == 429 => {
                RemoteErrorKind::Transient
            }
            Self::NotConfigured(_)
            | Self::Api { .. }
            | Self::LimitReached { .. }
            | Self::InvalidPayload(_) => RemoteErrorKind::Rejected,
        }
    }

    /// Whether the failed change should be dropped instead of retried
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind() == RemoteErrorKind::NotFound
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// JSON column holding a page's drawing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageElements {
    #[serde(default)]
    pub elements: ElementSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BinaryFiles>,
}

/// A page row as returned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    pub page_id: PageId,
    pub name: String,
    #[serde(default)]
    pub page_elements: PageElements,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A folder row as returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRow {
    pub folder_id: FolderId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FolderRow> for LocalFolderSnapshot {
    fn from(row: FolderRow) -> Self {
        Self {
            id: row.folder_id,
            name: row.name,
            owner_id: row.user_id,
            created_at: row.created_at.timestamp_millis(),
            updated_at: row.updated_at.timestamp_millis(),
        }
    }
}

/// Row-level operations the sync engine needs from the remote service
pub trait RemoteStore: Send + Sync + 'static {
    /// Overwrite a page's content and name by id
    fn update_page(&self, update: &PageUpdate) -> impl Future<Output = RemoteResult<PageRow>> + Send;

    /// Insert a new page under a folder
    fn create_page(&self, create: &PageCreate) -> impl Future<Output = RemoteResult<PageRow>> + Send;

    /// Rename a folder by id
    fn rename_folder(
        &self,
        rename: &FolderRename,
    ) -> impl Future<Output = RemoteResult<FolderRow>> + Send;

    /// Insert a new folder
    fn create_folder(
        &self,
        create: &FolderCreate,
    ) -> impl Future<Output = RemoteResult<FolderRow>> + Send;

    /// Read a page by id; `None` when it does not exist or is deleted
    fn fetch_page(
        &self,
        page_id: &PageId,
    ) -> impl Future<Output = RemoteResult<Option<PageRow>>> + Send;
}

const NO_REMOTE: &str = "no remote service configured";

/// A missing remote refuses every write, so edits stay queued locally.
impl<R: RemoteStore> RemoteStore for Option<R> {
    async fn update_page(&self, update: &PageUpdate) -> RemoteResult<PageRow> {
        match self {
            Some(remote) => remote.update_page(update).await,
            None => Err(RemoteError::NotConfigured(NO_REMOTE)),
        }
    }

    async fn create_page(&self, create: &PageCreate) -> RemoteResult<PageRow> {
        match self {
            Some(remote) => remote.create_page(create).await,
            None => Err(RemoteError::NotConfigured(NO_REMOTE)),
        }
    }

    async fn rename_folder(&self, rename: &FolderRename) -> RemoteResult<FolderRow> {
        match self {
            Some(remote) => remote.rename_folder(rename).await,
            None => Err(RemoteError::NotConfigured(NO_REMOTE)),
        }
    }

    async fn create_folder(&self, create: &FolderCreate) -> RemoteResult<FolderRow> {
        match self {
            Some(remote) => remote.create_folder(create).await,
            None => Err(RemoteError::NotConfigured(NO_REMOTE)),
        }
    }

    async fn fetch_page(&self, page_id: &PageId) -> RemoteResult<Option<PageRow>> {
        match self {
            Some(remote) => remote.fetch_page(page_id).await,
            None => Ok(None),
        }
    }
}
