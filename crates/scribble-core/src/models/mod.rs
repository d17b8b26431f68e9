//! Data models for Scribble

mod ids;
mod pending_change;
mod snapshot;

pub use ids::{ChangeId, FolderId, PageId};
pub use pending_change::{
    BinaryFiles, ChangeKind, ChangeTarget, ElementSet, FolderCreate, FolderRename, PageCreate,
    PageUpdate, PendingChange,
};
pub use snapshot::{LocalDocumentSnapshot, LocalFolderSnapshot};
