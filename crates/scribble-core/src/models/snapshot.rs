//! Local mirror snapshot models

use serde::{Deserialize, Serialize};

use super::{ElementSet, FolderId, PageId};

/// Last known good content of a document (page)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDocumentSnapshot {
    /// Page identifier
    pub id: PageId,
    /// Full element set; replaced wholesale on every write
    pub elements: ElementSet,
    /// Display name
    pub name: String,
    /// Last modification (Unix ms); never moves backwards
    pub updated_at: i64,
}

/// Last known good metadata of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFolderSnapshot {
    /// Folder identifier
    pub id: FolderId,
    /// Display name
    pub name: String,
    /// Owning user id
    pub owner_id: String,
    /// Creation time (Unix ms)
    pub created_at: i64,
    /// Last modification (Unix ms); never moves backwards
    pub updated_at: i64,
}
