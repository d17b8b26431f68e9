//! Pending change model
//!
//! A pending change is a local mutation that the remote service has not
//! confirmed yet. The set of change kinds is closed; the sync engine matches on
//! it exhaustively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ChangeId, FolderId, PageId};

/// Drawing elements, kept opaque: the canvas owns their schema.
pub type ElementSet = Vec<serde_json::Value>;

/// Binary assets referenced by elements, keyed by file id.
pub type BinaryFiles = BTreeMap<String, serde_json::Value>;

/// A queued mutation awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Unique identifier
    pub id: ChangeId,
    /// Creation timestamp (Unix ms); the engine replays in this order
    pub created_at: i64,
    /// What to apply
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl PendingChange {
    /// Stamp a change kind with a fresh id and the given creation time
    #[must_use]
    pub fn new(kind: ChangeKind, created_at: i64) -> Self {
        Self {
            id: ChangeId::new(),
            created_at,
            kind,
        }
    }

    /// Logical target used for deduplication, if any
    #[must_use]
    pub fn target(&self) -> Option<ChangeTarget> {
        self.kind.target()
    }
}

/// The mutation carried by a pending change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Overwrite an existing page's content and name
    PageUpdate(PageUpdate),
    /// Insert a new page; the remote assigns its id
    PageCreate(PageCreate),
    /// Rename an existing folder
    FolderRename(FolderRename),
    /// Insert a new folder; the remote assigns its id
    FolderCreate(FolderCreate),
}

impl ChangeKind {
    /// Stable wire name, matching the serialized `type` tag
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::PageUpdate(_) => "page_update",
            Self::PageCreate(_) => "page_create",
            Self::FolderRename(_) => "folder_rename",
            Self::FolderCreate(_) => "folder_create",
        }
    }

    /// Target identity; creates have none because each one is a distinct entity
    #[must_use]
    pub fn target(&self) -> Option<ChangeTarget> {
        match self {
            Self::PageUpdate(update) => Some(ChangeTarget::Page(update.page_id.clone())),
            Self::FolderRename(rename) => Some(ChangeTarget::Folder(rename.folder_id.clone())),
            Self::PageCreate(_) | Self::FolderCreate(_) => None,
        }
    }

    /// Short human-readable description for logs and listings
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::PageUpdate(update) => format!(
                "update page {} ({} elements, name {:?})",
                update.page_id,
                update.elements.len(),
                update.name
            ),
            Self::PageCreate(create) => {
                format!("create page {:?} in folder {}", create.name, create.folder_id)
            }
            Self::FolderRename(rename) => {
                format!("rename folder {} to {:?}", rename.folder_id, rename.name)
            }
            Self::FolderCreate(create) => format!("create folder {:?}", create.name),
        }
    }
}

/// Identity that makes two queued changes supersede each other
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeTarget {
    Page(PageId),
    Folder(FolderId),
}

/// Payload of a `page_update` change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUpdate {
    pub page_id: PageId,
    pub elements: ElementSet,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BinaryFiles>,
}

/// Payload of a `page_create` change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<ElementSet>,
    pub folder_id: FolderId,
    pub name: String,
}

/// Payload of a `folder_rename` change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRename {
    pub folder_id: FolderId,
    pub name: String,
}

/// Payload of a `folder_create` change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCreate {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_type_tag() {
        let change = PendingChange::new(
            ChangeKind::FolderRename(FolderRename {
                folder_id: FolderId::from("f1"),
                name: "Sketches".to_string(),
            }),
            42,
        );

        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["type"], "folder_rename");
        assert_eq!(value["folder_id"], "f1");
        assert_eq!(value["created_at"], 42);

        let parsed: PendingChange = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, change);
    }

    #[test]
    fn page_update_omits_missing_files() {
        let kind = ChangeKind::PageUpdate(PageUpdate {
            page_id: PageId::from("p1"),
            elements: vec![serde_json::json!({"id": "e1", "type": "rectangle"})],
            name: "Plan".to_string(),
            files: None,
        });

        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "page_update");
        assert!(value.get("files").is_none());
    }

    #[test]
    fn only_updates_and_renames_have_targets() {
        let update = ChangeKind::PageUpdate(PageUpdate {
            page_id: PageId::from("p1"),
            elements: Vec::new(),
            name: "a".to_string(),
            files: None,
        });
        let create = ChangeKind::PageCreate(PageCreate {
            elements: None,
            folder_id: FolderId::from("f1"),
            name: "b".to_string(),
        });
        let rename = ChangeKind::FolderRename(FolderRename {
            folder_id: FolderId::from("f1"),
            name: "c".to_string(),
        });
        let folder = ChangeKind::FolderCreate(FolderCreate {
            name: "d".to_string(),
        });

        assert_eq!(update.target(), Some(ChangeTarget::Page(PageId::from("p1"))));
        assert_eq!(rename.target(), Some(ChangeTarget::Folder(FolderId::from("f1"))));
        assert_eq!(create.target(), None);
        assert_eq!(folder.target(), None);
    }
}
