//! Local mirror store.
//!
//! Durable per-entity cache of the last known good document and folder
//! state. Writes follow last-write-wins by wall-clock timestamp: an incoming
//! snapshot is stored only when nothing is stored yet or its `updated_at` is
//! not older than the stored one, so a slow remote read can never revert a
//! newer local edit. Snapshots replace each other wholesale.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{ElementSet, FolderId, LocalDocumentSnapshot, LocalFolderSnapshot, PageId};
use crate::services::DatabaseService;
use crate::Result;

/// Storage namespace owned by the mirror
pub const MIRROR_NAMESPACE: &str = "local-mirror";

const DOCUMENT_PREFIX: &str = "document:";
const FOLDER_PREFIX: &str = "folder:";

/// Handle to the local mirror; clones share the same storage
#[derive(Clone)]
pub struct LocalMirrorStore {
    db: DatabaseService,
}

impl LocalMirrorStore {
    pub const fn new(db: DatabaseService) -> Self {
        Self { db }
    }

    fn document_key(id: &PageId) -> String {
        format!("{DOCUMENT_PREFIX}{id}")
    }

    fn folder_key(id: &FolderId) -> String {
        format!("{FOLDER_PREFIX}{id}")
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(entry) = self.db.kv_get(MIRROR_NAMESPACE, key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&entry.value)?))
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, updated_at: i64) -> Result<bool> {
        let json = serde_json::to_string(value)?;
        self.db
            .kv_put_if_not_older(MIRROR_NAMESPACE, key, &json, updated_at)
            .await
    }

    /// Last known content of a document
    pub async fn get_document(&self, id: &PageId) -> Result<Option<LocalDocumentSnapshot>> {
        self.load(&Self::document_key(id)).await
    }

    /// Record document content; returns `false` when a newer snapshot is kept
    pub async fn set_document(
        &self,
        id: &PageId,
        elements: ElementSet,
        updated_at: i64,
        name: impl Into<String>,
    ) -> Result<bool> {
        let snapshot = LocalDocumentSnapshot {
            id: id.clone(),
            elements,
            name: name.into(),
            updated_at,
        };
        let applied = self
            .store(&Self::document_key(id), &snapshot, updated_at)
            .await?;
        if !applied {
            tracing::debug!("Kept newer local snapshot for document {id}; incoming write at {updated_at} ignored");
        }
        Ok(applied)
    }

    /// Last known metadata of a folder
    pub async fn get_folder(&self, id: &FolderId) -> Result<Option<LocalFolderSnapshot>> {
        self.load(&Self::folder_key(id)).await
    }

    /// Record folder metadata; returns `false` when a newer snapshot is kept
    pub async fn set_folder(&self, snapshot: &LocalFolderSnapshot) -> Result<bool> {
        let applied = self
            .store(&Self::folder_key(&snapshot.id), snapshot, snapshot.updated_at)
            .await?;
        if !applied {
            tracing::debug!(
                "Kept newer local snapshot for folder {}; incoming write at {} ignored",
                snapshot.id,
                snapshot.updated_at
            );
        }
        Ok(applied)
    }

    /// Rename a known folder, keeping owner and creation time.
    ///
    /// Returns `false` when the folder is unknown locally or a newer snapshot exists.
    pub async fn rename_folder(
        &self,
        id: &FolderId,
        name: impl Into<String>,
        updated_at: i64,
    ) -> Result<bool> {
        let Some(mut snapshot) = self.get_folder(id).await? else {
            return Ok(false);
        };
        snapshot.name = name.into();
        snapshot.updated_at = updated_at;
        self.set_folder(&snapshot).await
    }

    /// All mirrored documents, most recently modified first
    pub async fn list_documents(&self) -> Result<Vec<LocalDocumentSnapshot>> {
        self.db
            .kv_list(MIRROR_NAMESPACE, DOCUMENT_PREFIX)
            .await?
            .iter()
            .map(|entry| serde_json::from_str(&entry.value).map_err(Into::into))
            .collect()
    }

    /// All mirrored folders, most recently modified first
    pub async fn list_folders(&self) -> Result<Vec<LocalFolderSnapshot>> {
        self.db
            .kv_list(MIRROR_NAMESPACE, FOLDER_PREFIX)
            .await?
            .iter()
            .map(|entry| serde_json::from_str(&entry.value).map_err(Into::into))
            .collect()
    }

    /// Forget a document, e.g. after it was deleted remotely
    pub async fn remove_document(&self, id: &PageId) -> Result<bool> {
        self.db
            .kv_delete(MIRROR_NAMESPACE, &Self::document_key(id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> LocalMirrorStore {
        LocalMirrorStore::new(DatabaseService::open_in_memory().await.unwrap())
    }

    fn folder(id: &str, name: &str, updated_at: i64) -> LocalFolderSnapshot {
        LocalFolderSnapshot {
            id: FolderId::from(id),
            name: name.to_string(),
            owner_id: "u1".to_string(),
            created_at: 1,
            updated_at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_document_is_none() {
        let mirror = setup().await;
        assert!(mirror.get_document(&PageId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_write_never_regresses_document() {
        let mirror = setup().await;
        let id = PageId::from("d1");

        assert!(mirror
            .set_document(&id, vec![json!({"id": "new"})], 2_000, "Fresh")
            .await
            .unwrap());
        assert!(!mirror
            .set_document(&id, vec![json!({"id": "old"})], 1_000, "Stale")
            .await
            .unwrap());

        let snapshot = mirror.get_document(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.elements, vec![json!({"id": "new"})]);
        assert_eq!(snapshot.name, "Fresh");
        assert_eq!(snapshot.updated_at, 2_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn equal_timestamp_overwrites() {
        let mirror = setup().await;
        let id = PageId::from("d1");

        mirror.set_document(&id, Vec::new(), 5, "First").await.unwrap();
        assert!(mirror.set_document(&id, Vec::new(), 5, "Second").await.unwrap());

        let snapshot = mirror.get_document(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.name, "Second");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn folder_rename_keeps_owner_and_respects_timestamps() {
        let mirror = setup().await;
        mirror.set_folder(&folder("f1", "Inbox", 10)).await.unwrap();

        assert!(mirror
            .rename_folder(&FolderId::from("f1"), "Archive", 20)
            .await
            .unwrap());
        assert!(!mirror
            .rename_folder(&FolderId::from("f1"), "Older", 15)
            .await
            .unwrap());
        assert!(!mirror
            .rename_folder(&FolderId::from("unknown"), "Ghost", 30)
            .await
            .unwrap());

        let snapshot = mirror.get_folder(&FolderId::from("f1")).await.unwrap().unwrap();
        assert_eq!(snapshot, folder("f1", "Archive", 20));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_and_folders_are_listed_separately() {
        let mirror = setup().await;
        mirror
            .set_document(&PageId::from("d1"), Vec::new(), 1, "One")
            .await
            .unwrap();
        mirror
            .set_document(&PageId::from("d2"), Vec::new(), 2, "Two")
            .await
            .unwrap();
        mirror.set_folder(&folder("f1", "Inbox", 3)).await.unwrap();

        let names: Vec<String> = mirror
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|snapshot| snapshot.name)
            .collect();
        assert_eq!(names, vec!["Two".to_string(), "One".to_string()]);
        assert_eq!(mirror.list_folders().await.unwrap().len(), 1);

        assert!(mirror.remove_document(&PageId::from("d1")).await.unwrap());
        assert_eq!(mirror.list_documents().await.unwrap().len(), 1);
    }
}
