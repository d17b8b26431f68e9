//! Namespaced key-value repository implementation

use crate::error::Result;
use libsql::{params, Connection};

/// A stored value together with its recency stamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

/// Trait for namespaced key-value storage operations (async)
#[allow(async_fn_in_trait)]
pub trait KvRepository {
    /// Load one entry
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<KvEntry>>;

    /// Insert or overwrite unconditionally
    async fn put(&self, namespace: &str, key: &str, value: &str, updated_at: i64) -> Result<()>;

    /// Insert, or overwrite only when `updated_at` is not older than the stored stamp.
    ///
    /// Returns whether the write was applied.
    async fn put_if_not_older(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<bool>;

    /// Remove one entry, returning whether it existed
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// List entries whose key starts with `prefix`, most recent first
    async fn list(&self, namespace: &str, prefix: &str) -> Result<Vec<KvEntry>>;
}

/// libSQL implementation of `KvRepository`
pub struct LibSqlKvRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlKvRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<KvEntry> {
        Ok(KvEntry {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
        })
    }
}

impl KvRepository for LibSqlKvRepository<'_> {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<KvEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, value, updated_at FROM kv_entries WHERE namespace = ? AND key = ?",
                [namespace, key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, namespace: &str, key: &str, value: &str, updated_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_entries (namespace, key, value, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![namespace, key, value, updated_at],
            )
            .await?;
        Ok(())
    }

    async fn put_if_not_older(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<bool> {
        // The WHERE clause makes the compare-and-write a single statement
        let rows = self
            .conn
            .execute(
                "INSERT INTO kv_entries (namespace, key, value, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at
                 WHERE excluded.updated_at >= kv_entries.updated_at",
                params![namespace, key, value, updated_at],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM kv_entries WHERE namespace = ? AND key = ?",
                [namespace, key],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list(&self, namespace: &str, prefix: &str) -> Result<Vec<KvEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, value, updated_at FROM kv_entries
                 WHERE namespace = ? AND substr(key, 1, length(?)) = ?
                 ORDER BY updated_at DESC, key ASC",
                [namespace, prefix, prefix],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get() {
        let db = setup().await;
        let repo = LibSqlKvRepository::new(db.connection());

        repo.put("ns", "alpha", "1", 10).await.unwrap();
        repo.put("ns", "alpha", "2", 5).await.unwrap();

        let entry = repo.get("ns", "alpha").await.unwrap().unwrap();
        assert_eq!(entry.value, "2");
        assert_eq!(entry.updated_at, 5);
        assert!(repo.get("other", "alpha").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_if_not_older_rejects_stale_writes() {
        let db = setup().await;
        let repo = LibSqlKvRepository::new(db.connection());

        assert!(repo.put_if_not_older("ns", "doc", "new", 200).await.unwrap());
        assert!(!repo.put_if_not_older("ns", "doc", "old", 100).await.unwrap());
        assert!(repo.put_if_not_older("ns", "doc", "same", 200).await.unwrap());

        let entry = repo.get("ns", "doc").await.unwrap().unwrap();
        assert_eq!(entry.value, "same");
        assert_eq!(entry.updated_at, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_prefix_and_delete() {
        let db = setup().await;
        let repo = LibSqlKvRepository::new(db.connection());

        repo.put("ns", "document:a", "a", 1).await.unwrap();
        repo.put("ns", "document:b", "b", 2).await.unwrap();
        repo.put("ns", "folder:c", "c", 3).await.unwrap();

        let keys: Vec<String> = repo
            .list("ns", "document:")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec!["document:b".to_string(), "document:a".to_string()]);

        assert!(repo.delete("ns", "document:a").await.unwrap());
        assert!(!repo.delete("ns", "document:a").await.unwrap());
        assert_eq!(repo.list("ns", "document:").await.unwrap().len(), 1);
    }
}
