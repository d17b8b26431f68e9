//! Shared database service wrapper used by the queue and the mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, KvEntry, KvRepository, LibSqlKvRepository};
use crate::Result;

/// Thread-safe service for durable key-value operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and replaced once.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Quarantining and retrying once.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, if the service is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("database disk image is malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("scribble.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local DB sidecar {}", path.display());
            }
        }

        Ok(())
    }

    /// Load one entry from a namespace.
    pub async fn kv_get(&self, namespace: &str, key: &str) -> Result<Option<KvEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlKvRepository::new(db.connection());
        repo.get(namespace, key).await
    }

    /// Insert or overwrite an entry.
    pub async fn kv_put(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlKvRepository::new(db.connection());
        repo.put(namespace, key, value, updated_at).await
    }

    /// Insert, or overwrite only when not older than the stored entry.
    pub async fn kv_put_if_not_older(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlKvRepository::new(db.connection());
        repo.put_if_not_older(namespace, key, value, updated_at).await
    }

    /// Remove an entry.
    pub async fn kv_delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlKvRepository::new(db.connection());
        repo.delete(namespace, key).await
    }

    /// List entries of a namespace by key prefix, most recent first.
    pub async fn kv_list(&self, namespace: &str, prefix: &str) -> Result<Vec<KvEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlKvRepository::new(db.connection());
        repo.list(namespace, prefix).await
    }
}
