//! Filesystem-backed blob backend.
//!
//! Stores object bytes under `<base>/objects/<key>` with metadata tracked in
//! a companion redb database at `<base>/metadata.redb`.

use super::backend::{BlobBackend, page_objects};
use super::types::{BlobListRequest, BlobListing, BlobMeta, CustomMetadata, OBJECTS_TABLE};
use super::validation::{object_path, resolve_content_type, validate_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Filesystem-backed object storage backend.
///
/// `FilesystemBlobBackend` is `Clone` and can be shared across threads. All
/// filesystem and database work runs on the blocking pool.
#[derive(Clone)]
pub struct FilesystemBlobBackend {
    objects_dir: PathBuf,
    db: Arc<Database>,
}

impl FilesystemBlobBackend {
    /// Creates or opens the blob backend at the given base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Storage directory cannot be created
    /// - Metadata database cannot be opened or initialized
    /// - Metadata reconciliation fails
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let objects_dir = base_dir.join("objects");

        fs::create_dir_all(&objects_dir).with_context(|| {
            format!("Failed to create blob directory: {}", objects_dir.display())
        })?;

        let db_path = base_dir.join("metadata.redb");
        let db = Database::create(&db_path).with_context(|| {
            format!("Failed to open blob metadata database: {}", db_path.display())
        })?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to initialize objects table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        let backend = Self {
            objects_dir,
            db: Arc::new(db),
        };

        backend.reconcile()?;

        Ok(backend)
    }

    /// Drops metadata rows whose object file was removed outside the service.
    fn reconcile(&self) -> Result<()> {
        let mut orphaned = Vec::new();
        {
            let read_txn = self
                .db
                .begin_read()
                .context("Failed to begin read transaction for reconciliation")?;
            let table = read_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table for reconciliation")?;

            for item in table.iter().context("Failed to iterate objects table")? {
                let (key, _) = item.context("Failed to read object entry")?;
                let key = key.value().to_string();
                if !object_path(&self.objects_dir, &key).is_ok_and(|p| p.is_file()) {
                    orphaned.push(key);
                }
            }
        }

        if !orphaned.is_empty() {
            tracing::info!(count = orphaned.len(), "Removing orphaned blob metadata");
            for key in &orphaned {
                self.remove_metadata(key)?;
            }
        }

        Ok(())
    }

    fn save_metadata(&self, meta: &BlobMeta) -> Result<()> {
        let json = serde_json::to_vec(meta).context("Failed to serialize blob metadata")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table")?;
            table
                .insert(meta.key.as_str(), json.as_slice())
                .with_context(|| format!("Failed to insert blob metadata: {}", meta.key))?;
        }
        write_txn
            .commit()
            .context("Failed to commit metadata save transaction")?;

        Ok(())
    }

    fn load_metadata(&self, key: &str) -> Result<Option<BlobMeta>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        match table
            .get(key)
            .with_context(|| format!("Failed to read blob metadata: {key}"))?
        {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value())
                    .with_context(|| format!("Failed to deserialize blob metadata: {key}"))?,
            )),
            None => Ok(None),
        }
    }

    fn remove_metadata(&self, key: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table")?;
            table
                .remove(key)
                .with_context(|| format!("Failed to remove blob metadata: {key}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit metadata removal transaction")?;

        Ok(())
    }

    fn put_sync(
        &self,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
        custom_metadata: CustomMetadata,
    ) -> Result<BlobMeta> {
        let key = validate_key(key)?;
        let file_path = self.objects_dir.join(&key);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {key}"))?;
        }

        fs::write(&file_path, data).with_context(|| format!("Failed to write blob: {key}"))?;

        let meta = BlobMeta {
            content_type: resolve_content_type(&key, content_type),
            key,
            size: data.len() as u64,
            custom_metadata,
            uploaded_at: Utc::now(),
        };
        self.save_metadata(&meta)?;

        Ok(meta)
    }

    fn get_sync(&self, key: &str) -> Result<Option<(Bytes, BlobMeta)>> {
        let key = validate_key(key)?;
        let file_path = self.objects_dir.join(&key);

        if !file_path.is_file() {
            return Ok(None);
        }

        let data = fs::read(&file_path).with_context(|| format!("Failed to read blob: {key}"))?;

        let meta = match self.load_metadata(&key)? {
            Some(meta) => meta,
            // File exists but no metadata - reconstruct from filesystem
            None => BlobMeta {
                content_type: resolve_content_type(&key, None),
                key,
                size: data.len() as u64,
                custom_metadata: CustomMetadata::new(),
                uploaded_at: Utc::now(),
            },
        };

        Ok(Some((Bytes::from(data), meta)))
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        let file_path = self.objects_dir.join(&key);

        let existed = file_path.is_file();
        if existed {
            fs::remove_file(&file_path)
                .with_context(|| format!("Failed to delete blob: {key}"))?;
        }

        // Also remove metadata if it exists (cleanup orphaned entries)
        self.remove_metadata(&key)?;

        Ok(existed)
    }

    fn list_sync(&self, request: &BlobListRequest) -> Result<BlobListing> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        let mut objects = Vec::new();
        for item in table.iter().context("Failed to iterate objects table")? {
            let (key, value) = item.context("Failed to read object entry")?;

            if let Some(prefix) = request.prefix.as_deref()
                && !key.value().starts_with(prefix)
            {
                continue;
            }

            if let Ok(meta) = serde_json::from_slice::<BlobMeta>(value.value()) {
                objects.push(meta);
            }
        }

        Ok(page_objects(objects, request))
    }
}

#[async_trait]
impl BlobBackend for FilesystemBlobBackend {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        custom_metadata: CustomMetadata,
    ) -> Result<BlobMeta> {
        let backend = self.clone();
        let key = key.to_string();
        let content_type = content_type.map(std::string::ToString::to_string);
        tokio::task::spawn_blocking(move || {
            backend.put_sync(&key, &data, content_type.as_deref(), custom_metadata)
        })
        .await
        .context("Task join error")?
    }

    async fn get(&self, key: &str) -> Result<Option<(Bytes, BlobMeta)>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.delete_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn list(&self, request: BlobListRequest) -> Result<BlobListing> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.list_sync(&request))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_backend() -> (FilesystemBlobBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let backend = FilesystemBlobBackend::open(tmp.path()).unwrap();
        (backend, tmp)
    }

    #[tokio::test]
    async fn test_put_and_get_object() {
        let (backend, _tmp) = create_backend();

        let meta = backend
            .put(
                "1_abc.png",
                Bytes::from_static(b"png-bytes"),
                None,
                CustomMetadata::new(),
            )
            .await
            .unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.size, 9);

        let (data, meta) = backend.get("1_abc.png").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from_static(b"png-bytes"));
        assert_eq!(meta.key, "1_abc.png");
    }

    #[tokio::test]
    async fn test_get_nonexistent_object() {
        let (backend, _tmp) = create_backend();
        assert!(backend.get("missing.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_object() {
        let (backend, _tmp) = create_backend();

        backend
            .put("a.txt", Bytes::from_static(b"data"), None, CustomMetadata::new())
            .await
            .unwrap();
        assert!(backend.delete("a.txt").await.unwrap());
        assert!(!backend.delete("a.txt").await.unwrap());
        assert!(backend.get("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_and_paged() {
        let (backend, _tmp) = create_backend();

        for key in ["z.txt", "a.txt", "m.txt"] {
            backend
                .put(key, Bytes::from_static(b"x"), None, CustomMetadata::new())
                .await
                .unwrap();
        }

        let listing = backend
            .list(BlobListRequest {
                limit: Some(2),
                ..BlobListRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.objects[0].key, "a.txt");
        assert_eq!(listing.objects[1].key, "m.txt");
        assert!(listing.truncated);

        let rest = backend
            .list(BlobListRequest {
                limit: Some(2),
                start_after: listing.cursor,
                ..BlobListRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.objects.len(), 1);
        assert_eq!(rest.objects[0].key, "z.txt");
        assert!(!rest.truncated);
    }

    #[tokio::test]
    async fn test_reconcile_drops_orphaned_metadata() {
        let tmp = TempDir::new().unwrap();
        {
            let backend = FilesystemBlobBackend::open(tmp.path()).unwrap();
            backend
                .put("gone.txt", Bytes::from_static(b"x"), None, CustomMetadata::new())
                .await
                .unwrap();
        }
        fs::remove_file(tmp.path().join("objects").join("gone.txt")).unwrap();

        let backend = FilesystemBlobBackend::open(tmp.path()).unwrap();
        let listing = backend.list(BlobListRequest::default()).await.unwrap();
        assert!(listing.objects.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (backend, _tmp) = create_backend();

        for key in ["../etc/passwd", "test/../../../etc/passwd", "/etc/passwd"] {
            let result = backend
                .put(key, Bytes::from_static(b"attack"), None, CustomMetadata::new())
                .await;
            assert!(result.is_err(), "Path traversal not prevented for: {key}");
        }
    }
}
