//! In-memory blob backend.
//!
//! Provides a fast, non-persistent object store using DashMap for
//! concurrent access. Used by tests and throwaway instances.

use super::backend::{BlobBackend, page_objects};
use super::types::{BlobListRequest, BlobListing, BlobMeta, CustomMetadata};
use super::validation::{resolve_content_type, validate_key};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;

#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    meta: BlobMeta,
}

/// In-memory object storage backend using DashMap.
///
/// All data is lost when the process exits.
#[derive(Clone, Default)]
pub struct MemoryBlobBackend {
    data: DashMap<String, MemoryObject>,
}

impl MemoryBlobBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        custom_metadata: CustomMetadata,
    ) -> Result<BlobMeta> {
        let key = validate_key(key)?;

        let meta = BlobMeta {
            content_type: resolve_content_type(&key, content_type),
            key: key.clone(),
            size: data.len() as u64,
            custom_metadata,
            uploaded_at: Utc::now(),
        };

        self.data.insert(
            key,
            MemoryObject {
                data,
                meta: meta.clone(),
            },
        );

        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Option<(Bytes, BlobMeta)>> {
        let key = validate_key(key)?;
        Ok(self.data.get(&key).map(|entry| {
            let obj = entry.value();
            (obj.data.clone(), obj.meta.clone())
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.data.remove(&key).is_some())
    }

    async fn list(&self, request: BlobListRequest) -> Result<BlobListing> {
        let mut objects: Vec<BlobMeta> = self
            .data
            .iter()
            .filter(|entry| {
                request
                    .prefix
                    .as_deref()
                    .is_none_or(|prefix| entry.key().starts_with(prefix))
            })
            .map(|entry| entry.value().meta.clone())
            .collect();

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(page_objects(objects, &request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryBlobBackend::new();

        let mut custom = CustomMetadata::new();
        custom.insert("fileName".to_string(), "hello.txt".to_string());

        let meta = backend
            .put("k.txt", Bytes::from_static(b"Hello"), Some("text/plain"), custom)
            .await
            .unwrap();
        assert_eq!(meta.size, 5);

        let (data, meta) = backend.get("k.txt").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from_static(b"Hello"));
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.custom_metadata["fileName"], "hello.txt");
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBlobBackend::new();

        backend
            .put("a.bin", Bytes::from_static(b"x"), None, CustomMetadata::new())
            .await
            .unwrap();
        assert!(backend.delete("a.bin").await.unwrap());
        assert!(!backend.delete("a.bin").await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_list_truncates() {
        let backend = MemoryBlobBackend::new();

        for key in ["c.png", "a.png", "b.png"] {
            backend
                .put(key, Bytes::from_static(b"p"), None, CustomMetadata::new())
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
        assert_eq!(listing.objects.len(), 2);
        assert_eq!(listing.objects[0].key, "a.png");
        assert!(listing.truncated);
        assert_eq!(listing.cursor.as_deref(), Some("b.png"));
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let backend = MemoryBlobBackend::new();

        for key in ["../etc/passwd", "/etc/passwd"] {
            let result = backend
                .put(key, Bytes::from_static(b"attack"), None, CustomMetadata::new())
                .await;
            assert!(result.is_err(), "Path traversal not prevented for: {key}");
        }
    }
}
