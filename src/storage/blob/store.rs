//! `BlobStore`: the blob store backend variant.
//!
//! Adapts a native [`BlobBackend`] to the uniform [`StorageBackend`]
//! contract. Custom metadata is exposed as a JSON object of strings, and the
//! native listing shape (`objects`, `truncated`, `cursor`) is translated into
//! the index's page shape.

use super::backend::BlobBackend;
use super::filesystem::FilesystemBlobBackend;
use super::memory::MemoryBlobBackend;
use super::types::{BlobListRequest, BlobListing, BlobMeta, CustomMetadata};
use super::validation::validate_key;
use crate::error::Result;
use crate::storage::backend::{
    BackendKind, ListEntry, ListOptions, ListPage, PutOptions, StorageBackend, StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Blob store over a pluggable native backend.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
}

impl BlobStore {
    /// Opens a filesystem-backed blob store rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or metadata database cannot be opened.
    pub fn filesystem<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        Ok(Self {
            backend: Arc::new(FilesystemBlobBackend::open(base_dir)?),
        })
    }

    /// Creates an in-memory blob store.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(MemoryBlobBackend::new()),
        }
    }

    /// Creates a blob store with a custom backend.
    pub fn custom<B: BlobBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

/// Flattens JSON metadata into string pairs; non-string values keep their
/// JSON text.
fn to_custom_metadata(metadata: Option<Value>) -> CustomMetadata {
    let Some(Value::Object(map)) = metadata else {
        return CustomMetadata::new();
    };

    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}

fn to_json(custom: &CustomMetadata) -> Value {
    Value::Object(
        custom
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn to_stored(data: Bytes, meta: BlobMeta) -> StoredObject {
    StoredObject {
        body: data,
        metadata: Some(to_json(&meta.custom_metadata)),
        content_type: Some(meta.content_type),
    }
}

/// Translates the native listing into the common page shape.
fn to_page(listing: BlobListing) -> ListPage {
    ListPage {
        entries: listing
            .objects
            .iter()
            .map(|meta| ListEntry {
                key: meta.key.clone(),
                metadata: to_json(&meta.custom_metadata),
            })
            .collect(),
        list_complete: !listing.truncated,
        cursor: if listing.truncated { listing.cursor } else { None },
    }
}

#[async_trait]
impl StorageBackend for BlobStore {
    fn kind(&self) -> BackendKind {
        BackendKind::BlobStore
    }

    /// TTLs are not supported by blob backends; `options.ttl` is ignored.
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        self.backend
            .put(
                key,
                body,
                options.content_type.as_deref(),
                to_custom_metadata(options.metadata),
            )
            .await?;
        Ok(())
    }

    /// A key that fails validation names no object and reads as absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        Ok(self
            .backend
            .get(key)
            .await?
            .map(|(data, meta)| to_stored(data, meta)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if validate_key(key).is_err() {
            return Ok(());
        }
        self.backend.delete(key).await?;
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListPage> {
        let listing = self
            .backend
            .list(BlobListRequest {
                prefix: options.prefix,
                limit: options.limit,
                start_after: options.cursor,
            })
            .await?;
        Ok(to_page(listing))
    }
}
