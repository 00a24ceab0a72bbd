//! High-level `KvStore`: the metadata index backend variant.
//!
//! Wraps any `KvBackend` implementation and exposes it through the uniform
//! [`StorageBackend`] contract, plus typed helpers for [`MetadataRecord`]s.

use super::backend::KvBackend;
use super::memory::MemoryBackend;
use super::redb::RedbBackend;
use super::types::{KeyScan, KvEntry};
use crate::error::Result;
use crate::record::MetadataRecord;
use crate::storage::backend::{
    BackendKind, ListEntry, ListOptions, ListPage, PutOptions, StorageBackend, StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Metadata index over a pluggable KV backend.
///
/// `KvStore` is `Clone` and can be shared across threads. The underlying
/// backend handles concurrent access safely.
///
/// # Example
///
/// ```ignore
/// use filegate::storage::kv::KvStore;
///
/// let index = KvStore::memory();
/// index.put_record("img:abc", &MetadataRecord::bootstrap("abc")).await?;
/// ```
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
}

impl KvStore {
    /// Creates a new `KvStore` backed by a file-based redb database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let backend = RedbBackend::open(path)?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    /// Creates a new `KvStore` backed by an in-memory store.
    ///
    /// All data is lost when the process exits.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    /// Creates a new `KvStore` with a custom backend.
    pub fn custom<B: KvBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Reads the record stored under `key`.
    ///
    /// A stored entry whose metadata is missing or cannot be decoded is
    /// treated as absent and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn get_record(&self, key: &str) -> Result<Option<MetadataRecord>> {
        let Some(entry) = self.backend.get(key).await? else {
            return Ok(None);
        };
        let Some(metadata) = entry.metadata else {
            return Ok(None);
        };

        match MetadataRecord::from_metadata(&metadata) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(%key, error = %e, "Ignoring undecodable index record");
                Ok(None)
            },
        }
    }

    /// Writes `record` as a metadata-only entry under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn put_record(&self, key: &str, record: &MetadataRecord) -> Result<()> {
        let entry = KvEntry::new(Vec::new(), Some(record.to_metadata()));
        self.backend.put(key, entry).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for KvStore {
    fn kind(&self) -> BackendKind {
        BackendKind::MetadataIndex
    }

    /// The index has no content-type column; `options.content_type` is
    /// ignored.
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()> {
        let entry = KvEntry::new(body.to_vec(), options.metadata).with_ttl(options.ttl);
        self.backend.put(key, entry).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.backend.get(key).await?.map(|entry| StoredObject {
            body: Bytes::from(entry.value),
            content_type: None,
            metadata: entry.metadata,
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.backend.remove(key).await?;
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListPage> {
        // One extra key tells whether another page follows.
        let scan = KeyScan {
            prefix: options.prefix,
            after: options.cursor,
            limit: options.limit.map(|limit| limit + 1),
        };
        let mut entries = self.backend.scan(&scan).await?;

        let truncated = options.limit.is_some_and(|limit| entries.len() > limit);
        if let Some(limit) = options.limit {
            entries.truncate(limit);
        }
        let cursor = truncated
            .then(|| entries.last().map(|(key, _)| key.clone()))
            .flatten();

        Ok(ListPage {
            entries: entries
                .into_iter()
                .map(|(key, metadata)| ListEntry {
                    key,
                    metadata: metadata.unwrap_or(serde_json::Value::Null),
                })
                .collect(),
            cursor,
            list_complete: !truncated,
        })
    }
}
