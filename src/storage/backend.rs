//! Uniform storage contract shared by every backend variant.
//!
//! The metadata index, the blob store and the legacy file host each expose
//! the same put/get/delete/list capability set. Variants translate their
//! native shapes (KV entries, object listings, HTTP responses) into the types
//! defined here.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Which backend variant an implementation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    MetadataIndex,
    BlobStore,
    LegacyFileHost,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::MetadataIndex => "metadata index",
            Self::BlobStore => "blob store",
            Self::LegacyFileHost => "legacy file host",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for [`StorageBackend::put`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// MIME type stored alongside the bytes.
    pub content_type: Option<String>,
    /// Backend metadata (the record for the index, custom fields for blobs).
    pub metadata: Option<serde_json::Value>,
    /// Expiry enforced by the backend itself.
    pub ttl: Option<Duration>,
}

impl PutOptions {
    pub fn with_metadata(metadata: serde_json::Value) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::default()
        }
    }
}

/// A stored entry returned by [`StorageBackend::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Body bytes; empty for metadata-only index records.
    pub body: Bytes,
    pub content_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl StoredObject {
    /// Looks up a string field in the object's metadata.
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(field)?.as_str()
    }
}

/// Options for [`StorageBackend::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    /// Opaque continuation cursor from a previous page.
    pub cursor: Option<String>,
}

/// One listed key with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    pub key: String,
    pub metadata: serde_json::Value,
}

/// One page of a listing, in the metadata index's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Pass back in [`ListOptions::cursor`] to fetch the next page.
    pub cursor: Option<String>,
    pub list_complete: bool,
}

/// Storage contract implemented by every backend variant.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Operations outside a variant's capability set return
/// [`Error::Unsupported`](crate::Error::Unsupported).
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Stores a body (possibly empty) under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<()>;

    /// Retrieves the body and metadata stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Removes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists keys in lexicographic order, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails or the cursor is malformed.
    async fn list(&self, options: ListOptions) -> Result<ListPage>;
}
