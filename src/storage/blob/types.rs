//! Types and constants for the blob store.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Table for object metadata storage
pub(crate) const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

/// Free-form string metadata attached to a blob (`fileName`, `fileSize`, ...).
pub type CustomMetadata = BTreeMap<String, String>;

/// Metadata for a stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMeta {
    /// Object key (e.g., "1718000000000_k3j9a0xq.png")
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// MIME content type (e.g., "image/png")
    pub content_type: String,
    #[serde(default)]
    pub custom_metadata: CustomMetadata,
    pub uploaded_at: DateTime<Utc>,
}

/// Native listing shape of the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobListing {
    pub objects: Vec<BlobMeta>,
    /// More objects follow this page.
    pub truncated: bool,
    /// Continuation token, set when `truncated`.
    pub cursor: Option<String>,
}

/// Parameters of a native listing call.
#[derive(Debug, Clone, Default)]
pub struct BlobListRequest {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    /// Start strictly after this key.
    pub start_after: Option<String>,
}
