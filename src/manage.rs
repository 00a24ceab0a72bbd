//! File management: listing the index and deleting files.

use crate::error::{Error, Result};
use crate::keys::{self, FileCategory, SESSION_PREFIX};
use crate::resolver::{StorageResolver, Target};
use crate::storage::{Backends, ListOptions, StorageBackend};
use serde::Serialize;
use tracing::info;

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest accepted page size.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Listing query.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub category: Option<FileCategory>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// One listed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedFile {
    /// Identifier with the key prefix removed.
    pub name: String,
    pub metadata: serde_json::Value,
}

/// One page of files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilePage {
    pub keys: Vec<ManagedFile>,
    pub list_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// What a delete removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub id: String,
    #[serde(rename = "blobDeleted")]
    pub blob_deleted: bool,
}

/// Index listing and deletion over the configured backends.
#[derive(Clone)]
pub struct FileManager {
    backends: Backends,
    resolver: StorageResolver,
}

impl FileManager {
    pub fn new(backends: Backends) -> Self {
        Self {
            resolver: StorageResolver::new(backends.index.clone()),
            backends,
        }
    }

    /// Lists indexed files, optionally restricted to one category.
    ///
    /// Session entries are never listed.
    ///
    /// # Errors
    ///
    /// Returns an error if no index is configured or the listing fails.
    pub async fn list(&self, query: ListQuery) -> Result<FilePage> {
        let index = self.backends.index()?;
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let page = index
            .list(ListOptions {
                prefix: query.category.map(|c| c.prefix().to_string()),
                limit: Some(limit),
                cursor: query.cursor,
            })
            .await?;

        Ok(FilePage {
            keys: page
                .entries
                .into_iter()
                .filter(|entry| !entry.key.starts_with(SESSION_PREFIX))
                .map(|entry| ManagedFile {
                    name: keys::strip_prefix(&entry.key).to_string(),
                    metadata: entry.metadata,
                })
                .collect(),
            list_complete: page.list_complete,
            cursor: page.cursor,
        })
    }

    /// Deletes a file's records under every key format and, for blob-stored
    /// files, its bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id, a missing index, or a failed delete.
    pub async fn delete(&self, id: &str) -> Result<DeleteReport> {
        let resolution = self
            .resolver
            .resolve(id)
            .await?
            .ok_or_else(|| Error::validation("file id is empty"))?;

        let mut blob_deleted = false;
        if let Target::Blob { key } = &resolution.target
            && let Some(blob) = &self.backends.blob
        {
            blob.delete(key).await?;
            blob_deleted = true;
        }

        if let Some(index) = &self.backends.index {
            let bare = id.strip_prefix(keys::BLOB_MARKER).unwrap_or(id);
            for key in keys::candidate_keys(bare) {
                index.delete(&key).await?;
            }
        } else if !blob_deleted {
            return Err(Error::unavailable(
                crate::storage::BackendKind::MetadataIndex.name(),
            ));
        }

        info!(%id, blob_deleted, "File deleted");

        Ok(DeleteReport {
            id: id.to_string(),
            blob_deleted,
        })
    }
}
