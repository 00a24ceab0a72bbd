//! Native backend trait for the blob store.
//!
//! Defines the interface that blob backends implement (filesystem, memory).
//! [`BlobStore`](super::BlobStore) adapts it to the uniform storage contract.

use super::types::{BlobListRequest, BlobListing, BlobMeta, CustomMetadata};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Backend trait for object storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait BlobBackend: Send + Sync + 'static {
    /// Stores an object with its content type and custom metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Key is invalid (empty, absolute, or contains `..`)
    /// - Storage operation fails
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        custom_metadata: CustomMetadata,
    ) -> Result<BlobMeta>;

    /// Retrieves an object and its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the read operation fails.
    async fn get(&self, key: &str) -> Result<Option<(Bytes, BlobMeta)>>;

    /// Deletes an object. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or deletion fails.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Lists objects sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list(&self, request: BlobListRequest) -> Result<BlobListing>;
}

/// Cuts a sorted object listing into one native page.
pub(crate) fn page_objects(mut objects: Vec<BlobMeta>, request: &BlobListRequest) -> BlobListing {
    if let Some(start_after) = request.start_after.as_deref() {
        objects.retain(|meta| meta.key.as_str() > start_after);
    }

    match request.limit {
        Some(limit) if objects.len() > limit => {
            objects.truncate(limit);
            let cursor = objects.last().map(|meta| meta.key.clone());
            BlobListing {
                objects,
                truncated: true,
                cursor,
            }
        },
        _ => BlobListing {
            objects,
            truncated: false,
            cursor: None,
        },
    }
}
