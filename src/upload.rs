//! Upload service: writes new files to the blob store and indexes them.
//!
//! An upload is one blob `put` followed by one index `put`. There is no
//! rollback; a failed index write leaves an unindexed blob, which is still
//! reachable through the `r2:` marker.

use crate::error::{Error, Result};
use crate::keys::{self, FileCategory};
use crate::record::{MetadataRecord, StorageKind};
use crate::storage::{Backends, PutOptions, StorageBackend};
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::info;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One file received from a client.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Upload response entry, serialized as `{"src": ..., "storage": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub src: String,
    pub storage: StorageKind,
    #[serde(skip)]
    pub id: String,
}

/// Generates a file id: `<unix ms>_<8 base36 chars>[.<ext>]`.
pub fn generate_file_id(file_name: &str, timestamp_ms: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    match extension(file_name) {
        Some(ext) => format!("{timestamp_ms}_{suffix}.{ext}"),
        None => format!("{timestamp_ms}_{suffix}"),
    }
}

/// Extension usable in a storage key: ASCII alphanumerics only.
fn extension(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

/// Stores uploads.
#[derive(Clone)]
pub struct UploadService {
    backends: Backends,
}

impl UploadService {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Stores `file` in the blob store and records it in the index.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] if no primary blob store is configured
    /// - [`Error::Validation`] for an empty file name
    /// - storage errors from either write
    pub async fn upload(&self, file: IncomingFile) -> Result<UploadedFile> {
        let blob = self.backends.upload_target()?;

        if file.file_name.trim().is_empty() {
            return Err(Error::validation("file name is empty"));
        }

        let timestamp = Utc::now().timestamp_millis();
        let id = generate_file_id(&file.file_name, timestamp);
        let content_type = file
            .content_type
            .clone()
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = file.body.len() as u64;
        let category = FileCategory::from_file_name(&file.file_name);

        blob.put(
            &id,
            file.body,
            PutOptions {
                content_type: Some(content_type.clone()),
                metadata: Some(json!({
                    "fileName": file.file_name,
                    "fileSize": size.to_string(),
                    "uploadTime": timestamp.to_string(),
                    "fileType": category.as_str(),
                })),
                ttl: None,
            },
        )
        .await?;

        if let Some(index) = &self.backends.index {
            let record = MetadataRecord::uploaded(&file.file_name, size, &content_type, timestamp);
            index
                .put_record(&keys::key_for(&id, &file.file_name), &record)
                .await?;
        }

        info!(%id, file_name = %file.file_name, size, "File uploaded");

        Ok(UploadedFile {
            src: format!("/file/{id}"),
            storage: StorageKind::R2,
            id,
        })
    }

    /// Returns the raw blob stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] without a blob store and
    /// [`Error::NotFound`] for unknown ids.
    pub async fn fetch_raw(&self, id: &str) -> Result<crate::storage::StoredObject> {
        self.backends
            .blob()?
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(id))
    }
}
