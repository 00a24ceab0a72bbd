//! Storage backends behind one identifier namespace.
//!
//! - [`kv`]: metadata index (records and sessions)
//! - [`blob`]: object bytes for files uploaded through the gateway
//! - [`legacy`]: read-only proxy to the legacy third-party file host
//!
//! [`Backends`] bundles whichever of them are configured.

pub mod backend;
pub mod blob;
pub mod kv;
pub mod legacy;

pub use backend::{
    BackendKind, ListEntry, ListOptions, ListPage, PutOptions, StorageBackend, StoredObject,
};
pub use blob::BlobStore;
pub use kv::KvStore;
pub use legacy::LegacyFileHost;

use crate::config::{BlobBackendKind, GatewayConfig, IndexBackend};
use crate::error::{Error, Result};
use anyhow::Context;
use tracing::info;

/// The configured backend set, shared by every request handler.
#[derive(Clone)]
pub struct Backends {
    pub index: Option<KvStore>,
    pub blob: Option<BlobStore>,
    pub legacy: LegacyFileHost,
    /// Whether the blob store is the primary target for new files.
    pub blob_primary: bool,
}

impl Backends {
    /// Opens every backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a database or directory cannot be opened.
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let index = match &config.index {
            Some(index) => Some(match index.backend {
                IndexBackend::Redb => {
                    info!(path = %index.path.display(), "Opening metadata index");
                    KvStore::file(&index.path).with_context(|| {
                        format!("Failed to open metadata index: {}", index.path.display())
                    })?
                },
                IndexBackend::Memory => KvStore::memory(),
            }),
            None => None,
        };

        let blob = match &config.blob {
            Some(blob) => Some(match blob.backend {
                BlobBackendKind::Filesystem => {
                    info!(path = %blob.path.display(), "Opening blob store");
                    BlobStore::filesystem(&blob.path).with_context(|| {
                        format!("Failed to open blob store: {}", blob.path.display())
                    })?
                },
                BlobBackendKind::Memory => BlobStore::memory(),
            }),
            None => None,
        };

        Ok(Self {
            index,
            blob,
            legacy: LegacyFileHost::new(&config.legacy)?,
            blob_primary: config.blob.as_ref().is_some_and(|b| b.primary),
        })
    }

    /// The metadata index, or [`Error::BackendUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns an error if no index is configured.
    pub fn index(&self) -> Result<&KvStore> {
        self.index
            .as_ref()
            .ok_or_else(|| Error::unavailable(BackendKind::MetadataIndex.name()))
    }

    /// The blob store, or [`Error::BackendUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns an error if no blob store is configured.
    pub fn blob(&self) -> Result<&BlobStore> {
        self.blob
            .as_ref()
            .ok_or_else(|| Error::unavailable(BackendKind::BlobStore.name()))
    }

    /// The blob store if it accepts new uploads.
    ///
    /// # Errors
    ///
    /// Returns an error if no blob store is configured or it is not primary.
    pub fn upload_target(&self) -> Result<&BlobStore> {
        match &self.blob {
            Some(blob) if self.blob_primary => Ok(blob),
            _ => Err(Error::unavailable(BackendKind::BlobStore.name())),
        }
    }
}
