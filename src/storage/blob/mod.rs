//! Blob store with pluggable backends.
//!
//! Holds the actual bytes of uploaded files together with their content type
//! and custom metadata. Supports multiple backends:
//!
//! - **FilesystemBlobBackend**: objects on disk, metadata in redb (default)
//! - **MemoryBlobBackend**: fast, non-persistent storage (tests)

mod backend;
mod filesystem;
mod memory;
mod store;
mod types;
mod validation;

pub use backend::BlobBackend;
pub use filesystem::FilesystemBlobBackend;
pub use memory::MemoryBlobBackend;
pub use store::BlobStore;
pub use types::{BlobListRequest, BlobListing, BlobMeta, CustomMetadata};
