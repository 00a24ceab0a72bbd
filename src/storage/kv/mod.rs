//! Metadata index with pluggable backends.
//!
//! Holds one [`MetadataRecord`](crate::record::MetadataRecord) per indexed
//! file (value body empty, record in the entry metadata) and the session
//! table. Supports multiple backends:
//!
//! - [`RedbBackend`]: one redb file, the usual deployment
//! - [`MemoryBackend`]: process-local, for tests and throwaway instances
//!
//! # Example
//!
//! ```ignore
//! use filegate::storage::kv::KvStore;
//!
//! let index = KvStore::file("data/index.redb")?;
//! let page = index.list(ListOptions::default()).await?;
//! ```

mod backend;
mod memory;
mod redb;
mod store;
mod types;


pub use backend::KvBackend;
pub use memory::MemoryBackend;
pub use redb::RedbBackend;
pub use store::KvStore;
pub use types::{KeyScan, KvEntry};
