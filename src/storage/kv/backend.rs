//! The contract a metadata index engine provides.

use super::types::{KeyScan, KvEntry};
use anyhow::Result;
use async_trait::async_trait;

/// A sorted key/value engine with per-entry expiry.
///
/// Single-key reads and writes must be atomic; the gateway coordinates
/// concurrent requests through that alone. Expired entries must never be
/// returned, and should be reclaimed when encountered.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// The live entry under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be read.
    async fn get(&self, key: &str) -> Result<Option<KvEntry>>;

    /// Replaces whatever is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be committed.
    async fn put(&self, key: &str, entry: KvEntry) -> Result<()>;

    /// Removes `key`. Reports whether anything was removed; a missing key
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be committed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Live keys admitted by `scan`, ascending, with their metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be read.
    async fn scan(&self, scan: &KeyScan) -> Result<Vec<(String, Option<serde_json::Value>)>>;
}
