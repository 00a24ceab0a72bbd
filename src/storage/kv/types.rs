//! Entries and key scans shared by the index engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value with optional metadata and expiration.
///
/// Index records are metadata-only: `value` is empty and the record lives in
/// `metadata`. Sessions carry their JSON payload in `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvEntry {
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl KvEntry {
    /// Creates an entry that never expires.
    pub fn new(value: Vec<u8>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            value,
            metadata,
            expires_at: None,
        }
    }

    /// Sets the entry to expire `ttl` from now.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}

/// A window over the sorted key space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyScan {
    pub prefix: Option<String>,
    /// Exclusive lower bound, usually the last key of the previous page.
    pub after: Option<String>,
    pub limit: Option<usize>,
}

impl KeyScan {
    /// Whether `key` falls inside the window, ignoring `limit`.
    pub fn admits(&self, key: &str) -> bool {
        self.prefix.as_deref().is_none_or(|p| key.starts_with(p))
            && self.after.as_deref().is_none_or(|a| key > a)
    }

    /// Whether no key at or beyond `key` can be admitted.
    pub fn is_past(&self, key: &str) -> bool {
        self.prefix
            .as_deref()
            .is_some_and(|p| !key.starts_with(p) && key > p)
    }
}
