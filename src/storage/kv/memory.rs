//! Process-local index engine on a `DashMap`.
//!
//! Nothing survives a restart. Expired entries are dropped when a read
//! or scan runs into them.

use super::backend::KvBackend;
use super::types::{KeyScan, KvEntry};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, KvEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entries, counting expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        // Checked again under the shard lock.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, entry: KvEntry) -> Result<()> {
        self.entries.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan(&self, scan: &KeyScan) -> Result<Vec<(String, Option<serde_json::Value>)>> {
        let mut live = Vec::new();
        let mut stale = Vec::new();

        for item in &self.entries {
            if !scan.admits(item.key()) {
                continue;
            }
            if item.is_expired() {
                stale.push(item.key().clone());
            } else {
                live.push((item.key().clone(), item.metadata.clone()));
            }
        }

        for key in stale {
            self.entries.remove_if(&key, |_, entry| entry.is_expired());
        }

        live.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        if let Some(limit) = scan.limit {
            live.truncate(limit);
        }
        Ok(live)
    }
}
