//! Persistent index engine on a single redb file.
//!
//! Entries are stored as JSON-encoded [`KvEntry`] values in one table.
//! Every call runs on the blocking pool.

use super::backend::KvBackend;
use super::types::{KeyScan, KvEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const ENTRIES: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("entries");

type ScannedEntry = (String, Option<serde_json::Value>);

#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Opens the database at `path`, creating it and its parent directory
    /// when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or
    /// the entries table cannot be initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create index directory: {}", parent.display()))?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open index database: {}", path.display()))?;

        // Readers open the table without creating it.
        let txn = db.begin_write().context("Failed to begin index setup")?;
        txn.open_table(ENTRIES)
            .context("Failed to create entries table")?;
        txn.commit().context("Failed to commit index setup")?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Runs `op` against this backend on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(&this))
            .await
            .context("Index task panicked")?
    }

    fn read_entry(&self, key: &str) -> Result<Option<KvEntry>> {
        let txn = self.db.begin_read().context("Failed to begin index read")?;
        let table = txn.open_table(ENTRIES).context("Failed to open entries table")?;

        let Some(raw) = table
            .get(key)
            .with_context(|| format!("Failed to read index key '{key}'"))?
        else {
            return Ok(None);
        };
        let entry: KvEntry = serde_json::from_slice(raw.value())
            .with_context(|| format!("Corrupt index entry '{key}'"))?;
        Ok(Some(entry))
    }

    fn write_entry(&self, key: &str, entry: &KvEntry) -> Result<()> {
        let encoded = serde_json::to_vec(entry).context("Failed to encode index entry")?;

        let txn = self.db.begin_write().context("Failed to begin index write")?;
        {
            let mut table = txn.open_table(ENTRIES).context("Failed to open entries table")?;
            table
                .insert(key, encoded.as_slice())
                .with_context(|| format!("Failed to write index key '{key}'"))?;
        }
        txn.commit().context("Failed to commit index write")?;
        Ok(())
    }

    /// Removes `key`; with `only_expired`, only if the stored entry has
    /// expired by the time the write transaction holds the table.
    fn remove_entry(&self, key: &str, only_expired: bool) -> Result<bool> {
        let txn = self.db.begin_write().context("Failed to begin index write")?;
        let removed = {
            let mut table = txn.open_table(ENTRIES).context("Failed to open entries table")?;
            let expired = match table
                .get(key)
                .with_context(|| format!("Failed to read index key '{key}'"))?
            {
                Some(raw) => serde_json::from_slice::<KvEntry>(raw.value())
                    .map_or(true, |entry| entry.is_expired()),
                None => return Ok(false),
            };
            if only_expired && !expired {
                false
            } else {
                table
                    .remove(key)
                    .with_context(|| format!("Failed to remove index key '{key}'"))?
                    .is_some()
            }
        };
        txn.commit().context("Failed to commit index write")?;
        Ok(removed)
    }

    /// Live entries in the window, plus expired keys met on the way.
    fn scan_entries(&self, scan: &KeyScan) -> Result<(Vec<ScannedEntry>, Vec<String>)> {
        let txn = self.db.begin_read().context("Failed to begin index read")?;
        let table = txn.open_table(ENTRIES).context("Failed to open entries table")?;

        let lower = match (scan.after.as_deref(), scan.prefix.as_deref()) {
            (Some(after), Some(prefix)) if after < prefix => Bound::Included(prefix),
            (Some(after), _) => Bound::Excluded(after),
            (None, Some(prefix)) => Bound::Included(prefix),
            (None, None) => Bound::Unbounded,
        };

        let mut live = Vec::new();
        let mut stale = Vec::new();
        let range = table
            .range::<&str>((lower, Bound::Unbounded))
            .context("Failed to scan entries table")?;

        for item in range {
            let (key, raw) = item.context("Failed to read index entry")?;
            let key = key.value();
            if scan.is_past(key) || scan.limit.is_some_and(|limit| live.len() >= limit) {
                break;
            }
            if !scan.admits(key) {
                continue;
            }

            match serde_json::from_slice::<KvEntry>(raw.value()) {
                Ok(entry) if entry.is_expired() => stale.push(key.to_string()),
                Ok(entry) => live.push((key.to_string(), entry.metadata)),
                Err(e) => warn!(%key, error = %e, "Skipping corrupt index entry"),
            }
        }

        Ok((live, stale))
    }
}

#[async_trait]
impl KvBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let key = key.to_string();
        self.blocking(move |db| match db.read_entry(&key)? {
            Some(entry) if entry.is_expired() => {
                db.remove_entry(&key, true)?;
                Ok(None)
            },
            found => Ok(found),
        })
        .await
    }

    async fn put(&self, key: &str, entry: KvEntry) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |db| db.write_entry(&key, &entry)).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |db| db.remove_entry(&key, false)).await
    }

    async fn scan(&self, scan: &KeyScan) -> Result<Vec<ScannedEntry>> {
        let scan = scan.clone();
        self.blocking(move |db| {
            let (live, stale) = db.scan_entries(&scan)?;
            for key in stale {
                if let Err(e) = db.remove_entry(&key, true) {
                    warn!(%key, error = %e, "Failed to reclaim expired index entry");
                }
            }
            Ok(live)
        })
        .await
    }
}
