//! Maps a file identifier to the backend holding its bytes.
//!
//! Resolution order:
//!
//! 1. An identifier carrying the blob marker (`r2:<key>`) always targets the
//!    blob store.
//! 2. Otherwise every historical key format is probed in the metadata index;
//!    the first record found decides the backend.
//! 3. With no record, the identifier is served from the legacy host: long
//!    identifiers through the bot API, short ones from its public path.

use crate::error::Result;
use crate::keys::{self, BLOB_MARKER};
use crate::record::MetadataRecord;
use crate::storage::KvStore;
use crate::storage::legacy::is_legacy_path;
use tracing::debug;

/// Backend a resolved identifier is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Blob store object under `key`.
    Blob { key: String },
    /// Legacy file host; `bot` identifiers go through the bot API.
    Legacy { bot: bool },
}

/// Outcome of resolving one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub identifier: String,
    pub target: Target,
    /// Index key the record was found under, or should be created under.
    pub record_key: String,
    pub record: Option<MetadataRecord>,
}

impl Resolution {
    fn legacy(identifier: &str, record_key: String, record: Option<MetadataRecord>) -> Self {
        Self {
            identifier: identifier.to_string(),
            target: Target::Legacy {
                bot: is_legacy_path(identifier),
            },
            record_key,
            record,
        }
    }
}

/// Resolves identifiers against the metadata index.
#[derive(Clone, Default)]
pub struct StorageResolver {
    index: Option<KvStore>,
}

impl StorageResolver {
    pub fn new(index: Option<KvStore>) -> Self {
        Self { index }
    }

    /// Resolves `identifier`.
    ///
    /// Returns `Ok(None)` only for identifiers that can never name a file
    /// (empty, or a bare blob marker).
    ///
    /// # Errors
    ///
    /// Returns an error if an index lookup fails.
    pub async fn resolve(&self, identifier: &str) -> Result<Option<Resolution>> {
        if identifier.is_empty() {
            return Ok(None);
        }

        if let Some(key) = identifier.strip_prefix(BLOB_MARKER) {
            if key.is_empty() {
                return Ok(None);
            }
            let record_key = format!("{BLOB_MARKER}{key}");
            let record = match &self.index {
                Some(index) => index.get_record(&record_key).await?,
                None => None,
            };
            return Ok(Some(Resolution {
                identifier: identifier.to_string(),
                target: Target::Blob {
                    key: key.to_string(),
                },
                record_key,
                record,
            }));
        }

        let Some(index) = &self.index else {
            return Ok(Some(Resolution::legacy(
                identifier,
                identifier.to_string(),
                None,
            )));
        };

        for key in keys::candidate_keys(identifier) {
            let Some(record) = index.get_record(&key).await? else {
                continue;
            };

            debug!(%identifier, record_key = %key, "Resolved identifier from index");

            if record.is_blob_stored() {
                let blob_key = record
                    .r2_key
                    .clone()
                    .unwrap_or_else(|| identifier.to_string());
                return Ok(Some(Resolution {
                    identifier: identifier.to_string(),
                    target: Target::Blob { key: blob_key },
                    record_key: key,
                    record: Some(record),
                }));
            }

            return Ok(Some(Resolution::legacy(identifier, key, Some(record))));
        }

        // Unindexed: the record is bootstrapped under the oldest key format.
        Ok(Some(Resolution::legacy(
            identifier,
            identifier.to_string(),
            None,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ListType;

    fn blob_record(r2_key: Option<&str>) -> MetadataRecord {
        let mut record = MetadataRecord::uploaded("cat.png", 3, "image/png", 1);
        record.r2_key = r2_key.map(str::to_string);
        record
    }

    #[tokio::test]
    async fn test_blob_marker_targets_blob_store() {
        let index = KvStore::memory();
        index
            .put_record("r2:abc.png", &blob_record(None))
            .await
            .unwrap();
        let resolver = StorageResolver::new(Some(index));

        let resolution = resolver.resolve("r2:abc.png").await.unwrap().unwrap();
        assert_eq!(
            resolution.target,
            Target::Blob {
                key: "abc.png".to_string()
            }
        );
        assert_eq!(resolution.record_key, "r2:abc.png");
        assert!(resolution.record.is_some());
    }

    #[tokio::test]
    async fn test_bare_marker_does_not_resolve() {
        let resolver = StorageResolver::default();
        assert!(resolver.resolve("r2:").await.unwrap().is_none());
        assert!(resolver.resolve("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_key_wins_over_older_formats() {
        let index = KvStore::memory();
        let mut old = MetadataRecord::bootstrap("abc.png");
        old.list_type = ListType::Block;
        index.put_record("abc.png", &old).await.unwrap();
        index
            .put_record("img:abc.png", &MetadataRecord::bootstrap("abc.png"))
            .await
            .unwrap();

        let resolution = StorageResolver::new(Some(index))
            .resolve("abc.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolution.record_key, "img:abc.png");
        assert_eq!(resolution.record.unwrap().list_type, ListType::None);
    }

    #[tokio::test]
    async fn test_blob_record_uses_r2_key() {
        let index = KvStore::memory();
        index
            .put_record("img:pretty.png", &blob_record(Some("1700_x.png")))
            .await
            .unwrap();

        let resolution = StorageResolver::new(Some(index))
            .resolve("pretty.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resolution.target,
            Target::Blob {
                key: "1700_x.png".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blob_record_without_r2_key_uses_identifier() {
        let index = KvStore::memory();
        index
            .put_record("img:1700_x.png", &blob_record(None))
            .await
            .unwrap();

        let resolution = StorageResolver::new(Some(index))
            .resolve("1700_x.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resolution.target,
            Target::Blob {
                key: "1700_x.png".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unindexed_long_identifier_is_bot_passthrough() {
        let index = KvStore::memory();
        let identifier = "A".repeat(50) + ".jpg";

        let resolution = StorageResolver::new(Some(index))
            .resolve(&identifier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolution.target, Target::Legacy { bot: true });
        assert!(resolution.record.is_none());
        assert_eq!(resolution.record_key, identifier);
    }

    #[tokio::test]
    async fn test_unindexed_short_identifier_is_direct_legacy() {
        let resolution = StorageResolver::new(Some(KvStore::memory()))
            .resolve("abc.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolution.target, Target::Legacy { bot: false });
        assert_eq!(resolution.record_key, "abc.jpg");
    }

    #[tokio::test]
    async fn test_without_index_everything_is_legacy() {
        let resolution = StorageResolver::default()
            .resolve("abc.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolution.target, Target::Legacy { bot: false });
        assert!(resolution.record.is_none());
    }
}
