//! Access-control record attached to every indexed file.
//!
//! Records are stored as JSON metadata in the index using the field names
//! of earlier deployments (`ListType`, `Label`, `TimeStamp`, ...), so indexes
//! written by those versions stay readable. Missing fields take defaults.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// Label value meaning "not yet moderated".
pub const UNLABELED: &str = "None";

/// Label value that denies access.
pub const ADULT_LABEL: &str = "adult";

/// Manual allow/deny override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListType {
    #[default]
    None,
    White,
    Block,
}

/// Which backend holds a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageKind {
    #[serde(rename = "kv")]
    KvLegacy,
    #[serde(rename = "r2")]
    R2,
}

impl<'de> Deserialize<'de> for StorageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older writers used free-form strings; only "r2" is meaningful.
        let raw = String::deserialize(deserializer)?;
        Ok(if raw.eq_ignore_ascii_case("r2") {
            Self::R2
        } else {
            Self::KvLegacy
        })
    }
}

fn default_label() -> String {
    UNLABELED.to_string()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Bookkeeping and access-control metadata for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "ListType", default)]
    pub list_type: ListType,
    #[serde(rename = "Label", default = "default_label")]
    pub label: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "TimeStamp", default = "now_millis")]
    pub timestamp: i64,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "fileSize", default)]
    pub file_size: u64,
    #[serde(default)]
    pub liked: bool,
    #[serde(default, alias = "storageType", skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageKind>,
    #[serde(rename = "r2Key", default, skip_serializing_if = "Option::is_none")]
    pub r2_key: Option<String>,
    #[serde(rename = "contentType", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl MetadataRecord {
    /// Default record for an identifier seen for the first time.
    pub fn bootstrap(identifier: &str) -> Self {
        Self {
            list_type: ListType::None,
            label: default_label(),
            timestamp: now_millis(),
            file_name: identifier.to_string(),
            file_size: 0,
            liked: false,
            storage: None,
            r2_key: None,
            content_type: None,
        }
    }

    /// Record for a file uploaded into the blob store.
    pub fn uploaded(file_name: &str, file_size: u64, content_type: &str, timestamp: i64) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_size,
            timestamp,
            storage: Some(StorageKind::R2),
            content_type: Some(content_type.to_string()),
            ..Self::bootstrap(file_name)
        }
    }

    pub fn is_blob_stored(&self) -> bool {
        self.storage == Some(StorageKind::R2)
    }

    pub fn is_adult(&self) -> bool {
        self.label == ADULT_LABEL
    }

    /// Parses a record from index metadata.
    pub fn from_metadata(value: &serde_json::Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        // Serializing a plain struct of strings and numbers cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
