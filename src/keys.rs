//! Key namespace for the metadata index.
//!
//! Every stored file is indexed under `prefix + identifier`, where the prefix
//! is derived from the file name's extension. Older deployments wrote records
//! under different layouts, so lookups probe every historical format in a
//! fixed priority order ([`KEY_FORMATS`]).

use serde::{Deserialize, Serialize};

/// Marker prefix that routes an identifier straight to the blob store.
pub const BLOB_MARKER: &str = "r2:";

/// Prefix under which sessions live in the metadata index.
pub const SESSION_PREFIX: &str = "session:";

/// Extension category of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico", "heic", "heif", "avif", "tiff",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "ogg", "avi", "mov", "wmv", "flv", "mkv", "m4v", "3gp", "ts",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "wma", "ape", "opus"];

impl FileCategory {
    /// Classifies a file name by its (case-insensitive) extension.
    ///
    /// Names without an extension and unknown extensions are documents.
    pub fn from_file_name(file_name: &str) -> Self {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return Self::Document;
        };
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();

        if IMAGE_EXTENSIONS.contains(&ext) {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Self::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Self::Audio
        } else {
            Self::Document
        }
    }

    /// Parses a listing filter (`image`, `video`, `audio`, `document`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// Index prefix for records of this category.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Image => "img:",
            Self::Video => "vid:",
            Self::Audio => "aud:",
            Self::Document => "doc:",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

/// One historical layout of index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFormat {
    /// Prefix prepended to the identifier.
    pub prefix: &'static str,
    /// Layout generation that introduced the prefix.
    pub version: u8,
}

/// Every key layout the index may contain, in lookup priority order.
///
/// The first format with a record wins. New layouts are appended; existing
/// entries must never be reordered since the order decides which of two
/// stale records is authoritative.
pub const KEY_FORMATS: [KeyFormat; 6] = [
    KeyFormat { prefix: "img:", version: 2 },
    KeyFormat { prefix: "vid:", version: 2 },
    KeyFormat { prefix: "aud:", version: 2 },
    KeyFormat { prefix: "doc:", version: 2 },
    KeyFormat { prefix: BLOB_MARKER, version: 1 },
    KeyFormat { prefix: "", version: 0 },
];

/// Index key for a freshly created record.
pub fn key_for(identifier: &str, file_name: &str) -> String {
    let prefix = FileCategory::from_file_name(file_name).prefix();
    format!("{prefix}{identifier}")
}

/// All keys a record for `identifier` could live under, in priority order.
pub fn candidate_keys(identifier: &str) -> Vec<String> {
    KEY_FORMATS
        .iter()
        .map(|format| format!("{}{identifier}", format.prefix))
        .collect()
}

/// Removes a known key prefix, returning the bare identifier.
pub fn strip_prefix(key: &str) -> &str {
    KEY_FORMATS
        .iter()
        .filter(|format| !format.prefix.is_empty())
        .find_map(|format| key.strip_prefix(format.prefix))
        .unwrap_or(key)
}
