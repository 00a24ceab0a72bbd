//! Key validation and security checks for the blob store.
//!
//! Blob keys become filesystem paths in the filesystem backend, so every key
//! is normalized and checked for directory traversal before use.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes a blob key to prevent directory traversal.
///
/// # Security
/// Rejects keys that:
/// - Are absolute (start with `/` or drive letter)
/// - Contain `..` components
/// - Contain special components like root or prefix
/// - Are empty
pub(crate) fn validate_key(key: &str) -> Result<String> {
    if key.is_empty() {
        bail!("Blob key cannot be empty");
    }

    let path = Path::new(key);

    if path.is_absolute() {
        bail!("Blob key cannot be absolute: {key}");
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {}, // Skip "." components
            Component::ParentDir => bail!("Blob key cannot contain '..': {key}"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("Blob key cannot contain root or prefix: {key}")
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Blob key normalized to empty path");
    }

    // Use forward slashes consistently (for cross-platform compatibility)
    Ok(normalized.to_string_lossy().replace('\\', "/"))
}

/// Returns the filesystem path for a blob given a base directory and key.
pub(crate) fn object_path(base_dir: &Path, key: &str) -> Result<PathBuf> {
    Ok(base_dir.join(validate_key(key)?))
}

/// Determines a content type, falling back to a guess from the key's extension.
pub(crate) fn resolve_content_type(key: &str, content_type: Option<&str>) -> String {
    content_type
        .filter(|ct| !ct.is_empty())
        .map(std::string::ToString::to_string)
        .or_else(|| mime_guess::from_path(key).first().map(|mime| mime.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert_eq!(validate_key("a.png").unwrap(), "a.png");
        assert_eq!(validate_key("./dir/a.png").unwrap(), "dir/a.png");
    }

    #[test]
    fn test_rejects_traversal() {
        for key in ["", "../etc/passwd", "a/../../b", "/etc/passwd", "."] {
            assert!(validate_key(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn test_content_type_resolution() {
        assert_eq!(resolve_content_type("a.png", None), "image/png");
        assert_eq!(resolve_content_type("a.png", Some("")), "image/png");
        assert_eq!(resolve_content_type("a.bin", Some("text/plain")), "text/plain");
        assert_eq!(resolve_content_type("noext", None), "application/octet-stream");
    }
}
