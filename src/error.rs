//! Gateway error types for typed error handling.
//!
//! Every storage, resolution and session failure is classified into one of
//! these variants so the HTTP layer can pick the right status code. Backend
//! internals use `anyhow` with context and are folded into
//! [`Error::Internal`] at the trait boundary.

use bytes::Bytes;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No backend holds an entry for the identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// A backend required for the operation is not configured.
    #[error("{backend} is not configured")]
    BackendUnavailable { backend: &'static str },

    /// The legacy host answered with a non-success status.
    ///
    /// Carries the upstream response so it can be forwarded verbatim.
    #[error("upstream responded with status {status}")]
    Upstream {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },

    /// A remote call failed before any response was received.
    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),

    /// The backend does not implement this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Malformed input (missing upload field, bad query).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Credentials missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Anything else, with the original context chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a backend unavailable error.
    pub fn unavailable(backend: &'static str) -> Self {
        Self::BackendUnavailable { backend }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { backend, operation }
    }

    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::BackendUnavailable { .. } => 503,
            Self::Upstream { status, .. } => *status,
            Self::UpstreamTransport(_) => 502,
            Self::Validation(_) => 400,
            Self::Unauthorized => 401,
            Self::Unsupported { .. } | Self::Internal(_) => 500,
        }
    }
}
