//! HTTP API handlers organized by service.

pub mod auth;
pub mod file;
pub mod manage;
pub mod status;
pub mod upload;

use axum::http::HeaderMap;
use axum::http::header::HOST;

/// Origin the client addressed (`scheme://host`).
///
/// The configured public origin wins; otherwise it is rebuilt from the
/// `Host` and `X-Forwarded-Proto` headers. Empty when neither is known.
pub(crate) fn request_origin(public_origin: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(origin) = public_origin {
        return origin.trim_end_matches('/').to_string();
    }
    let Some(host) = headers.get(HOST).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}
