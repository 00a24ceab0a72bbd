//! Request middleware: request ids and the session gate.

use super::audit::{AuditEvent, log_audit_event};
use super::{SharedState, URI_COMPONENT};
use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use percent_encoding::utf8_percent_encode;
use std::fmt;
use std::net::SocketAddr;
use tracing::Instrument;
use uuid::Uuid;

/// Paths reachable without authentication (prefix match).
const PUBLIC_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/check",
    "/login.html",
    "/favicon.ico",
    "/_nuxt/",
    "/api/bing/",
];

/// Static asset extensions reachable without authentication, except under
/// `/file/`.
const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".svg", ".png", ".jpg", ".ico", ".woff", ".woff2", ".ttf",
];

/// Whether `path` bypasses the session gate.
pub fn is_public_path(path: &str) -> bool {
    if PUBLIC_PATHS.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) && !path.contains("/file/")
}

/// Best-known address of the client, for audit logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientAddr(pub Option<SocketAddr>);

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("unknown"),
        }
    }
}

/// Tags each request with an id (incoming `X-Request-ID` or a fresh v4
/// UUID), runs it inside a tracing span, and echoes the id on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    let client = ClientAddr(
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    );
    req.extensions_mut().insert(client);

    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Session gate: lets public paths through, authenticates everything else,
/// and stores the [`AuthOutcome`](crate::session::AuthOutcome) as a request
/// extension for handlers.
///
/// Unauthenticated API and upload requests get a 401 JSON body; page
/// requests are redirected to the login page.
pub async fn require_auth(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if is_public_path(&path) {
        return next.run(req).await;
    }

    let outcome = state.sessions.authenticate(req.headers()).await;
    if outcome.authenticated {
        req.extensions_mut().insert(outcome);
        return next.run(req).await;
    }

    let client = req
        .extensions()
        .get::<ClientAddr>()
        .copied()
        .unwrap_or_default();
    log_audit_event(AuditEvent::AccessDenied {
        path: path.clone(),
        client,
    });

    if path.starts_with("/api/") || path.starts_with("/upload") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Unauthorized",
                "message": "Please log in first",
            })),
        )
            .into_response();
    }

    let location = format!(
        "/login.html?redirect={}",
        utf8_percent_encode(&path, URI_COMPONENT)
    );
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
