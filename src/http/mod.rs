//! HTTP front door.
//!
//! An axum router exposing uploads, file delivery, login/session management,
//! file management and a status probe. Every non-public route sits behind
//! the session gate middleware.

pub mod audit;
pub mod handlers;
pub mod middleware;

use crate::config::GatewayConfig;
use crate::delivery::DeliveryPipeline;
use crate::error::Error;
use crate::manage::FileManager;
use crate::moderation::{ModerateContentClient, Moderator};
use crate::session::SessionGate;
use crate::storage::Backends;
use crate::upload::UploadService;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::error;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Services shared by every handler.
pub struct AppState {
    pub config: GatewayConfig,
    pub backends: Backends,
    pub sessions: SessionGate,
    pub delivery: DeliveryPipeline,
    pub uploads: UploadService,
    pub files: FileManager,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wires services over already opened backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the moderation client cannot be built.
    pub fn new(config: GatewayConfig, backends: Backends) -> anyhow::Result<Self> {
        let moderator = ModerateContentClient::from_config(&config.moderation)?
            .map(|client| Arc::new(client) as Arc<dyn Moderator>);
        Ok(Self::with_moderator(config, backends, moderator))
    }

    /// Wires services with an explicit moderation provider.
    pub fn with_moderator(
        config: GatewayConfig,
        backends: Backends,
        moderator: Option<Arc<dyn Moderator>>,
    ) -> Self {
        Self {
            sessions: SessionGate::new(&config.auth, backends.index.clone()),
            delivery: DeliveryPipeline::new(backends.clone(), moderator, config.access.clone()),
            uploads: UploadService::new(backends.clone()),
            files: FileManager::new(backends.clone()),
            backends,
            config,
        }
    }

    /// Opens the configured backends and wires services.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be opened.
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let backends = Backends::from_config(&config)?;
        Self::new(config, backends)
    }
}

/// Error type returned by HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    Gateway(Error),
    /// Malformed request detected by a handler.
    BadRequest(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self::Gateway(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Gateway(Error::Internal(err))
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => json_error(StatusCode::BAD_REQUEST, message),
            Self::Gateway(Error::Upstream {
                status,
                content_type,
                body,
            }) => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                let mut response = (status, body).into_response();
                if let Some(ct) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, ct);
                }
                response
            },
            Self::Gateway(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                }
                json_error(status, err.to_string())
            },
        }
    }
}

/// Builds the gateway router.
pub fn router(state: SharedState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route(
            "/api/r2/upload",
            post(handlers::upload::upload).get(handlers::upload::get_raw),
        )
        .route("/file/{id}", get(handlers::file::serve_file))
        .route("/api/auth/check", get(handlers::auth::check))
        .route(
            "/api/auth/login",
            post(handlers::auth::login).get(handlers::auth::login_required),
        )
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/manage/logout", any(handlers::auth::basic_logout))
        .route("/api/manage/list", get(handlers::manage::list))
        .route("/api/manage/delete/{id}", delete(handlers::manage::delete))
        .route("/api/status", get(handlers::status::status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, IndexBackend, IndexConfig};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(config: GatewayConfig) -> Router {
        let backends = Backends::from_config(&config).unwrap();
        router(Arc::new(AppState::with_moderator(config, backends, None)))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_login_required_reflects_credentials() {
        let response = app(GatewayConfig::default())
            .oneshot(
                Request::get("/api/auth/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["authRequired"], false);
    }

    #[tokio::test]
    async fn test_login_without_index_is_unavailable() {
        let config = GatewayConfig {
            auth: AuthConfig {
                username: Some("admin".to_string()),
                password: Some("secret".to_string()),
                ..AuthConfig::default()
            },
            ..GatewayConfig::default()
        };

        let response = app(config)
            .oneshot(
                Request::post("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"admin","password":"secret"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_delete_without_storage_is_unavailable() {
        let response = app(GatewayConfig::default())
            .oneshot(
                Request::delete("/api/manage/delete/abc.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_list_empty_index() {
        let config = GatewayConfig {
            index: Some(IndexConfig {
                backend: IndexBackend::Memory,
                ..IndexConfig::default()
            }),
            ..GatewayConfig::default()
        };

        let response = app(config)
            .oneshot(
                Request::get("/api/manage/list?type=all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["keys"], serde_json::json!([]));
        assert_eq!(body["list_complete"], true);
    }

    #[test]
    fn test_upstream_error_is_forwarded_verbatim() {
        let response = AppError::Gateway(Error::Upstream {
            status: 418,
            content_type: Some("text/plain".to_string()),
            body: bytes::Bytes::from_static(b"teapot"),
        })
        .into_response();
        assert_eq!(response.status().as_u16(), 418);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }
}
