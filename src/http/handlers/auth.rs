//! Login, logout and authentication status handlers.

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::middleware::ClientAddr;
use super::super::{AppError, SharedState};
use crate::session::session_token;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

/// GET /api/auth/check - Report whether the caller is authenticated.
pub(crate) async fn check(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !state.sessions.auth_required() {
        return Json(json!({
            "authenticated": true,
            "authRequired": false,
            "message": "Login not required",
        }))
        .into_response();
    }

    let outcome = state.sessions.authenticate(&headers).await;
    Json(json!({
        "authenticated": outcome.authenticated,
        "authRequired": true,
        "reason": outcome.reason,
    }))
    .into_response()
}

/// GET /api/auth/login - Report whether login is required.
pub(crate) async fn login_required(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({ "authRequired": state.sessions.auth_required() }))
}

/// POST /api/auth/login - Exchange credentials for a session cookie.
pub(crate) async fn login(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientAddr>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if !state.sessions.auth_required() {
        return Ok(Json(json!({
            "success": true,
            "message": "Login not required",
            "authRequired": false,
        }))
        .into_response());
    }

    if !state
        .sessions
        .verify_credentials(&request.username, &request.password)
    {
        log_audit_event(AuditEvent::AuthFailure {
            client,
            reason: "invalid credentials".to_string(),
        });
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "message": "Invalid username or password",
            })),
        )
            .into_response());
    }

    let token = state.sessions.create_session(&request.username).await?;
    log_audit_event(AuditEvent::AuthSuccess {
        client,
        user: request.username,
    });

    Ok((
        [(header::SET_COOKIE, state.sessions.session_cookie(&token))],
        Json(json!({ "success": true, "message": "Logged in" })),
    )
        .into_response())
}

/// POST /api/auth/logout - End the caller's session.
pub(crate) async fn logout(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientAddr>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = session_token(&headers)
        && let Err(e) = state.sessions.delete_session(&token).await
    {
        error!(error = %e, "Failed to delete session");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": "Logout failed" })),
        )
            .into_response();
    }

    log_audit_event(AuditEvent::Logout { client });

    (
        [(header::SET_COOKIE, state.sessions.clear_session_cookie())],
        Json(json!({ "success": true, "message": "Logged out" })),
    )
        .into_response()
}

/// ANY /api/manage/logout - Make browsers forget cached basic credentials.
pub(crate) async fn basic_logout(State(state): State<SharedState>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [
            (
                header::SET_COOKIE,
                "auth=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict"
                    .to_string(),
            ),
            (
                header::WWW_AUTHENTICATE,
                format!("Basic realm=\"{}\"", state.sessions.realm()),
            ),
        ],
        "Logged out.",
    )
        .into_response()
}
