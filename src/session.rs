//! Credential and session gate.
//!
//! A request is authenticated by, in order:
//!
//! 1. No credential pair configured: everything passes (`no-auth-required`).
//! 2. A `filegate_session` cookie naming a live session in the index.
//! 3. An `Authorization: Basic` header matching the credential pair.
//!
//! Sessions live in the metadata index under `session:<token>` with a
//! backend-enforced TTL. Expiry is also checked on read and expired entries
//! are deleted.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::keys::SESSION_PREFIX;
use crate::storage::{BackendKind, KvStore, PutOptions, StorageBackend};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "filegate_session";

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthReason {
    NoAuthRequired,
    Session,
    BasicAuth,
}

/// Result of [`SessionGate::authenticate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub reason: Option<AuthReason>,
    /// User name, for session and basic-auth outcomes.
    pub principal: Option<String>,
    /// Session token, for session outcomes.
    pub token: Option<String>,
}

impl AuthOutcome {
    fn no_auth_required() -> Self {
        Self {
            authenticated: true,
            reason: Some(AuthReason::NoAuthRequired),
            ..Self::default()
        }
    }

    fn denied() -> Self {
        Self::default()
    }
}

/// Stored session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SessionData {
    user: String,
    #[serde(rename = "createdAt")]
    created_at: i64,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

/// Authenticates requests and manages login sessions.
#[derive(Clone)]
pub struct SessionGate {
    credentials: Option<(String, String)>,
    index: Option<KvStore>,
    ttl: Duration,
    realm: String,
}

impl SessionGate {
    pub fn new(config: &AuthConfig, index: Option<KvStore>) -> Self {
        Self {
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            index,
            ttl: Duration::from_secs(config.session_ttl_secs),
            realm: config.realm.clone(),
        }
    }

    /// Whether a credential pair is configured.
    pub fn auth_required(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Authenticates a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        self.authenticate_at(headers, Utc::now()).await
    }

    /// [`authenticate`](Self::authenticate) with an explicit clock.
    pub async fn authenticate_at(&self, headers: &HeaderMap, now: DateTime<Utc>) -> AuthOutcome {
        if !self.auth_required() {
            return AuthOutcome::no_auth_required();
        }

        if let Some(token) = session_token(headers)
            && let Some(user) = self.verify_session_at(&token, now).await
        {
            return AuthOutcome {
                authenticated: true,
                reason: Some(AuthReason::Session),
                principal: Some(user),
                token: Some(token),
            };
        }

        if let Some(user) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| self.verify_basic(v))
        {
            return AuthOutcome {
                authenticated: true,
                reason: Some(AuthReason::BasicAuth),
                principal: Some(user),
                token: None,
            };
        }

        AuthOutcome::denied()
    }

    /// Checks a user/password pair against the configured credentials.
    ///
    /// Comparison is case-sensitive and constant-time. Always false when no
    /// credentials are configured.
    pub fn verify_credentials(&self, user: &str, pass: &str) -> bool {
        let Some((expected_user, expected_pass)) = &self.credentials else {
            return false;
        };
        let user_ok: bool = user.as_bytes().ct_eq(expected_user.as_bytes()).into();
        let pass_ok: bool = pass.as_bytes().ct_eq(expected_pass.as_bytes()).into();
        user_ok & pass_ok
    }

    /// Validates an `Authorization` header value, returning the user.
    fn verify_basic(&self, header: &str) -> Option<String> {
        let (scheme, encoded) = header.split_once(' ')?;
        if scheme != "Basic" || encoded.is_empty() {
            return None;
        }

        let decoded = match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => String::from_utf8(bytes).ok()?,
            Err(e) => {
                debug!(error = %e, "Malformed basic auth header");
                return None;
            },
        };

        if decoded.chars().any(|c| c <= '\u{1f}' || c == '\u{7f}') {
            return None;
        }

        let (user, pass) = decoded.split_once(':')?;
        self.verify_credentials(user, pass)
            .then(|| user.to_string())
    }

    fn index(&self) -> Result<&KvStore> {
        self.index
            .as_ref()
            .ok_or_else(|| Error::unavailable(BackendKind::MetadataIndex.name()))
    }

    /// Creates a session for `user`, returning its token.
    ///
    /// # Errors
    ///
    /// Returns an error if no index is configured or the write fails.
    pub async fn create_session(&self, user: &str) -> Result<String> {
        self.create_session_at(user, Utc::now()).await
    }

    /// [`create_session`](Self::create_session) with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if no index is configured or the write fails.
    pub async fn create_session_at(&self, user: &str, now: DateTime<Utc>) -> Result<String> {
        let index = self.index()?;
        let token = generate_token();
        let created_at = now.timestamp_millis();
        let data = SessionData {
            user: user.to_string(),
            created_at,
            expires_at: created_at + self.ttl.as_millis() as i64,
        };
        let body = serde_json::to_vec(&data).map_err(anyhow::Error::from)?;

        index
            .put(
                &session_key(&token),
                Bytes::from(body),
                PutOptions {
                    ttl: Some(self.ttl),
                    ..PutOptions::default()
                },
            )
            .await?;

        Ok(token)
    }

    /// Returns the session's user if `token` names a live session at `now`.
    ///
    /// Expired sessions are deleted. Lookup failures and corrupt payloads
    /// are logged and treated as no session.
    pub async fn verify_session_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let index = self.index.as_ref()?;
        let key = session_key(token);

        let object = match index.get(&key).await {
            Ok(object) => object?,
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                return None;
            },
        };

        let data: SessionData = match serde_json::from_slice(&object.body) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Corrupt session payload");
                return None;
            },
        };

        if now.timestamp_millis() >= data.expires_at {
            debug!(user = %data.user, "Session expired");
            if let Err(e) = index.delete(&key).await {
                warn!(error = %e, "Failed to delete expired session");
            }
            return None;
        }

        Some(data.user)
    }

    /// Deletes a session. Deleting an unknown token is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_session(&self, token: &str) -> Result<()> {
        match &self.index {
            Some(index) => index.delete(&session_key(token)).await,
            None => Ok(()),
        }
    }

    /// `Set-Cookie` value establishing a session.
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.ttl.as_secs()
        )
    }

    /// `Set-Cookie` value clearing the session cookie.
    pub fn clear_session_cookie(&self) -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
    }
}

fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

/// 256 random bits, hex-encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Extracts the session token from the `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
