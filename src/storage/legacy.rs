//! Legacy third-party file host.
//!
//! Not a key/value store: files uploaded before the blob store existed live
//! on a remote host and are proxied on every read. Short identifiers are
//! served from the host's public file path; long identifiers are bot-API
//! file references that must first be translated into a concrete file path
//! with a `getFile` call.

use crate::config::LegacyConfig;
use crate::error::{Error, Result};
use crate::http::URI_COMPONENT;
use crate::storage::backend::{
    BackendKind, ListOptions, ListPage, PutOptions, StorageBackend, StoredObject,
};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::utf8_percent_encode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Identifiers longer than this are bot-API file references.
pub const LEGACY_PATH_THRESHOLD: usize = 39;

/// Returns whether `identifier` is a bot-API file reference.
pub fn is_legacy_path(identifier: &str) -> bool {
    identifier.len() > LEGACY_PATH_THRESHOLD
}

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotFile {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    username: Option<String>,
    first_name: Option<String>,
}

/// Identity of the bot behind the legacy host, as reported by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// HTTP proxy in front of the legacy file host.
#[derive(Clone)]
pub struct LegacyFileHost {
    client: reqwest::Client,
    base_url: String,
    bot_api_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl LegacyFileHost {
    /// Creates a proxy for the host described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LegacyConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create legacy host HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bot_api_url: config.bot_api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Whether both bot credentials are configured.
    pub fn bot_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    /// Public URL of a file on the legacy host, with the identifier escaped
    /// as one path segment.
    pub fn public_url(&self, identifier: &str) -> String {
        format!(
            "{}/file/{}",
            self.base_url,
            utf8_percent_encode(identifier, URI_COMPONENT)
        )
    }

    /// Fetches a file's bytes.
    ///
    /// Bot references are translated through `getFile` first; a reference
    /// that cannot be translated is [`Error::NotFound`]. A non-success
    /// upstream status is returned as [`Error::Upstream`] carrying the
    /// original response so callers can forward it verbatim.
    ///
    /// # Errors
    ///
    /// See above; transport failures are [`Error::UpstreamTransport`].
    pub async fn fetch(&self, identifier: &str) -> Result<StoredObject> {
        let url = if is_legacy_path(identifier) {
            let file_path = self
                .resolve_file_path(bot_file_id(identifier))
                .await?
                .ok_or_else(|| Error::not_found(identifier))?;
            let token = self.bot_token()?;
            format!("{}/file/bot{token}/{file_path}", self.bot_api_url)
        } else {
            self.public_url(identifier)
        };

        debug!(%identifier, "Fetching from legacy host");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
                content_type,
                body,
            });
        }

        Ok(StoredObject {
            body,
            content_type,
            metadata: None,
        })
    }

    /// Resolves a bot file id into the host's file path.
    ///
    /// Any failure is logged and reported as `None`.
    async fn resolve_file_path(&self, file_id: &str) -> Result<Option<String>> {
        let token = self.bot_token()?;
        let url = url::Url::parse_with_params(
            &format!("{}/bot{token}/getFile", self.bot_api_url),
            &[("file_id", file_id)],
        )
        .context("Failed to build getFile URL")?;

        let response = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "getFile request failed");
                return Ok(None);
            },
            Err(e) => {
                warn!(error = %e.without_url(), "getFile request failed");
                return Ok(None);
            },
        };

        match response.json::<BotResponse<BotFile>>().await {
            Ok(BotResponse {
                ok: true,
                result: Some(BotFile { file_path }),
                ..
            }) => Ok(file_path),
            Ok(other) => {
                warn!(description = ?other.description, "getFile returned no file path");
                Ok(None)
            },
            Err(e) => {
                warn!(error = %e.without_url(), "getFile response was not valid JSON");
                Ok(None)
            },
        }
    }

    /// Asks the bot API who we are; used by the status endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the bot is unreachable.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        let token = self.bot_token()?;
        let response = self
            .client
            .get(format!("{}/bot{token}/getMe", self.bot_api_url))
            .send()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        let parsed: BotResponse<BotUser> = response
            .json()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        match parsed {
            BotResponse {
                ok: true,
                result: Some(user),
                ..
            } => Ok(BotIdentity {
                username: user.username,
                first_name: user.first_name,
            }),
            other => Err(Error::UpstreamTransport(
                other
                    .description
                    .unwrap_or_else(|| "getMe returned ok=false".to_string()),
            )),
        }
    }

    fn bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| Error::unavailable("legacy bot API"))
    }
}

/// Bot file id: the identifier up to its first extension dot.
fn bot_file_id(identifier: &str) -> &str {
    identifier.split('.').next().unwrap_or(identifier)
}

#[async_trait]
impl StorageBackend for LegacyFileHost {
    fn kind(&self) -> BackendKind {
        BackendKind::LegacyFileHost
    }

    async fn put(&self, _key: &str, _body: Bytes, _options: PutOptions) -> Result<()> {
        Err(Error::unsupported(self.kind().name(), "put"))
    }

    /// Unresolvable references and upstream 404s are absent; other upstream
    /// failures are errors.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        match self.fetch(key).await {
            Ok(object) => Ok(Some(object)),
            Err(Error::NotFound(_)) | Err(Error::Upstream { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::unsupported(self.kind().name(), "delete"))
    }

    async fn list(&self, _options: ListOptions) -> Result<ListPage> {
        Err(Error::unsupported(self.kind().name(), "list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(token: Option<&str>) -> LegacyFileHost {
        LegacyFileHost::new(&LegacyConfig {
            base_url: "https://legacy.example/".to_string(),
            bot_token: token.map(str::to_string),
            ..LegacyConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_legacy_path_threshold() {
        assert!(!is_legacy_path(&"a".repeat(39)));
        assert!(is_legacy_path(&"a".repeat(40)));
    }

    #[test]
    fn test_bot_file_id_strips_extension() {
        assert_eq!(bot_file_id("AgACAgEAAxkDAAMDZt1Gzs4W.png"), "AgACAgEAAxkDAAMDZt1Gzs4W");
        assert_eq!(bot_file_id("noext"), "noext");
    }

    #[test]
    fn test_public_url_trims_trailing_slash() {
        assert_eq!(host(None).public_url("abc.png"), "https://legacy.example/file/abc.png");
    }

    #[test]
    fn test_public_url_escapes_identifier() {
        let legacy = host(None);
        assert_eq!(
            legacy.public_url("a?b#c.png"),
            "https://legacy.example/file/a%3Fb%23c.png"
        );
        assert_eq!(
            legacy.public_url("x/../y.png"),
            "https://legacy.example/file/x%2F..%2Fy.png"
        );
    }

    #[tokio::test]
    async fn test_bot_reference_without_token_is_unavailable() {
        let err = host(None).fetch(&"x".repeat(60)).await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_write_operations_unsupported() {
        let legacy = host(None);
        let err = legacy
            .put("k", Bytes::new(), PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { operation: "put", .. }));
        assert!(legacy.delete("k").await.is_err());
        assert!(legacy.list(ListOptions::default()).await.is_err());
    }
}
