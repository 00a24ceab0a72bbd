//! Content moderation provider.
//!
//! The provider classifies a publicly reachable file URL and answers with a
//! rating label (`everyone`, `teen`, `adult`). The delivery pipeline treats
//! every failure here as "no label" and keeps serving.

use crate::config::ModerationConfig;
use crate::error::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Classifies file URLs.
#[async_trait]
pub trait Moderator: Send + Sync + 'static {
    /// Returns the rating label for the file at `file_url`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an unparseable answer.
    async fn classify(&self, file_url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct RatingResponse {
    rating_label: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the moderatecontent.com HTTP API.
#[derive(Clone)]
pub struct ModerateContentClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ModerateContentClient {
    /// Creates a client, or `None` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ModerationConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create moderation HTTP client")?;

        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        }))
    }
}

#[async_trait]
impl Moderator for ModerateContentClient {
    async fn classify(&self, file_url: &str) -> Result<String> {
        let url = url::Url::parse_with_params(
            &self.api_url,
            &[("key", self.api_key.as_str()), ("url", file_url)],
        )
        .context("Failed to build moderation URL")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamTransport(format!(
                "moderation provider answered {status}"
            )));
        }

        let rating: RatingResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamTransport(e.without_url().to_string()))?;

        rating
            .rating_label
            .filter(|label| !label.is_empty())
            .ok_or_else(|| {
                Error::UpstreamTransport(
                    rating
                        .error
                        .unwrap_or_else(|| "moderation response had no rating_label".to_string()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn spawn_provider() -> String {
        let app = Router::new().route(
            "/moderate/",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let reply = |status, body: Value| (status, Json(body));
                match q.get("key").map(String::as_str) {
                    Some("k") => {},
                    Some("down") => {
                        return reply(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            json!({ "rating_label": "adult" }),
                        );
                    },
                    Some("blank") => {
                        return reply(StatusCode::OK, json!({ "rating_label": "" }));
                    },
                    _ => return reply(StatusCode::OK, json!({ "error": "bad key" })),
                }
                let label = if q["url"].contains("nsfw") { "adult" } else { "everyone" };
                reply(StatusCode::OK, json!({ "error_code": 0, "rating_label": label }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/moderate/")
    }

    fn client(api_url: String, key: &str) -> ModerateContentClient {
        ModerateContentClient::from_config(&ModerationConfig {
            api_key: Some(key.to_string()),
            api_url,
            timeout_secs: 5,
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_disabled_without_key() {
        let config = ModerationConfig::default();
        assert!(ModerateContentClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_classify_returns_label() {
        let api_url = spawn_provider().await;
        let moderator = client(api_url, "k");

        let label = moderator
            .classify("https://legacy.example/file/nsfw.png")
            .await
            .unwrap();
        assert_eq!(label, "adult");

        let label = moderator
            .classify("https://legacy.example/file/cat.png")
            .await
            .unwrap();
        assert_eq!(label, "everyone");
    }

    #[tokio::test]
    async fn test_classify_surfaces_provider_error() {
        let api_url = spawn_provider().await;
        let err = client(api_url, "wrong")
            .classify("https://legacy.example/file/cat.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_classify_rejects_failed_reply() {
        let api_url = spawn_provider().await;
        let err = client(api_url, "down")
            .classify("https://legacy.example/file/cat.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamTransport(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_classify_rejects_empty_label() {
        let api_url = spawn_provider().await;
        let err = client(api_url, "blank")
            .classify("https://legacy.example/file/cat.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no rating_label"));
    }
}
