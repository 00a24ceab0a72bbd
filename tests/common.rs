//! Shared helpers for gateway integration tests.
//!
//! [`TestHost`] serves the real router on an ephemeral port, backed by
//! in-memory storage, and exposes a reqwest client that never follows
//! redirects.

#![allow(dead_code)]

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use filegate::config::{
    BlobBackendKind, BlobConfig, GatewayConfig, IndexBackend, IndexConfig,
};
use filegate::http::{AppState, SharedState, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const BOUNDARY: &str = "filegate-test-boundary";

/// Config with in-memory index and blob store and no auth.
pub fn memory_config() -> GatewayConfig {
    GatewayConfig {
        index: Some(IndexConfig {
            backend: IndexBackend::Memory,
            ..IndexConfig::default()
        }),
        blob: Some(BlobConfig {
            backend: BlobBackendKind::Memory,
            ..BlobConfig::default()
        }),
        ..GatewayConfig::default()
    }
}

/// Stand-in for the legacy file host.
///
/// `/file/missing.png` answers 404 "gone"; any other file is a PNG.
pub async fn spawn_legacy_host() -> String {
    let app = Router::new()
        .route(
            "/file/missing.png",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        )
        .route(
            "/file/{name}",
            get(|| async { ([("content-type", "image/png")], "legacy-bytes") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

pub struct TestHost {
    pub addr: SocketAddr,
    pub state: SharedState,
    pub client: reqwest::Client,
}

impl TestHost {
    pub async fn start(config: GatewayConfig) -> anyhow::Result<Self> {
        let state = Arc::new(AppState::with_moderator(
            config.clone(),
            filegate::storage::Backends::from_config(&config)?,
            None,
        ));
        let app = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            addr,
            state,
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// Posts `body` as the `file` field of a multipart form.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        body: &[u8],
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url("/upload"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body("file", file_name, content_type, body))
            .send()
            .await
    }
}

/// Single-part `multipart/form-data` body.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    out.extend_from_slice(body);
    out.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    out
}
