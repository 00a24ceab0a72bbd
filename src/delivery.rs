//! File delivery: resolve, fetch, gate, moderate, serve.
//!
//! Each request runs the same sequence:
//!
//! 1. Resolve the identifier to a backend ([`StorageResolver`]).
//! 2. Fetch the bytes. Legacy upstream failures propagate as
//!    [`Error::Upstream`] and are forwarded verbatim.
//! 3. Authenticated requests coming from the admin page skip gating.
//! 4. Without a metadata index the bytes are served as-is.
//! 5. A missing record is bootstrapped and persisted.
//! 6. `White` serves; `Block`/`adult` redirects; whitelist-only mode
//!    redirects everything else.
//! 7. Unlabeled legacy files are classified once; the label is persisted.
//!
//! Record writes are best effort: failures are logged and the file is still
//! served.

use crate::config::AccessConfig;
use crate::error::{Error, Result};
use crate::moderation::Moderator;
use crate::record::{ListType, MetadataRecord, UNLABELED};
use crate::resolver::{Resolution, StorageResolver, Target};
use crate::storage::{Backends, KvStore, StorageBackend, StoredObject};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-request inputs to the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryRequest<'a> {
    pub identifier: &'a str,
    pub referer: Option<&'a str>,
    /// Origin the request was addressed to (`https://host`), used for the
    /// admin check and absolute redirects. Empty yields relative redirects.
    pub origin: &'a str,
    /// Principal authenticated by session or basic auth. `None` when the
    /// gate is disabled or the caller is anonymous.
    pub principal: Option<&'a str>,
}

/// A file ready to be written to the response.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedFile {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: String,
}

/// What to send back.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Serve(ServedFile),
    /// 302 to this location.
    Redirect(String),
}

/// Access decision for a record, before moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Allow,
    Blocked,
    WhitelistOnly,
    Moderate,
}

fn gate(record: &MetadataRecord, whitelist_only: bool) -> Gate {
    match record.list_type {
        ListType::White => Gate::Allow,
        ListType::Block => Gate::Blocked,
        ListType::None if record.is_adult() => Gate::Blocked,
        ListType::None if whitelist_only => Gate::WhitelistOnly,
        ListType::None => Gate::Moderate,
    }
}

/// Serves files from whichever backend holds them.
#[derive(Clone)]
pub struct DeliveryPipeline {
    resolver: StorageResolver,
    backends: Backends,
    moderator: Option<Arc<dyn Moderator>>,
    access: AccessConfig,
}

impl DeliveryPipeline {
    pub fn new(
        backends: Backends,
        moderator: Option<Arc<dyn Moderator>>,
        access: AccessConfig,
    ) -> Self {
        Self {
            resolver: StorageResolver::new(backends.index.clone()),
            backends,
            moderator,
            access,
        }
    }

    /// Runs the pipeline for one request.
    ///
    /// Redirects are successful outcomes. Errors are reserved for absence
    /// (404), unconfigured backends (503), upstream failures (forwarded) and
    /// internal failures.
    ///
    /// # Errors
    ///
    /// See above.
    pub async fn deliver(&self, request: DeliveryRequest<'_>) -> Result<Delivery> {
        let identifier = request.identifier;
        let resolution = self
            .resolver
            .resolve(identifier)
            .await?
            .ok_or_else(|| Error::not_found(identifier))?;

        let object = self.fetch(&resolution).await?;

        if self.is_admin_request(&request) {
            debug!(%identifier, "Admin request bypasses access control");
            return Ok(Delivery::Serve(self.served(&resolution, object, None)));
        }

        let Some(index) = &self.backends.index else {
            return Ok(Delivery::Serve(self.served(&resolution, object, None)));
        };

        let mut record = match resolution.record.clone() {
            Some(record) => record,
            None => {
                let record = MetadataRecord::bootstrap(identifier);
                persist(index, &resolution.record_key, &record).await;
                record
            },
        };

        match gate(&record, self.access.whitelist_only) {
            Gate::Allow => {},
            Gate::Blocked => {
                info!(%identifier, list_type = ?record.list_type, label = %record.label, "Blocked file requested");
                return Ok(Delivery::Redirect(self.blocked_location(&request)));
            },
            Gate::WhitelistOnly => {
                return Ok(Delivery::Redirect(format!(
                    "{}{}",
                    request.origin, self.access.whitelist_page
                )));
            },
            Gate::Moderate => {
                if let Some(label) = self.moderate(&resolution, &record).await {
                    record.label = label;
                    persist(index, &resolution.record_key, &record).await;

                    if record.is_adult() {
                        info!(%identifier, "File classified as adult");
                        return Ok(Delivery::Redirect(format!(
                            "{}{}",
                            request.origin, self.access.block_page
                        )));
                    }
                }
            },
        }

        Ok(Delivery::Serve(self.served(&resolution, object, Some(&record))))
    }

    async fn fetch(&self, resolution: &Resolution) -> Result<StoredObject> {
        match &resolution.target {
            Target::Blob { key } => self
                .backends
                .blob()?
                .get(key)
                .await?
                .ok_or_else(|| Error::not_found(key.as_str())),
            Target::Legacy { .. } => self.backends.legacy.fetch(&resolution.identifier).await,
        }
    }

    fn is_admin_request(&self, request: &DeliveryRequest<'_>) -> bool {
        if request.principal.is_none() {
            return false;
        }
        let admin_url = format!("{}{}", request.origin, self.access.admin_page);
        request
            .referer
            .is_some_and(|referer| referer.contains(&admin_url))
    }

    fn blocked_location(&self, request: &DeliveryRequest<'_>) -> String {
        if request.referer.is_some() {
            self.access.block_placeholder_url.clone()
        } else {
            format!("{}{}", request.origin, self.access.block_page)
        }
    }

    /// Classifies an unlabeled legacy file. Failures are logged and yield
    /// `None`.
    async fn moderate(&self, resolution: &Resolution, record: &MetadataRecord) -> Option<String> {
        let moderator = self.moderator.as_ref()?;
        if record.label != UNLABELED {
            return None;
        }
        // Blob files have no public URL outside this gateway.
        let Target::Legacy { .. } = resolution.target else {
            return None;
        };

        let file_url = self.backends.legacy.public_url(&resolution.identifier);
        match moderator.classify(&file_url).await {
            Ok(label) => {
                debug!(identifier = %resolution.identifier, %label, "Moderation result");
                Some(label)
            },
            Err(e) => {
                warn!(identifier = %resolution.identifier, error = %e, "Content moderation failed");
                None
            },
        }
    }

    fn served(
        &self,
        resolution: &Resolution,
        object: StoredObject,
        record: Option<&MetadataRecord>,
    ) -> ServedFile {
        let file_name = object
            .metadata_str("fileName")
            .map(str::to_string)
            .or_else(|| record.map(|r| r.file_name.clone()))
            .or_else(|| resolution.record.as_ref().map(|r| r.file_name.clone()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| match &resolution.target {
                Target::Blob { key } => key.clone(),
                Target::Legacy { .. } => resolution.identifier.clone(),
            });

        let content_type = object
            .content_type
            .clone()
            .unwrap_or_else(|| {
                mime_guess::from_path(&file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        ServedFile {
            body: object.body,
            content_type,
            file_name,
        }
    }
}

/// Best-effort record write.
async fn persist(index: &KvStore, key: &str, record: &MetadataRecord) {
    if let Err(e) = index.put_record(key, record).await {
        warn!(%key, error = %e, "Failed to persist index record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyConfig;
    use crate::record::ADULT_LABEL;
    use crate::storage::{BlobStore, LegacyFileHost, PutOptions};
    use async_trait::async_trait;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModerator {
        label: &'static str,
        calls: AtomicUsize,
    }

    impl CountingModerator {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Moderator for CountingModerator {
        async fn classify(&self, _file_url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.to_string())
        }
    }

    struct FailingModerator;

    #[async_trait]
    impl Moderator for FailingModerator {
        async fn classify(&self, _file_url: &str) -> Result<String> {
            Err(Error::UpstreamTransport("connection refused".to_string()))
        }
    }

    /// Legacy host stand-in: `/file/missing.png` is 404, everything else is
    /// a PNG.
    async fn spawn_legacy_host() -> String {
        let app = Router::new()
            .route(
                "/file/missing.png",
                get(|| async { (StatusCode::NOT_FOUND, "gone") }),
            )
            .route(
                "/file/{name}",
                get(|| async { ([("content-type", "image/png")], "png-bytes") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn backends(index: Option<KvStore>, blob: Option<BlobStore>) -> Backends {
        let legacy = LegacyFileHost::new(&LegacyConfig {
            base_url: spawn_legacy_host().await,
            ..LegacyConfig::default()
        })
        .unwrap();
        Backends {
            index,
            blob,
            legacy,
            blob_primary: true,
        }
    }

    fn pipeline(
        backends: Backends,
        moderator: Option<Arc<dyn Moderator>>,
        whitelist_only: bool,
    ) -> DeliveryPipeline {
        DeliveryPipeline::new(
            backends,
            moderator,
            AccessConfig {
                whitelist_only,
                ..AccessConfig::default()
            },
        )
    }

    fn request(identifier: &str) -> DeliveryRequest<'_> {
        DeliveryRequest {
            identifier,
            origin: "https://img.example.com",
            ..DeliveryRequest::default()
        }
    }

    async fn index_with(key: &str, list_type: ListType, label: &str) -> KvStore {
        let index = KvStore::memory();
        let mut record = MetadataRecord::bootstrap("cat.png");
        record.list_type = list_type;
        record.label = label.to_string();
        index.put_record(key, &record).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_white_is_served_without_moderation() {
        let index = index_with("img:cat.png", ListType::White, UNLABELED).await;
        let moderator = CountingModerator::new(ADULT_LABEL);
        let pipeline = pipeline(backends(Some(index), None).await, Some(moderator.clone()), true);

        let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
        let Delivery::Serve(file) = delivery else {
            panic!("expected file, got {delivery:?}");
        };
        assert_eq!(file.body, Bytes::from_static(b"png-bytes"));
        assert_eq!(file.content_type, "image/png");
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn test_adult_label_is_denied_without_moderation() {
        let index = index_with("img:cat.png", ListType::None, ADULT_LABEL).await;
        let moderator = CountingModerator::new("everyone");
        let pipeline = pipeline(backends(Some(index), None).await, Some(moderator.clone()), false);

        let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Redirect("https://img.example.com/block-img.html".to_string())
        );
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn test_block_with_referer_redirects_to_placeholder() {
        let index = index_with("img:cat.png", ListType::Block, UNLABELED).await;
        let pipeline = pipeline(backends(Some(index), None).await, None, false);

        let delivery = pipeline
            .deliver(DeliveryRequest {
                referer: Some("https://blog.example.org/post"),
                ..request("cat.png")
            })
            .await
            .unwrap();
        assert_eq!(
            delivery,
            Delivery::Redirect(crate::config::DEFAULT_BLOCK_PLACEHOLDER.to_string())
        );
    }

    #[tokio::test]
    async fn test_moderation_runs_once_across_requests() {
        let index = KvStore::memory();
        let moderator = CountingModerator::new("everyone");
        let pipeline = pipeline(
            backends(Some(index.clone()), None).await,
            Some(moderator.clone()),
            false,
        );

        for _ in 0..3 {
            let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
            assert!(matches!(delivery, Delivery::Serve(_)));
        }

        assert_eq!(moderator.calls(), 1);
        let record = index.get_record("cat.png").await.unwrap().unwrap();
        assert_eq!(record.label, "everyone");
        assert_eq!(record.file_name, "cat.png");
    }

    #[tokio::test]
    async fn test_adult_classification_is_persisted_and_denied() {
        let index = KvStore::memory();
        let moderator = CountingModerator::new(ADULT_LABEL);
        let pipeline = pipeline(
            backends(Some(index.clone()), None).await,
            Some(moderator.clone()),
            false,
        );

        let first = pipeline.deliver(request("cat.png")).await.unwrap();
        assert_eq!(
            first,
            Delivery::Redirect("https://img.example.com/block-img.html".to_string())
        );
        let second = pipeline.deliver(request("cat.png")).await.unwrap();
        assert!(matches!(second, Delivery::Redirect(_)));

        assert_eq!(moderator.calls(), 1);
        assert!(index.get_record("cat.png").await.unwrap().unwrap().is_adult());
    }

    #[tokio::test]
    async fn test_moderation_failure_still_serves() {
        let index = KvStore::memory();
        let pipeline = pipeline(
            backends(Some(index.clone()), None).await,
            Some(Arc::new(FailingModerator)),
            false,
        );

        let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
        assert!(matches!(delivery, Delivery::Serve(_)));
        let record = index.get_record("cat.png").await.unwrap().unwrap();
        assert_eq!(record.label, UNLABELED);
    }

    #[tokio::test]
    async fn test_whitelist_mode_redirects_unlisted_files() {
        let pipeline = pipeline(backends(Some(KvStore::memory()), None).await, None, true);

        let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Redirect("https://img.example.com/whitelist-on.html".to_string())
        );
    }

    #[tokio::test]
    async fn test_without_index_serves_directly() {
        let moderator = CountingModerator::new(ADULT_LABEL);
        let pipeline = pipeline(backends(None, None).await, Some(moderator.clone()), true);

        let delivery = pipeline.deliver(request("cat.png")).await.unwrap();
        assert!(matches!(delivery, Delivery::Serve(_)));
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn test_admin_bypass_requires_principal() {
        let index = index_with("img:cat.png", ListType::Block, UNLABELED).await;
        let pipeline = pipeline(backends(Some(index), None).await, None, false);
        let referer = Some("https://img.example.com/admin.html");

        let anonymous = pipeline
            .deliver(DeliveryRequest {
                referer,
                ..request("cat.png")
            })
            .await
            .unwrap();
        assert!(matches!(anonymous, Delivery::Redirect(_)));

        let admin = pipeline
            .deliver(DeliveryRequest {
                referer,
                principal: Some("admin"),
                ..request("cat.png")
            })
            .await
            .unwrap();
        assert!(matches!(admin, Delivery::Serve(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_forwarded() {
        let pipeline = pipeline(backends(Some(KvStore::memory()), None).await, None, false);

        let err = pipeline.deliver(request("missing.png")).await.unwrap_err();
        let Error::Upstream { status, body, .. } = err else {
            panic!("expected upstream error, got {err:?}");
        };
        assert_eq!(status, 404);
        assert_eq!(body, Bytes::from_static(b"gone"));
    }

    #[tokio::test]
    async fn test_blob_file_served_with_stored_name() {
        let index = KvStore::memory();
        let blob = BlobStore::memory();
        blob.put(
            "1700_abc.png",
            Bytes::from_static(b"blob-bytes"),
            PutOptions {
                content_type: Some("image/png".to_string()),
                metadata: Some(serde_json::json!({ "fileName": "holiday photo.png" })),
                ttl: None,
            },
        )
        .await
        .unwrap();
        index
            .put_record(
                "img:1700_abc.png",
                &MetadataRecord::uploaded("holiday photo.png", 10, "image/png", 1),
            )
            .await
            .unwrap();

        let moderator = CountingModerator::new(ADULT_LABEL);
        let pipeline = pipeline(
            backends(Some(index), Some(blob)).await,
            Some(moderator.clone()),
            false,
        );

        let delivery = pipeline.deliver(request("1700_abc.png")).await.unwrap();
        let Delivery::Serve(file) = delivery else {
            panic!("expected file, got {delivery:?}");
        };
        assert_eq!(file.body, Bytes::from_static(b"blob-bytes"));
        assert_eq!(file.file_name, "holiday photo.png");
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn test_blob_target_without_blob_store_is_unavailable() {
        let pipeline = pipeline(backends(Some(KvStore::memory()), None).await, None, false);

        let err = pipeline.deliver(request("r2:abc.png")).await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_blob_miss_is_not_found() {
        let pipeline = pipeline(
            backends(Some(KvStore::memory()), Some(BlobStore::memory())).await,
            None,
            false,
        );

        let err = pipeline.deliver(request("r2:abc.png")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_invalid_blob_key_is_not_found() {
        let pipeline = pipeline(
            backends(Some(KvStore::memory()), Some(BlobStore::memory())).await,
            None,
            false,
        );

        for identifier in ["r2:..", "r2:.", "r2:/etc/passwd"] {
            let err = pipeline.deliver(request(identifier)).await.unwrap_err();
            assert_eq!(err.status_code(), 404, "{identifier}: {err}");
            assert!(!err.to_string().contains("Blob key"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_agrees_on_label() {
        let index = KvStore::memory();
        let moderator = CountingModerator::new(ADULT_LABEL);
        let pipeline = pipeline(
            backends(Some(index.clone()), None).await,
            Some(moderator.clone()),
            false,
        );

        let mut requests = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            requests.spawn(async move { pipeline.deliver(request("fresh.png")).await });
        }

        let blocked = Delivery::Redirect("https://img.example.com/block-img.html".to_string());
        while let Some(joined) = requests.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), blocked);
        }

        assert!(moderator.calls() >= 1);
        let record = index.get_record("fresh.png").await.unwrap().unwrap();
        assert_eq!(record.label, ADULT_LABEL);
        assert_eq!(record.list_type, ListType::None);
    }
}
