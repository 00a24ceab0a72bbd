//! Reachability snapshot of every configured backend.

use crate::storage::{Backends, ListOptions, StorageBackend};
use serde::Serialize;

/// Bot API reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStatus {
    pub connected: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
}

/// Metadata index or blob store reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub connected: bool,
    pub enabled: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_data: Option<bool>,
}

impl StoreStatus {
    fn unconfigured() -> Self {
        Self {
            connected: false,
            enabled: false,
            message: "not configured".to_string(),
            has_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub enabled: bool,
    pub message: String,
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub telegram: LegacyStatus,
    pub kv: StoreStatus,
    pub r2: StoreStatus,
    pub auth: AuthStatus,
}

/// Probes every backend once.
pub async fn probe(backends: &Backends, auth_enabled: bool) -> StatusReport {
    let telegram = if backends.legacy.bot_configured() {
        match backends.legacy.get_me().await {
            Ok(me) => LegacyStatus {
                connected: true,
                message: format!(
                    "connected as @{}",
                    me.username.as_deref().unwrap_or("unknown")
                ),
                bot_name: me.first_name,
                bot_username: me.username,
            },
            Err(e) => LegacyStatus {
                connected: false,
                message: format!("connection failed: {e}"),
                bot_name: None,
                bot_username: None,
            },
        }
    } else {
        LegacyStatus {
            connected: false,
            message: "not configured".to_string(),
            bot_name: None,
            bot_username: None,
        }
    };

    let kv = match &backends.index {
        Some(index) => probe_store(index).await,
        None => StoreStatus::unconfigured(),
    };
    let r2 = match &backends.blob {
        Some(blob) => probe_store(blob).await,
        None => StoreStatus::unconfigured(),
    };

    let auth = AuthStatus {
        enabled: auth_enabled,
        message: if auth_enabled {
            "password authentication enabled"
        } else {
            "authentication disabled"
        }
        .to_string(),
    };

    StatusReport {
        telegram,
        kv,
        r2,
        auth,
    }
}

async fn probe_store<S: StorageBackend>(store: &S) -> StoreStatus {
    let probe = ListOptions {
        limit: Some(1),
        ..ListOptions::default()
    };
    match store.list(probe).await {
        Ok(page) => StoreStatus {
            connected: true,
            enabled: true,
            message: "connected".to_string(),
            has_data: Some(!page.entries.is_empty()),
        },
        Err(e) => StoreStatus {
            connected: false,
            enabled: false,
            message: format!("connection failed: {e}"),
            has_data: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyConfig;
    use crate::record::MetadataRecord;
    use crate::storage::{BlobStore, KvStore, LegacyFileHost};

    #[tokio::test]
    async fn test_probe_reports_each_backend() {
        let index = KvStore::memory();
        index
            .put_record("img:a.png", &MetadataRecord::bootstrap("a.png"))
            .await
            .unwrap();
        let backends = Backends {
            index: Some(index),
            blob: Some(BlobStore::memory()),
            legacy: LegacyFileHost::new(&LegacyConfig::default()).unwrap(),
            blob_primary: true,
        };

        let report = probe(&backends, true).await;
        assert!(!report.telegram.connected);
        assert_eq!(report.telegram.message, "not configured");
        assert!(report.kv.connected);
        assert_eq!(report.kv.has_data, Some(true));
        assert!(report.r2.connected);
        assert_eq!(report.r2.has_data, Some(false));
        assert!(report.auth.enabled);
    }

    #[tokio::test]
    async fn test_probe_without_stores() {
        let backends = Backends {
            index: None,
            blob: None,
            legacy: LegacyFileHost::new(&LegacyConfig::default()).unwrap(),
            blob_primary: false,
        };

        let report = probe(&backends, false).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kv"]["connected"], false);
        assert_eq!(json["r2"]["enabled"], false);
        assert!(json["r2"].get("hasData").is_none());
        assert_eq!(json["auth"]["enabled"], false);
    }
}
