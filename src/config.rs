//! Configuration types for the filegate gateway.
//!
//! This module provides configuration structs for loading and validating
//! gateway settings from a TOML file. It includes:
//!
//! - [`GatewayConfig`] - Root configuration struct
//! - [`ServerConfig`] - HTTP listener settings
//! - [`AuthConfig`] - Credential pair and session lifetime
//! - [`IndexConfig`] / [`BlobConfig`] - Optional storage backends
//! - [`LegacyConfig`] - Legacy file host and its bot API
//! - [`ModerationConfig`] / [`AccessConfig`] - Delivery gating
//!
//! Every section has defaults suitable for local development. A handful of
//! environment variables override file values; they are read here and
//! nowhere else.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Placeholder image served to embedding pages for blocked files.
pub const DEFAULT_BLOCK_PLACEHOLDER: &str =
    "https://static-res.pages.dev/teleimage/img-block-compressed.png";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// filegate.toml configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    /// Metadata index; `None` disables access control and moderation.
    pub index: Option<IndexConfig>,
    /// Blob store; `None` makes uploads return 503.
    pub blob: Option<BlobConfig>,
    pub legacy: LegacyConfig,
    pub moderation: ModerationConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Externally visible origin, e.g. `https://img.example.com`.
    ///
    /// Used to recognise the admin page in the Referer header. When unset
    /// the request's Host header is used.
    pub public_origin: Option<String>,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            public_origin: None,
            request_timeout_secs: 60,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_ttl_secs: u64,
    /// Realm announced in `WWW-Authenticate` challenges.
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            realm: "filegate".to_string(),
        }
    }
}

impl AuthConfig {
    /// The configured credential pair, if both halves are non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Redb,
            path: PathBuf::from("data/index.redb"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackendKind {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub backend: BlobBackendKind,
    pub path: PathBuf,
    /// Whether new uploads are written here. A non-primary blob store only
    /// serves and deletes existing objects.
    pub primary: bool,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackendKind::Filesystem,
            path: PathBuf::from("data/blobs"),
            primary: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub base_url: String,
    pub bot_api_url: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://telegra.ph".to_string(),
            bot_api_url: "https://api.telegram.org".to_string(),
            bot_token: None,
            chat_id: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Provider key; moderation is disabled when unset.
    pub api_key: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.moderatecontent.com/moderate/".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Only serve files explicitly listed as `White`.
    pub whitelist_only: bool,
    pub block_placeholder_url: String,
    pub block_page: String,
    pub whitelist_page: String,
    pub admin_page: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            whitelist_only: false,
            block_placeholder_url: DEFAULT_BLOCK_PLACEHOLDER.to_string(),
            block_page: "/block-img.html".to_string(),
            whitelist_page: "/whitelist-on.html".to_string(),
            admin_page: "/admin".to_string(),
        }
    }
}

fn env_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl GatewayConfig {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: GatewayConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads the file if given (defaults otherwise), then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("BASIC_USER") {
            self.auth.username = Some(user);
        }
        if let Some(pass) = lookup("BASIC_PASS") {
            self.auth.password = Some(pass);
        }
        if let Some(flag) = lookup("USE_R2") {
            if env_flag(&flag) {
                self.blob.get_or_insert_with(BlobConfig::default);
            } else {
                self.blob = None;
            }
        }
        if let Some(flag) = lookup("WHITELIST_MODE") {
            self.access.whitelist_only = env_flag(&flag);
        }
        if let Some(key) = lookup("MODERATE_CONTENT_API_KEY") {
            self.moderation.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(token) = lookup("TG_BOT_TOKEN") {
            self.legacy.bot_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(chat) = lookup("TG_CHAT_ID") {
            self.legacy.chat_id = Some(chat).filter(|c| !c.is_empty());
        }
        if let Some(listen) = lookup("FILEGATE_LISTEN") {
            self.server.listen = listen;
        }
    }

    /// Parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.listen` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .with_context(|| format!("Invalid server.listen address: {}", self.server.listen))
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Unparseable listen address or URLs
    /// - Only one half of the credential pair set
    /// - Zero session TTL or timeouts
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.listen.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.listen is not a valid socket address (got: '{}')\n  \
                 Example: listen = \"{DEFAULT_LISTEN}\"",
                self.server.listen
            ));
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs cannot be 0".to_string());
        }
        if let Some(origin) = &self.server.public_origin
            && url::Url::parse(origin).is_err()
        {
            errors.push(format!("server.public_origin is not a valid URL: {origin}"));
        }

        // 2. Auth
        let user_set = self.auth.username.as_deref().is_some_and(|u| !u.is_empty());
        let pass_set = self.auth.password.as_deref().is_some_and(|p| !p.is_empty());
        if user_set != pass_set {
            errors.push(
                "auth.username and auth.password must be set together\n  \
                 Leave both unset to disable authentication"
                    .to_string(),
            );
        }
        if self.auth.session_ttl_secs == 0 {
            errors.push("auth.session_ttl_secs cannot be 0".to_string());
        }
        if self.auth.credentials().is_some() && self.index.is_none() {
            warnings.push(
                "Authentication is enabled without a metadata index\n  \
                 Sessions cannot be stored; only basic auth will work"
                    .to_string(),
            );
        }

        // 3. Storage
        if let Some(index) = &self.index
            && index.backend == IndexBackend::Redb
            && index.path.as_os_str().is_empty()
        {
            errors.push("index.path cannot be empty for the redb backend".to_string());
        }
        if let Some(blob) = &self.blob
            && blob.backend == BlobBackendKind::Filesystem
            && blob.path.as_os_str().is_empty()
        {
            errors.push("blob.path cannot be empty for the filesystem backend".to_string());
        }
        if self.blob.is_none() {
            warnings.push("No blob store configured; uploads will be rejected".to_string());
        }

        // 4. Legacy host
        for (field, value) in [
            ("legacy.base_url", &self.legacy.base_url),
            ("legacy.bot_api_url", &self.legacy.bot_api_url),
            ("moderation.api_url", &self.moderation.api_url),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(format!("{field} is not a valid URL: {value}"));
            }
        }
        if self.legacy.timeout_secs == 0 {
            errors.push("legacy.timeout_secs cannot be 0".to_string());
        }
        if self.legacy.bot_token.is_some() != self.legacy.chat_id.is_some() {
            warnings.push(
                "Only one of legacy.bot_token and legacy.chat_id is set\n  \
                 The status endpoint will report the bot as unconfigured"
                    .to_string(),
            );
        }

        // 5. Gating
        if self.index.is_none() {
            if self.moderation.api_key.is_some() {
                warnings.push(
                    "moderation.api_key is set but no metadata index is configured\n  \
                     Files will be served without moderation"
                        .to_string(),
                );
            }
            if self.access.whitelist_only {
                warnings.push(
                    "access.whitelist_only has no effect without a metadata index".to_string(),
                );
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
