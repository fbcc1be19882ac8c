//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: the variables Thinger injects into plugin
//!    containers (`THINGER_HOST`, `THINGER_USER`, `THINGER_PLUGIN`,
//!    `THINGER_PLUGIN_VERSION`, `THINGER_TOKEN_SIGFOX_PLUGIN`) plus
//!    `SIGFOX_RELAY_LISTEN` and `SIGFOX_RELAY_API_KEY`
//! 2. **Config file**: path via `--config <path>`, or `sigfox-relay.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:3000"
//! api_key = "admin-secret"        # optional, guards /settings
//!
//! [platform]
//! host = "localhost"
//! scheme = "http"
//! user = "alice"
//! plugin = "sigfox"
//! plugin_version = "1.0.0"
//! token = "plugin-token"
//! settings_property = "settings"
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//!
//! [relay]
//! max_attempts = 2
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "sigfox-relay.toml";

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Optional Bearer key required on `/settings`. Override with
    /// `SIGFOX_RELAY_API_KEY`. Unset leaves the admin routes open.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Downstream Thinger platform connection.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Platform host, optionally with port (`THINGER_HOST`).
    #[serde(default = "default_host")]
    pub host: String,
    /// URL scheme used to reach `host` (default `http`).
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Account that owns devices and buckets (`THINGER_USER`).
    #[serde(default)]
    pub user: String,
    /// Plugin name used to scope stored properties (`THINGER_PLUGIN`).
    #[serde(default = "default_plugin")]
    pub plugin: String,
    /// Informational only, logged at startup (`THINGER_PLUGIN_VERSION`).
    #[serde(default)]
    pub plugin_version: String,
    /// Bearer token sent on every platform request (`THINGER_TOKEN_SIGFOX_PLUGIN`).
    #[serde(default)]
    pub token: String,
    /// Plugin property holding the relay settings (default `settings`).
    #[serde(default = "default_settings_property")]
    pub settings_property: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Callback orchestration limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Forward attempts per inbound callback, provisioning runs between
    /// attempts (default 2, i.e. one provisioning cycle and one retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_scheme() -> String {
    "http".to_string()
}
fn default_plugin() -> String {
    "sigfox".to_string()
}
fn default_settings_property() -> String {
    "settings".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            api_key: None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            scheme: default_scheme(),
            user: String::new(),
            plugin: default_plugin(),
            plugin_version: String::new(),
            token: String::new(),
            settings_property: default_settings_property(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PlatformConfig {
    /// Base URL for every platform request, without trailing slash.
    ///
    /// A `host` that already carries a scheme (`http://...`) is used as-is.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("{}://{}", self.scheme, host)
        }
    }

    /// Token rendered for logs: first four characters, rest elided.
    pub fn masked_token(&self) -> String {
        match self.token.char_indices().nth(4) {
            Some((idx, _)) => format!("{}…", &self.token[..idx]),
            None if self.token.is_empty() => "<unset>".to_string(),
            None => "…".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `sigfox-relay.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let mut config = if let Some(p) = path {
            Self::from_file(Path::new(p))?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    /// Parse a TOML document, filling omitted fields with defaults.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("THINGER_HOST") {
            self.platform.host = host;
        }
        if let Some(user) = lookup("THINGER_USER") {
            self.platform.user = user;
        }
        if let Some(plugin) = lookup("THINGER_PLUGIN") {
            self.platform.plugin = plugin;
        }
        if let Some(version) = lookup("THINGER_PLUGIN_VERSION") {
            self.platform.plugin_version = version;
        }
        if let Some(token) = lookup("THINGER_TOKEN_SIGFOX_PLUGIN") {
            self.platform.token = token;
        }
        if let Some(listen) = lookup("SIGFOX_RELAY_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(key) = lookup("SIGFOX_RELAY_API_KEY") {
            self.server.api_key = Some(key).filter(|k| !k.is_empty());
        }
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.platform.user.is_empty() {
            return Err("platform.user is empty (set THINGER_USER)".into());
        }
        if self.platform.token.is_empty() {
            return Err("platform.token is empty (set THINGER_TOKEN_SIGFOX_PLUGIN)".into());
        }
        if self.platform.host.is_empty() {
            return Err("platform.host is empty (set THINGER_HOST)".into());
        }
        if self.relay.max_attempts < 2 {
            return Err(format!(
                "relay.max_attempts must be at least 2, got {}",
                self.relay.max_attempts
            ));
        }
        Ok(())
    }
}
