//! Run-time relay settings.
//!
//! Settings live on the Thinger platform as a plugin property and are pushed
//! to the relay through `PUT /settings`. The relay only keeps the latest
//! snapshot in memory: [`SettingsStore::replace`] swaps the whole document,
//! there is no merge.
//!
//! The document is kept exactly as received and recognized keys are read
//! leniently, so a loosely typed update still takes effect:
//!
//! | Key                         | Accepted values                     | Default |
//! |-----------------------------|-------------------------------------|---------|
//! | `device_id_prefix`          | string or number                    | none    |
//! | `bucket_id_prefix`          | string or number                    | none    |
//! | `device_connection_timeout` | positive number or numeric string   | 10      |
//! | `auto_provision_resources`  | any truthy value                    | false   |
//!
//! Falsy values are `false`, `null`, `0` and `""`. Any other key is kept
//! verbatim and echoed back by `GET /settings`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::platform::{PlatformClient, PlatformError};

/// Device callback timeout used when none is configured.
pub const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 10;

/// One complete settings document, stored as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Value);

impl Default for Settings {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl From<Value> for Settings {
    fn from(document: Value) -> Self {
        Self(document)
    }
}

impl Settings {
    /// Settings used when the stored property cannot be read at startup, so a
    /// fresh install provisions devices on first contact.
    pub fn bootstrap_fallback() -> Self {
        Self(json!({"auto_provision_resources": true}))
    }

    /// The raw document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Outbound Thinger device id for a raw Sigfox id.
    pub fn device_id(&self, raw: &str) -> String {
        with_prefix(self.prefix("device_id_prefix"), raw)
    }

    /// Bucket id for a raw Sigfox id.
    pub fn bucket_id(&self, raw: &str) -> String {
        with_prefix(self.prefix("bucket_id_prefix"), raw)
    }

    /// Bucket an auto-provisioned device writes into: the prefixed bucket id
    /// when a bucket prefix is set, otherwise the device's own outbound id.
    ///
    /// Without a bucket prefix this departs from naming the bucket after the
    /// raw id: the bucket follows the device id, so a device prefix also
    /// namespaces its bucket (`sig-1A2B3C`, not `1A2B3C`).
    pub fn write_bucket_id(&self, raw: &str) -> String {
        if self.prefix("bucket_id_prefix").is_some() {
            self.bucket_id(raw)
        } else {
            self.device_id(raw)
        }
    }

    /// Device callback timeout in seconds. Fractions round up; zero, negative
    /// or non-numeric values count as unset.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn timeout_secs(&self) -> u64 {
        let secs = match self.0.get("device_connection_timeout") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        secs.filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t.ceil() as u64)
            .unwrap_or(DEFAULT_DEVICE_TIMEOUT_SECS)
    }

    pub fn auto_provision(&self) -> bool {
        self.0.get("auto_provision_resources").is_some_and(truthy)
    }

    fn prefix(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            number @ Value::Number(n) if truthy(number) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn with_prefix(prefix: Option<String>, raw: &str) -> String {
    match prefix {
        Some(p) => format!("{p}{raw}"),
        None => raw.to_string(),
    }
}

/// Process-wide settings holder shared by every request.
///
/// Readers get an immutable [`Arc<Settings>`] snapshot, so a concurrent
/// `replace` never produces a half-updated view.
#[derive(Clone, Default)]
pub struct SettingsStore {
    current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Current settings snapshot.
    pub async fn snapshot(&self) -> Arc<Settings> {
        self.current.read().await.clone()
    }

    /// Replace the whole settings document (last writer wins).
    pub async fn replace(&self, settings: Settings) {
        *self.current.write().await = Arc::new(settings);
    }
}

/// Read the settings document stored in plugin property `property`.
///
/// The platform wraps the document as `{"value": {...}}`.
pub async fn fetch(client: &PlatformClient, property: &str) -> Result<Settings, PlatformError> {
    let mut body = client.get_plugin_property(property).await?;
    let value = body
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| PlatformError::Protocol(format!("property {property} has no value")))?;
    Ok(Settings::from(value))
}

/// Startup hydration: fetch stored settings, or fall back to
/// [`Settings::bootstrap_fallback`] and log why.
pub async fn bootstrap(client: &PlatformClient, property: &str) -> Settings {
    match fetch(client, property).await {
        Ok(settings) => {
            info!(settings = %settings.as_value(), "Read settings from plugin property {property}");
            settings
        }
        Err(e) => {
            error!("Failed to read settings property {property}: {e}");
            info!("Falling back to auto-provisioning enabled");
            Settings::bootstrap_fallback()
        }
    }
}
