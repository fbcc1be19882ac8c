//! HTTP client for the Thinger platform REST API.
//!
//! [`PlatformClient`] wraps `reqwest::Client` and provides one method per
//! platform endpoint the relay uses. Every request carries the plugin token as
//! `Authorization: Bearer <token>`.
//!
//! ## Endpoints
//!
//! | Method | Path                                                | Used for                 |
//! |--------|-----------------------------------------------------|--------------------------|
//! | POST   | `/v1/users/{user}/devices`                          | create device            |
//! | POST   | `/v1/users/{user}/buckets`                          | create bucket            |
//! | PUT    | `/v3/users/{user}/devices/{device}/callback`        | bind callback to bucket  |
//! | POST   | `/v3/users/{user}/devices/{device}/callback`        | forward uplink payload   |
//! | POST   | `/v3/users/{user}/devices/{device}/properties`      | set device properties    |
//! | GET    | `/v1/users/{user}/plugins/{plugin}/properties/{name}` | read plugin property   |
//!
//! ## Error handling
//!
//! Non-2xx responses become [`PlatformError::Platform`], with the message taken
//! from an `error` or `message` field of a JSON body when present, or the raw
//! body otherwise. Anything that prevents reading a response is
//! [`PlatformError::Request`].

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::config::PlatformConfig;

/// Device type assigned to auto-provisioned devices.
pub const DEVICE_TYPE: &str = "HTTP";
/// Description attached to auto-provisioned devices.
pub const DEVICE_DESCRIPTION: &str = "Auto provisioned Sigfox Device";
/// Description attached to auto-provisioned buckets.
pub const BUCKET_DESCRIPTION: &str = "Auto provisioned Sigfox Bucket";

/// HTTP client bound to one Thinger user and plugin.
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    plugin: String,
    token: String,
}

impl PlatformClient {
    /// Build a client from the `[platform]` configuration section.
    pub fn from_config(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(PlatformError::Request)?;
        Ok(Self::with_http(
            http,
            config.base_url(),
            config.user.clone(),
            config.plugin.clone(),
            config.token.clone(),
        ))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http(
        http: reqwest::Client,
        base_url: String,
        user: String,
        plugin: String,
        token: String,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            user,
            plugin,
            token,
        }
    }

    /// `POST /v1/users/{user}/devices`: create an HTTP device.
    ///
    /// A `409 Conflict` means the device already exists and is treated as success.
    pub async fn create_device(&self, device_id: &str) -> Result<(), PlatformError> {
        let body = json!({
            "device_id": device_id,
            "device_type": DEVICE_TYPE,
            "device_description": DEVICE_DESCRIPTION,
        });
        let url = format!("{}/v1/users/{}/devices", self.base_url, self.user);
        accept_conflict(Self::send(self.request(Method::POST, url).json(&body)).await)
    }

    /// `POST /v1/users/{user}/buckets`: create an enabled, API-fed bucket.
    ///
    /// A `409 Conflict` means the bucket already exists and is treated as success.
    pub async fn create_bucket(&self, bucket_id: &str) -> Result<(), PlatformError> {
        let body = json!({
            "bucket": bucket_id,
            "name": bucket_id,
            "description": BUCKET_DESCRIPTION,
            "enabled": true,
            "source": "api",
        });
        let url = format!("{}/v1/users/{}/buckets", self.base_url, self.user);
        accept_conflict(Self::send(self.request(Method::POST, url).json(&body)).await)
    }

    /// `PUT /v3/users/{user}/devices/{device}/callback`: route the device's
    /// callback writes into `write_bucket`.
    pub async fn set_device_callback(
        &self,
        device_id: &str,
        write_bucket: &str,
        timeout_secs: u64,
    ) -> Result<(), PlatformError> {
        let body = json!({
            "actions": { "write_bucket": write_bucket },
            "properties": { "timeout": timeout_secs },
        });
        Self::send(self.request(Method::PUT, self.callback_url(device_id)).json(&body))
            .await
            .map(drop)
    }

    /// `POST /v3/users/{user}/devices/{device}/callback`: forward an uplink payload.
    pub async fn call_device_callback(
        &self,
        device_id: &str,
        payload: &Value,
    ) -> Result<(), PlatformError> {
        Self::send(self.request(Method::POST, self.callback_url(device_id)).json(payload))
            .await
            .map(drop)
    }

    /// `POST /v3/users/{user}/devices/{device}/properties`: set device properties.
    pub async fn set_device_properties(
        &self,
        device_id: &str,
        properties: &[Value],
    ) -> Result<(), PlatformError> {
        let url = format!(
            "{}/v3/users/{}/devices/{}/properties",
            self.base_url, self.user, device_id
        );
        Self::send(self.request(Method::POST, url).json(properties))
            .await
            .map(drop)
    }

    /// `GET /v1/users/{user}/plugins/{plugin}/properties/{name}`: read a
    /// plugin-scoped property. The platform answers `{"value": ...}`.
    pub async fn get_plugin_property(&self, name: &str) -> Result<Value, PlatformError> {
        let url = format!(
            "{}/v1/users/{}/plugins/{}/properties/{}",
            self.base_url, self.user, self.plugin, name
        );
        let body = Self::send(self.request(Method::GET, url)).await?;
        serde_json::from_str(&body)
            .map_err(|e| PlatformError::Protocol(format!("Invalid JSON for property {name}: {e}")))
    }

    fn callback_url(&self, device_id: &str) -> String {
        format!(
            "{}/v3/users/{}/devices/{}/callback",
            self.base_url, self.user, device_id
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
    }

    /// Send a request and return the response body on 2xx.
    async fn send(builder: RequestBuilder) -> Result<String, PlatformError> {
        let resp = builder.send().await.map_err(PlatformError::Request)?;
        let status = resp.status();
        let body = resp.text().await.map_err(PlatformError::Request)?;

        if status.is_success() {
            return Ok(body);
        }

        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or(body);
        Err(PlatformError::Platform {
            status: status.as_u16(),
            message,
        })
    }
}

/// Thinger reports errors either as `{"error": "..."}` or
/// `{"error": {"message": "..."}}`.
fn error_message(body: &Value) -> Option<String> {
    match &body["error"] {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(String::from),
        _ => body["message"].as_str().map(String::from),
    }
}

fn accept_conflict(result: Result<String, PlatformError>) -> Result<(), PlatformError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_conflict() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Errors returned by [`PlatformClient`] methods.
#[derive(Debug)]
pub enum PlatformError {
    /// No usable response (connection refused, timeout, DNS failure, body read).
    Request(reqwest::Error),
    /// The platform answered with a non-2xx HTTP status.
    Platform { status: u16, message: String },
    /// A 2xx response whose body was not the expected JSON.
    Protocol(String),
}

impl PlatformError {
    /// HTTP status of a platform response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::Platform { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for `409 Conflict` (resource already exists).
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT.as_u16())
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::Request(e) => write!(f, "platform request failed: {e}"),
            PlatformError::Platform { status, message } => {
                write!(f, "platform error (HTTP {status}): {message}")
            }
            PlatformError::Protocol(msg) => write!(f, "platform protocol error: {msg}"),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlatformError::Request(e) => Some(e),
            _ => None,
        }
    }
}
