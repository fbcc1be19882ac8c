//! Sigfox uplink endpoints.
//!
//! - `POST /callback/{device_id}`: device id in the path
//! - `POST /callback`: device id in the body's `device` field (Sigfox's
//!   default callback template)
//!
//! Device ids are Sigfox hex ids (`[0-9a-fA-F]+`). The body is forwarded to
//! the platform unchanged.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::relay::Delivery;
use crate::AppState;

type ApiError = (StatusCode, Json<Value>);

/// Whether `id` looks like a Sigfox device id.
pub fn is_sigfox_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `POST /callback/{device_id}`: forward an uplink for the device in the path.
///
/// # Errors
///
/// - `404 Not Found`: `device_id` is not hex
/// - `500 Internal Server Error`: see [`relay_uplink`]
pub async fn device_callback(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !is_sigfox_id(&device_id) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not found", "code": "NOT_FOUND"})),
        ));
    }
    relay_uplink(&state, &device_id, &payload).await
}

/// `POST /callback`: forward an uplink whose device id is in `payload.device`.
///
/// # Errors
///
/// - `400 Bad Request` with `{"code":"INVALID_DEVICE"}`: `device` missing or not hex
/// - `500 Internal Server Error`: see [`relay_uplink`]
pub async fn callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let Some(device_id) = payload
        .get("device")
        .and_then(Value::as_str)
        .filter(|d| is_sigfox_id(d))
        .map(String::from)
    else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Body must carry a hex device id in `device`",
                "code": "INVALID_DEVICE",
            })),
        ));
    };
    relay_uplink(&state, &device_id, &payload).await
}

/// Run the uplink through the relay and shape the HTTP response.
///
/// A policy-suppressed uplink still answers 200 so Sigfox does not retry it.
/// Every relay error answers 500 with `{"error", "code"}`, `code` being one of
/// `TRANSPORT_FAILED`, `PROVISIONING_FAILED` or `RETRY_EXHAUSTED`.
async fn relay_uplink(
    state: &AppState,
    device_id: &str,
    payload: &Value,
) -> Result<Json<Value>, ApiError> {
    info!(device_id, "Callback received");
    debug!(device_id, %payload, "Callback payload");

    match state.relay.manage_device_callback(device_id, payload).await {
        Ok(Delivery::Forwarded {
            device_id,
            attempts,
        }) => Ok(Json(json!({
            "status": "forwarded",
            "device_id": device_id,
            "attempts": attempts,
        }))),
        Ok(Delivery::Suppressed { device_id, status }) => Ok(Json(json!({
            "status": "suppressed",
            "device_id": device_id,
            "platform_status": status,
        }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string(), "code": e.code()})),
        )),
    }
}
