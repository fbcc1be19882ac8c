//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /health`: liveness probe.
///
/// Reports version, uptime and whether auto-provisioning is currently on.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let settings = state.settings.snapshot().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "plugin": state.config.platform.plugin,
        "auto_provision": settings.auto_provision(),
    }))
}
