//! Settings endpoints.
//!
//! - `GET /settings`: current settings document
//! - `PUT /settings`: replace the whole document
//!
//! Both go through [`crate::auth::require_admin_key`].

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::settings::Settings;
use crate::AppState;

/// `GET /settings`: return the settings snapshot in use.
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.snapshot().await.as_ref().clone())
}

/// `PUT /settings`: replace the settings wholesale with the request body.
///
/// The body is stored as sent: keys missing from it revert to their defaults,
/// nothing is merged and no key is type-checked. Only a body that is not JSON
/// is rejected, by the extractor.
pub async fn put_settings(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Json<Value> {
    info!(settings = %document, "Settings updated");
    state.settings.replace(Settings::from(document)).await;
    Json(json!({"status": "ok"}))
}
