//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::platform::PlatformClient;
use crate::relay::Relay;
use crate::settings::{Settings, SettingsStore};

/// Shared application state for the relay server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Run-time settings, replaced by `PUT /settings`.
    pub settings: SettingsStore,
    /// Uplink orchestrator; shares `settings` with this state.
    pub relay: Arc<Relay>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, platform: PlatformClient, settings: Settings) -> Self {
        let settings = SettingsStore::new(settings);
        let relay = Relay::new(platform, settings.clone(), config.relay.max_attempts);
        Self {
            config: Arc::new(config),
            settings,
            relay: Arc::new(relay),
            start_time: Instant::now(),
        }
    }
}
