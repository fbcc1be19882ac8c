#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! # sigfox-relay
//!
//! Thinger plugin that relays Sigfox uplink callbacks to Thinger devices.
//!
//! Sigfox posts each uplink to `/callback/{device}`. The relay forwards the
//! body to the matching Thinger device callback. If the device does not exist
//! yet and `auto_provision_resources` is on, it creates the device, a bucket
//! and the callback binding, then forwards once more.
//!
//! ## API surface
//!
//! | Method  | Path                  | Auth   | Description                          |
//! |---------|-----------------------|--------|--------------------------------------|
//! | GET     | `/health`             | No     | Liveness probe                       |
//! | POST    | `/callback/{device}`  | No     | Uplink, hex device id in the path    |
//! | POST    | `/callback`           | No     | Uplink, device id in body `device`   |
//! | GET     | `/settings`           | Admin* | Current settings document            |
//! | PUT     | `/settings`           | Admin* | Replace settings document            |
//!
//! *Only when `server.api_key` is configured.
//!
//! ## Architecture
//!
//! ```text
//! main.rs        entry point, tracing, settings bootstrap, graceful shutdown
//! config.rs      TOML + env-var configuration
//! settings.rs    Settings document, id derivation, SettingsStore
//! platform.rs    Thinger REST client
//! provision.rs   per-device provisioning guard
//! relay.rs       forward / provision / retry orchestration
//! auth.rs        optional Bearer key for /settings
//! routes/        callback, settings, health handlers
//! ```

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use sigfox_relay::{platform::PlatformClient, routes, settings, AppState, Config};

/// Sigfox uplink relay for Thinger.
#[derive(Parser)]
#[command(name = "sigfox-relay", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("sigfox-relay: configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("sigfox-relay v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Platform: {}", config.platform.base_url());
    info!("User: {}", config.platform.user);
    info!(
        "Plugin: {} (version {})",
        config.platform.plugin,
        if config.platform.plugin_version.is_empty() {
            "unknown"
        } else {
            config.platform.plugin_version.as_str()
        }
    );
    info!("Token: {}", config.platform.masked_token());
    if config.server.api_key.is_none() {
        warn!("No server.api_key set, /settings is unauthenticated");
    }

    let platform = match PlatformClient::from_config(&config.platform) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to build platform client: {e}");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.server.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {e}", config.server.listen);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", config.server.listen);

    // Never fatal: falls back to auto-provisioning on
    let initial = settings::bootstrap(&platform, &config.platform.settings_property).await;

    let state = AppState::new(config, platform, initial);
    let app = routes::router(state);

    info!("Server ready");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Goodbye");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
