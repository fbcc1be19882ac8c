#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]

//! sigfox-relay library: the building blocks behind the `sigfox-relay` binary.
//!
//! - `config`: TOML + env-var process configuration
//! - `settings`: run-time settings document and its in-memory store
//! - `platform`: Thinger REST client
//! - `provision`: per-device provisioning guard
//! - `relay`: uplink forwarding with auto-provisioning
//! - `auth`: optional admin key middleware
//! - `routes`: HTTP route handlers and router

pub mod auth;
pub mod config;
pub mod platform;
pub mod provision;
pub mod relay;
pub mod routes;
pub mod settings;
pub mod state;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use platform::{PlatformClient, PlatformError};
pub use relay::{Delivery, Relay, RelayError};
pub use settings::{Settings, SettingsStore};
pub use state::AppState;
