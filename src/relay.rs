//! Uplink forwarding with on-demand provisioning.
//!
//! [`Relay::manage_device_callback`] forwards a Sigfox uplink to the device's
//! Thinger callback. When the platform rejects it (typically because the device
//! does not exist yet) and `auto_provision_resources` is on, the relay creates
//! the device, its bucket and the callback binding, then forwards again. The
//! number of forwards per uplink is capped by `relay.max_attempts`.
//!
//! ```text
//! Forwarding ──ok──────────────────────────────► Done
//!     │ platform error, auto-provision off ────► Done (suppressed)
//!     │ platform error, attempts left
//!     ▼
//! Provisioning ──create device/bucket, bind──► Forwarding (retry)
//!     │ any failure ─────────────────────────► Failed
//! transport error / attempts exhausted ──────► Failed
//! ```

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::platform::{PlatformClient, PlatformError};
use crate::provision::ProvisionLocks;
use crate::settings::SettingsStore;

/// How an uplink was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The platform accepted the payload.
    Forwarded { device_id: String, attempts: u32 },
    /// The platform rejected the payload and auto-provisioning is off; the
    /// uplink is dropped without failing the webhook.
    Suppressed { device_id: String, status: u16 },
}

/// Provisioning call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    CreateDevice,
    CreateBucket,
    SetDeviceCallback,
}

impl ProvisionStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateDevice => "create_device",
            Self::CreateBucket => "create_bucket",
            Self::SetDeviceCallback => "set_device_callback",
        }
    }
}

/// Why an uplink could not be delivered.
#[derive(Debug)]
pub enum RelayError {
    /// The forward call got no usable response from the platform.
    Transport {
        device_id: String,
        source: PlatformError,
    },
    /// A create or bind call failed while provisioning.
    Provisioning {
        device_id: String,
        step: ProvisionStep,
        source: PlatformError,
    },
    /// The platform kept rejecting the payload after provisioning.
    Exhausted {
        device_id: String,
        attempts: u32,
        status: u16,
    },
}

impl RelayError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_FAILED",
            Self::Provisioning { .. } => "PROVISIONING_FAILED",
            Self::Exhausted { .. } => "RETRY_EXHAUSTED",
        }
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { device_id, source } => {
                write!(f, "forwarding to device {device_id} failed: {source}")
            }
            Self::Provisioning {
                device_id,
                step,
                source,
            } => write!(
                f,
                "provisioning device {device_id} failed at {}: {source}",
                step.as_str()
            ),
            Self::Exhausted {
                device_id,
                attempts,
                status,
            } => write!(
                f,
                "device {device_id} still rejected (HTTP {status}) after {attempts} attempts"
            ),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } | Self::Provisioning { source, .. } => Some(source),
            Self::Exhausted { .. } => None,
        }
    }
}

/// Forwards uplinks and provisions missing platform resources.
pub struct Relay {
    platform: PlatformClient,
    settings: SettingsStore,
    locks: ProvisionLocks,
    max_attempts: u32,
}

impl Relay {
    pub fn new(platform: PlatformClient, settings: SettingsStore, max_attempts: u32) -> Self {
        Self {
            platform,
            settings,
            locks: ProvisionLocks::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Deliver `payload` for the Sigfox device `raw_id`.
    ///
    /// Each attempt works from one settings snapshot; a settings update takes
    /// effect from the next attempt.
    pub async fn manage_device_callback(
        &self,
        raw_id: &str,
        payload: &Value,
    ) -> Result<Delivery, RelayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let settings = self.settings.snapshot().await;
            let device_id = settings.device_id(raw_id);

            let err = match self.platform.call_device_callback(&device_id, payload).await {
                Ok(()) => {
                    info!(device_id = %device_id, attempt, "Uplink forwarded");
                    return Ok(Delivery::Forwarded {
                        device_id,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };
            let observed_at = Instant::now();

            let PlatformError::Platform { status, .. } = err else {
                error!(device_id = %device_id, "Uplink forward failed: {err}");
                return Err(RelayError::Transport {
                    device_id,
                    source: err,
                });
            };

            if !settings.auto_provision() {
                warn!(
                    device_id = %device_id,
                    status,
                    "Platform rejected uplink and auto-provisioning is off, dropping it"
                );
                return Ok(Delivery::Suppressed { device_id, status });
            }

            if attempt >= self.max_attempts {
                error!(
                    device_id = %device_id,
                    status,
                    attempts = attempt,
                    "Platform still rejects uplink after provisioning"
                );
                return Err(RelayError::Exhausted {
                    device_id,
                    attempts: attempt,
                    status,
                });
            }

            debug!(device_id = %device_id, status, "Platform rejected uplink: {err}");
            let bucket_id = settings.write_bucket_id(raw_id);
            self.provision(&device_id, &bucket_id, settings.timeout_secs(), observed_at)
                .await?;
        }
    }

    /// Create device and bucket and bind them, unless a concurrent request
    /// already did so after `observed_at`.
    async fn provision(
        &self,
        device_id: &str,
        bucket_id: &str,
        timeout_secs: u64,
        observed_at: Instant,
    ) -> Result<(), RelayError> {
        let mut permit = self.locks.acquire(device_id).await;
        if permit.provisioned_since(observed_at) {
            debug!(device_id, "Device provisioned by a concurrent request");
            Ok(())
        } else {
            let result = self.create_resources(device_id, bucket_id, timeout_secs).await;
            if result.is_ok() {
                permit.mark_provisioned();
            }
            result
        }
    }

    async fn create_resources(
        &self,
        device_id: &str,
        bucket_id: &str,
        timeout_secs: u64,
    ) -> Result<(), RelayError> {
        info!(device_id, bucket_id, "Auto-provisioning device");
        let failed = |step: ProvisionStep| {
            move |source: PlatformError| {
                error!(device_id, step = step.as_str(), "Provisioning failed: {source}");
                RelayError::Provisioning {
                    device_id: device_id.to_string(),
                    step,
                    source,
                }
            }
        };

        self.platform
            .create_device(device_id)
            .await
            .map_err(failed(ProvisionStep::CreateDevice))?;
        self.platform
            .create_bucket(bucket_id)
            .await
            .map_err(failed(ProvisionStep::CreateBucket))?;
        self.platform
            .set_device_callback(device_id, bucket_id, timeout_secs)
            .await
            .map_err(failed(ProvisionStep::SetDeviceCallback))?;

        info!(device_id, bucket_id, timeout_secs, "Device provisioned");
        Ok(())
    }
}
