//! Per-device provisioning guard.
//!
//! Several uplinks from a brand-new device can arrive at once, and each of them
//! sees the platform answer "not found". [`ProvisionLocks`] serializes the
//! provisioning work per outbound device id and remembers when it last
//! completed, so requests that queued behind a successful run skip straight to
//! their retry instead of creating the same resources again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<Instant>>>;
type Slots = Arc<SyncMutex<HashMap<String, Slot>>>;

/// Keyed map of provisioning slots, one per device currently being provisioned.
#[derive(Default)]
pub struct ProvisionLocks {
    slots: Slots,
}

/// Exclusive hold on one device's provisioning slot.
///
/// Dropping the permit, on any path including a cancelled request, releases
/// the slot and removes it from the map once nobody else is waiting on it.
pub struct ProvisionPermit {
    key: String,
    slot: Slot,
    slots: Slots,
    guard: Option<OwnedMutexGuard<Option<Instant>>>,
}

impl ProvisionPermit {
    /// Whether a provisioning run finished at or after `observed_at`, i.e. the
    /// "not found" seen at that instant has already been dealt with.
    pub fn provisioned_since(&self, observed_at: Instant) -> bool {
        self.guard
            .as_deref()
            .copied()
            .flatten()
            .is_some_and(|done| done >= observed_at)
    }

    /// Record a completed provisioning run.
    pub fn mark_provisioned(&mut self) {
        if let Some(guard) = self.guard.as_mut() {
            **guard = Some(Instant::now());
        }
    }
}

impl Drop for ProvisionPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // map + this handle; waiters hold further clones
        let idle = Arc::strong_count(&self.slot) <= 2;
        if idle && slots.get(&self.key).is_some_and(|s| Arc::ptr_eq(s, &self.slot)) {
            slots.remove(&self.key);
        }
    }
}

impl ProvisionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the slot for `key`.
    pub async fn acquire(&self, key: &str) -> ProvisionPermit {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_string()).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        ProvisionPermit {
            key: key.to_string(),
            slot,
            slots: self.slots.clone(),
            guard: Some(guard),
        }
    }

    /// Number of devices with a live slot.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
