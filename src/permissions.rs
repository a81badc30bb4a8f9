//! Live grant store.
//!
//! [`GrantStore`] tracks which capabilities are currently granted. Hosts that
//! mirror the platform's grant state into memory (or tests that script it)
//! share one store behind a [`SharedGrantStore`] and hand it to the
//! coordinator as its [`GrantOracle`].
//!
//! ## Live semantics
//!
//! [`SharedGrantStore`] is an `Arc<Mutex<GrantStore>>`. A grant applied
//! through any clone is visible to the coordinator's next live check, which is
//! what the batch double-check and the special-path re-derivation rely on.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::capability::Capability;
use crate::platform::GrantOracle;

/// A thread-safe, live-view grant store.
pub type SharedGrantStore = Arc<Mutex<GrantStore>>;

/// A single grant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    /// Which capability this record covers.
    pub capability: Capability,
    /// Whether the capability is currently granted.
    pub granted: bool,
    /// Epoch seconds when the grant was last applied.
    pub granted_at: Option<u64>,
}

/// In-memory store of grant records, serializable for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantStore {
    #[serde(default)]
    grants: Vec<GrantRecord>,
}

impl GrantStore {
    /// Read-only access to the underlying records.
    pub fn grants(&self) -> &[GrantRecord] {
        &self.grants
    }

    /// Convert this store into a [`SharedGrantStore`].
    #[must_use]
    pub fn into_shared(self) -> SharedGrantStore {
        Arc::new(Mutex::new(self))
    }

    /// Create an empty [`SharedGrantStore`].
    #[must_use]
    pub fn default_shared() -> SharedGrantStore {
        Self::default().into_shared()
    }

    pub fn is_granted(&self, capability: &Capability) -> bool {
        self.grants
            .iter()
            .find(|g| &g.capability == capability)
            .is_some_and(|g| g.granted)
    }

    /// Grant a capability, updating the timestamp.
    ///
    /// Existing records are updated in place; otherwise a new record is appended.
    pub fn grant(&mut self, capability: impl Into<Capability>) {
        let capability = capability.into();
        let now = epoch_seconds();
        if let Some(existing) = self.grants.iter_mut().find(|g| g.capability == capability) {
            existing.granted = true;
            existing.granted_at = Some(now);
        } else {
            self.grants.push(GrantRecord {
                capability,
                granted: true,
                granted_at: Some(now),
            });
        }
    }

    /// Deny (revoke) a capability.
    pub fn deny(&mut self, capability: impl Into<Capability>) {
        let capability = capability.into();
        if let Some(existing) = self.grants.iter_mut().find(|g| g.capability == capability) {
            existing.granted = false;
        } else {
            self.grants.push(GrantRecord {
                capability,
                granted: false,
                granted_at: None,
            });
        }
    }

    /// Return all currently granted capabilities.
    pub fn all_granted(&self) -> Vec<Capability> {
        self.grants
            .iter()
            .filter(|g| g.granted)
            .map(|g| g.capability.clone())
            .collect()
    }
}

impl GrantOracle for Mutex<GrantStore> {
    fn is_granted(&self, capability: &Capability) -> bool {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_granted(capability)
    }
}

/// Current epoch time in seconds (0 on clock error).
fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
