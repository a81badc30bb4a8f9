//! Capability classification.
//!
//! The coordinator asks a [`CapabilityClassifier`] how each not-yet-granted
//! capability is resolved: through the shared batch dialog, through its own
//! settings round trip, or not at all on this device.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, names};
use crate::policy::{self, SettingsActivationPolicy};

/// How a capability is resolved on the current device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    /// Resolved by the single batch dialog.
    Normal,
    /// Resolved by an individual settings round trip.
    Special,
    /// Cannot be requested here; always reported denied.
    Unsupported,
}

pub trait CapabilityClassifier: Send + Sync {
    fn classify(&self, capability: &Capability) -> CapabilityClass;
}

/// Default classification for Android-style capability names.
///
/// - Role identifiers and `MANAGE_MEDIA` are unsupported.
/// - Version-gated capabilities below their tier are unsupported.
/// - Members of the settings-action table are special.
/// - Everything else is normal.
#[derive(Debug, Clone)]
pub struct PlatformClassifier {
    platform_version: u32,
}

impl PlatformClassifier {
    pub fn new(platform_version: u32) -> Self {
        Self { platform_version }
    }
}

impl CapabilityClassifier for PlatformClassifier {
    fn classify(&self, capability: &Capability) -> CapabilityClass {
        let name = capability.as_str();
        if name.starts_with(names::ROLE_PREFIX) || name == names::MANAGE_MEDIA {
            return CapabilityClass::Unsupported;
        }
        // The identity is irrelevant for the version check.
        let gate = SettingsActivationPolicy::new(self.platform_version, "");
        if !gate.is_supported(capability) {
            return CapabilityClass::Unsupported;
        }
        if policy::is_special(capability) {
            CapabilityClass::Special
        } else {
            CapabilityClass::Normal
        }
    }
}
