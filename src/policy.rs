//! Activation policy for special capabilities.
//!
//! Special capabilities are granted on a settings screen rather than through
//! the batch dialog. [`SettingsActivationPolicy`] maps each one to the settings
//! action that opens that screen, gated by the minimum platform version where
//! the capability exists at all. Some screens are scoped to the calling
//! application and need an identity argument (`package:<app>`).

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, names};

/// Platform version tiers that gate capabilities introduced late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionTier {
    /// Android 11.
    R,
    /// Android 12.
    S,
    /// Android 13.
    Tiramisu,
}

impl VersionTier {
    /// Minimum platform version (API level) for this tier.
    pub fn min_version(self) -> u32 {
        match self {
            Self::R => 30,
            Self::S => 31,
            Self::Tiramisu => 33,
        }
    }
}

/// What the host needs to start a special-capability round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationDescriptor {
    /// Settings action to open.
    pub action: String,
    /// Application-scoped URI (`package:<app_identity>`) when the screen needs one.
    pub identity_uri: Option<String>,
}

/// Maps a special capability to its activation, if the device supports it.
pub trait ActivationPolicy: Send + Sync {
    fn build_activation(&self, capability: &Capability) -> Option<ActivationDescriptor>;
}

struct SpecialEntry {
    capability: &'static str,
    action: &'static str,
    needs_identity: bool,
}

const SPECIAL_ACTIONS: &[SpecialEntry] = &[
    SpecialEntry {
        capability: names::SYSTEM_ALERT_WINDOW,
        action: "android.settings.action.MANAGE_OVERLAY_PERMISSION",
        needs_identity: true,
    },
    SpecialEntry {
        capability: names::WRITE_SETTINGS,
        action: "android.settings.action.MANAGE_WRITE_SETTINGS",
        needs_identity: true,
    },
    SpecialEntry {
        capability: names::PACKAGE_USAGE_STATS,
        action: "android.settings.USAGE_ACCESS_SETTINGS",
        needs_identity: false,
    },
    SpecialEntry {
        capability: names::BIND_ACCESSIBILITY_SERVICE,
        action: "android.settings.ACCESSIBILITY_SETTINGS",
        needs_identity: false,
    },
    SpecialEntry {
        capability: names::REQUEST_INSTALL_PACKAGES,
        action: "android.settings.MANAGE_UNKNOWN_APP_SOURCES",
        needs_identity: true,
    },
    SpecialEntry {
        capability: names::ACCESS_NOTIFICATION_POLICY,
        action: "android.settings.NOTIFICATION_POLICY_ACCESS_SETTINGS",
        needs_identity: false,
    },
    SpecialEntry {
        capability: names::BIND_NOTIFICATION_LISTENER_SERVICE,
        action: "android.settings.ACTION_NOTIFICATION_LISTENER_SETTINGS",
        needs_identity: false,
    },
    SpecialEntry {
        capability: names::REQUEST_IGNORE_BATTERY_OPTIMIZATIONS,
        action: "android.settings.REQUEST_IGNORE_BATTERY_OPTIMIZATIONS",
        needs_identity: true,
    },
    SpecialEntry {
        capability: names::SCHEDULE_EXACT_ALARM,
        action: "android.settings.REQUEST_SCHEDULE_EXACT_ALARM",
        needs_identity: false,
    },
    SpecialEntry {
        capability: names::MANAGE_EXTERNAL_STORAGE,
        action: "android.settings.MANAGE_APP_ALL_FILES_ACCESS_PERMISSION",
        needs_identity: true,
    },
];

/// Version tier a capability first appeared in, if it is gated.
pub fn required_tier(capability: &Capability) -> Option<VersionTier> {
    match capability.as_str() {
        names::MANAGE_EXTERNAL_STORAGE => Some(VersionTier::R),
        names::SCHEDULE_EXACT_ALARM => Some(VersionTier::S),
        names::POST_NOTIFICATIONS => Some(VersionTier::Tiramisu),
        _ => None,
    }
}

/// Whether `capability` is in the special (settings round trip) table.
pub fn is_special(capability: &Capability) -> bool {
    SPECIAL_ACTIONS
        .iter()
        .any(|e| e.capability == capability.as_str())
}

/// Static settings-action table for one device.
#[derive(Debug, Clone)]
pub struct SettingsActivationPolicy {
    platform_version: u32,
    app_identity: String,
}

impl SettingsActivationPolicy {
    pub fn new(platform_version: u32, app_identity: impl Into<String>) -> Self {
        Self {
            platform_version,
            app_identity: app_identity.into(),
        }
    }

    pub fn platform_version(&self) -> u32 {
        self.platform_version
    }

    /// Whether the device meets the capability's version tier (ungated ones always do).
    pub fn is_supported(&self, capability: &Capability) -> bool {
        required_tier(capability).is_none_or(|tier| self.platform_version >= tier.min_version())
    }
}

impl ActivationPolicy for SettingsActivationPolicy {
    fn build_activation(&self, capability: &Capability) -> Option<ActivationDescriptor> {
        if !self.is_supported(capability) {
            return None;
        }
        let entry = SPECIAL_ACTIONS
            .iter()
            .find(|e| e.capability == capability.as_str())?;
        Some(ActivationDescriptor {
            action: entry.action.to_owned(),
            identity_uri: entry
                .needs_identity
                .then(|| format!("package:{}", self.app_identity)),
        })
    }
}
