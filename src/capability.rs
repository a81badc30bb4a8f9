//! Capability identifiers and request ids.
//!
//! A [`Capability`] is an opaque platform permission name (for Android, the
//! manifest permission string). The coordinator never interprets it beyond
//! equality; classification and activation lookup are delegated to the
//! [`classifier`](crate::classifier) and [`policy`](crate::policy) modules.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Well-known capability names used by the default classifier and policy.
pub mod names {
    pub const CAMERA: &str = "android.permission.CAMERA";
    pub const RECORD_AUDIO: &str = "android.permission.RECORD_AUDIO";
    pub const ACCESS_FINE_LOCATION: &str = "android.permission.ACCESS_FINE_LOCATION";
    pub const READ_CONTACTS: &str = "android.permission.READ_CONTACTS";
    pub const POST_NOTIFICATIONS: &str = "android.permission.POST_NOTIFICATIONS";

    pub const SYSTEM_ALERT_WINDOW: &str = "android.permission.SYSTEM_ALERT_WINDOW";
    pub const WRITE_SETTINGS: &str = "android.permission.WRITE_SETTINGS";
    pub const PACKAGE_USAGE_STATS: &str = "android.permission.PACKAGE_USAGE_STATS";
    pub const BIND_ACCESSIBILITY_SERVICE: &str = "android.permission.BIND_ACCESSIBILITY_SERVICE";
    pub const REQUEST_INSTALL_PACKAGES: &str = "android.permission.REQUEST_INSTALL_PACKAGES";
    pub const ACCESS_NOTIFICATION_POLICY: &str = "android.permission.ACCESS_NOTIFICATION_POLICY";
    pub const BIND_NOTIFICATION_LISTENER_SERVICE: &str =
        "android.permission.BIND_NOTIFICATION_LISTENER_SERVICE";
    pub const REQUEST_IGNORE_BATTERY_OPTIMIZATIONS: &str =
        "android.permission.REQUEST_IGNORE_BATTERY_OPTIMIZATIONS";
    pub const SCHEDULE_EXACT_ALARM: &str = "android.permission.SCHEDULE_EXACT_ALARM";
    pub const MANAGE_EXTERNAL_STORAGE: &str = "android.permission.MANAGE_EXTERNAL_STORAGE";
    pub const MANAGE_MEDIA: &str = "android.permission.MANAGE_MEDIA";

    /// Prefix shared by role identifiers (e.g. `android.app.role.SMS`).
    pub const ROLE_PREFIX: &str = "android.app.role.";
}

/// A platform capability (permission) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build a capability list from anything string-like.
///
/// ```
/// use grantflow::capability::{capabilities, names};
///
/// let caps = capabilities([names::CAMERA, names::SYSTEM_ALERT_WINDOW]);
/// assert_eq!(caps.len(), 2);
/// ```
pub fn capabilities<I, S>(items: I) -> Vec<Capability>
where
    I: IntoIterator<Item = S>,
    S: Into<Capability>,
{
    items.into_iter().map(Into::into).collect()
}

/// Remove duplicates while keeping the first occurrence of each capability.
pub fn dedup_preserving_order(caps: Vec<Capability>) -> Vec<Capability> {
    let mut seen = HashSet::with_capacity(caps.len());
    caps.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

/// Opaque identifier correlating every round-trip result with its request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id.
    ///
    /// UI owners that need to register a launcher provider before submitting
    /// generate the id up front and pass it to
    /// [`submit_with_id`](crate::coordinator::PermissionCoordinator::submit_with_id).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
