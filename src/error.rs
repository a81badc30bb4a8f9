//! Error types for grantflow.
//!
//! The coordinator itself never surfaces these to its callers: every failure
//! inside a dispatch sequence degrades to a denial outcome. They appear at the
//! edges instead, in configuration loading and in the launcher contracts that
//! hosts implement.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or unreadable configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Filesystem error while loading or saving state.
    pub const IO_ERROR: &str = "IO_ERROR";

    /// Serialization of a snapshot or store failed.
    pub const SERIALIZATION_FAILED: &str = "SERIALIZATION_FAILED";

    /// The host refused to start a round trip.
    pub const LAUNCH_REJECTED: &str = "LAUNCH_REJECTED";

    /// The host (or its UI container) is no longer able to launch anything.
    pub const HOST_UNAVAILABLE: &str = "HOST_UNAVAILABLE";
}

/// Top-level error type for grantflow.
#[derive(Debug, thiserror::Error)]
pub enum GrantflowError {
    /// Configuration error.
    #[error("[{}] config error: {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// I/O error.
    #[error("[{}] I/O error: {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("[{}] serialization error: {}", error_codes::SERIALIZATION_FAILED, .0)]
    Serialization(String),
}

impl GrantflowError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Serialization(_) => error_codes::SERIALIZATION_FAILED,
        }
    }
}

/// Failure reported by a host when a platform round trip could not be started.
///
/// Returned by [`HostContext::launch_batch`](crate::platform::HostContext::launch_batch)
/// and [`SpecialLauncher::launch`](crate::platform::SpecialLauncher::launch).
/// Special launches that fail are retried once before the request moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// The platform rejected the launch (e.g. no activity could handle it).
    #[error("[{}] launch rejected: {}", error_codes::LAUNCH_REJECTED, .0)]
    Rejected(String),

    /// The host cannot launch right now (detached, finishing, not attached).
    #[error("[{}] host unavailable: {}", error_codes::HOST_UNAVAILABLE, .0)]
    HostUnavailable(String),
}

impl LaunchError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => error_codes::LAUNCH_REJECTED,
            Self::HostUnavailable(_) => error_codes::HOST_UNAVAILABLE,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GrantflowError>;
