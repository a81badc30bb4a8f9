//! Bounded retry for special-capability launches.
//!
//! A special launch that fails is retried after a fixed short delay. With the
//! default policy that is exactly two attempts; after the last one the
//! capability goes through the coordinator's failure path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::capability::{Capability, RequestId};
use crate::error::LaunchError;
use crate::platform::{SpecialLauncher, guard_launch};
use crate::policy::ActivationDescriptor;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default fixed delay between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Retry policy for special launches.
///
/// # Examples
///
/// ```
/// use grantflow::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries, 1);
/// assert_eq!(policy.max_attempts(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    /// Fixed delay before each retry in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before attempt number `attempt` (0-based). The first attempt is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(self.delay_ms)
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// One special-capability launch, carried across retry attempts.
#[derive(Clone)]
pub struct SpecialDispatch {
    pub request_id: RequestId,
    pub capability: Capability,
    pub activation: ActivationDescriptor,
    pub launcher: Arc<dyn SpecialLauncher>,
    /// 0-based attempt counter.
    pub attempt: u32,
}

impl SpecialDispatch {
    pub fn new(
        request_id: RequestId,
        capability: Capability,
        activation: ActivationDescriptor,
        launcher: Arc<dyn SpecialLauncher>,
    ) -> Self {
        Self {
            request_id,
            capability,
            activation,
            launcher,
            attempt: 0,
        }
    }

    /// Run one launch attempt. A panicking launcher counts as a failed attempt.
    pub fn attempt(&self) -> Result<(), LaunchError> {
        guard_launch(|| self.launcher.launch(&self.request_id, &self.activation))
    }

    /// The same dispatch with the attempt counter advanced.
    #[must_use]
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

impl std::fmt::Debug for SpecialDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialDispatch")
            .field("request_id", &self.request_id)
            .field("capability", &self.capability)
            .field("activation", &self.activation)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}
