//! Boundary traits for the collaborators the coordinator consumes.
//!
//! The coordinator owns no platform code. Everything that touches real dialogs
//! or settings screens sits behind these traits and is supplied by the host
//! application (or by test doubles).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::capability::{Capability, RequestId};
use crate::error::LaunchError;
use crate::policy::ActivationDescriptor;

/// Live grant-state oracle.
pub trait GrantOracle: Send + Sync {
    /// Whether `capability` is granted right now.
    fn is_granted(&self, capability: &Capability) -> bool;

    /// The subset of `capabilities` that is not granted, in input order.
    fn remaining(&self, capabilities: &[Capability]) -> Vec<Capability> {
        capabilities
            .iter()
            .filter(|c| !self.is_granted(c))
            .cloned()
            .collect()
    }
}

/// The UI container a request was submitted from.
///
/// The pending request only holds a weak reference to its host; a dropped host
/// is treated exactly like one that reports [`is_torn_down`](Self::is_torn_down).
pub trait HostContext: Send + Sync {
    /// Whether the container has been destroyed or is finishing.
    fn is_torn_down(&self) -> bool;

    /// Start the single batch dialog for all normal capabilities.
    ///
    /// The result must later be reported through
    /// [`on_batch_result`](crate::coordinator::PermissionCoordinator::on_batch_result).
    fn launch_batch(
        &self,
        request_id: &RequestId,
        capabilities: &[Capability],
    ) -> Result<(), LaunchError>;
}

/// Starts one special-capability settings round trip.
pub trait SpecialLauncher: Send + Sync {
    fn launch(
        &self,
        request_id: &RequestId,
        activation: &ActivationDescriptor,
    ) -> Result<(), LaunchError>;
}

impl<F> SpecialLauncher for F
where
    F: Fn(&RequestId, &ActivationDescriptor) -> Result<(), LaunchError> + Send + Sync,
{
    fn launch(
        &self,
        request_id: &RequestId,
        activation: &ActivationDescriptor,
    ) -> Result<(), LaunchError> {
        self(request_id, activation)
    }
}

/// Supplies launchers on demand for one request's special capabilities.
///
/// Registered weakly in the [`DelegateRegistry`](crate::registry::DelegateRegistry):
/// the UI owner keeps the only strong reference.
pub trait LauncherProvider: Send + Sync {
    /// The launcher able to start the round trip for `capability`, if any.
    fn special_launcher(&self, capability: &Capability) -> Option<Arc<dyn SpecialLauncher>>;
}

/// Run one host launch call, reporting a panic as [`LaunchError::Rejected`].
pub(crate) fn guard_launch(
    launch: impl FnOnce() -> Result<(), LaunchError>,
) -> Result<(), LaunchError> {
    catch_unwind(AssertUnwindSafe(launch)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Err(LaunchError::Rejected(format!("launcher panicked: {detail}")))
    })
}
