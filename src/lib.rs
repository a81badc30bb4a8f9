//! grantflow: runtime permission-request coordination.
//!
//! This crate turns "ask for capability X" requests into the sequence of
//! platform round trips needed to resolve them:
//! Submit → Batch dialog → Settings round trips (one at a time) → Outcome
//!
//! # Architecture
//!
//! The coordinator owns no platform code. Hosts plug in through traits:
//! - **Grant oracle**: live "is this granted right now" checks (`GrantStore` ships as one)
//! - **Classifier**: normal, special or unsupported on this device
//! - **Activation policy**: settings action per special capability, version gated
//! - **Host context**: launches the batch dialog and reports teardown
//! - **Launcher providers**: registered weakly per request, start settings round trips
//! - **Clock / scheduler**: retry delay and the expiry sweep, on tokio or host-driven

pub mod capability;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod permissions;
pub mod platform;
pub mod policy;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod timer;

pub use capability::{Capability, RequestId};
pub use classifier::{CapabilityClass, CapabilityClassifier, PlatformClassifier};
pub use config::CoordinatorConfig;
pub use coordinator::{
    CompletionReason, JoinResult, PermissionCoordinator, RequestOutcome, outcome_channel,
};
pub use error::{GrantflowError, LaunchError, Result};
pub use permissions::{GrantStore, SharedGrantStore};
pub use platform::{GrantOracle, HostContext, LauncherProvider, SpecialLauncher};
pub use policy::{ActivationDescriptor, ActivationPolicy, SettingsActivationPolicy};
pub use registry::DelegateHandle;
