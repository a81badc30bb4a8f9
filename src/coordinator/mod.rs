//! Runtime permission-request coordinator.
//!
//! [`PermissionCoordinator`] turns "ask for these capabilities" into a
//! sequence of platform round trips and guarantees every registered callback
//! receives exactly one [`RequestOutcome`].
//!
//! # Dispatch order
//!
//! 1. Already-granted capabilities are dropped; unsupported ones are never
//!    dispatched and always reported denied.
//! 2. All normal capabilities go out in one batch dialog.
//! 3. Special capabilities follow one at a time, each through the launcher
//!    the UI owner registered for the request id. A failed launch is retried
//!    once after a short delay.
//! 4. When the sequence ends the denied list is re-derived from live grant
//!    state and delivered to every callback.
//!
//! Identical concurrent asks are merged so the platform never shows two
//! dialogs at once: [`submit`](PermissionCoordinator::submit) joins a
//! set-equal in-flight request on its own, and
//! [`add_callback`](PermissionCoordinator::add_callback) joins a known id.
//!
//! # Locking
//!
//! Every entry point takes one coordinator-wide mutex. Launches and callbacks
//! run after it is released, so they may call back into the coordinator.

mod outcome;
mod pending;
mod state;

pub use outcome::{Callback, CompletionReason, JoinResult, RequestOutcome, outcome_channel};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, warn};

use crate::capability::{Capability, RequestId};
use crate::classifier::CapabilityClassifier;
use crate::config::CoordinatorConfig;
use crate::error::{GrantflowError, Result};
use crate::platform::{GrantOracle, HostContext, LauncherProvider, guard_launch};
use crate::policy::{ActivationPolicy, SettingsActivationPolicy};
use crate::registry::DelegateHandle;
use crate::retry::SpecialDispatch;
use crate::snapshot::{CoordinatorSnapshot, InFlightStep, PendingSnapshot};
use crate::timer::{Clock, Scheduler, SystemClock, TokioScheduler};

use outcome::deliver;
use pending::Phase;
use state::{Collaborators, CoordinatorState, Effect};

/// Builder for [`PermissionCoordinator`].
///
/// The grant oracle and classifier are required. Everything else defaults:
/// the activation policy is built from the `[platform]` config section, the
/// clock is [`SystemClock`] and the scheduler is a [`TokioScheduler`] on the
/// current runtime.
pub struct CoordinatorBuilder {
    oracle: Arc<dyn GrantOracle>,
    classifier: Arc<dyn CapabilityClassifier>,
    policy: Option<Arc<dyn ActivationPolicy>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<Arc<dyn Clock>>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    pub fn with_policy(mut self, policy: Arc<dyn ActivationPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`GrantflowError::Config`] if the configuration is invalid, or if
    /// no scheduler was supplied and no tokio runtime is running.
    pub fn build(self) -> Result<PermissionCoordinator> {
        self.config.validate()?;
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current().ok_or_else(|| {
                GrantflowError::Config(
                    "no scheduler configured and no tokio runtime is running".into(),
                )
            })?),
        };
        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(SettingsActivationPolicy::new(
                self.config.platform.version,
                self.config.platform.app_identity.clone(),
            ))
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let deps = Collaborators {
            oracle: self.oracle,
            classifier: self.classifier,
            policy,
            clock,
            config: self.config,
        };
        let inner = Arc::new_cyclic(|self_ref| Inner {
            state: Mutex::new(CoordinatorState::default()),
            deps,
            scheduler,
            self_ref: self_ref.clone(),
        });
        Ok(PermissionCoordinator { inner })
    }
}

/// The permission-request coordinator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PermissionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<CoordinatorState>,
    deps: Collaborators,
    scheduler: Arc<dyn Scheduler>,
    self_ref: Weak<Inner>,
}

impl PermissionCoordinator {
    pub fn builder(
        oracle: Arc<dyn GrantOracle>,
        classifier: Arc<dyn CapabilityClassifier>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            oracle,
            classifier,
            policy: None,
            scheduler: None,
            clock: None,
            config: CoordinatorConfig::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.deps.config
    }

    /// Ask for `capabilities` on behalf of `host`.
    ///
    /// Returns the id of the pending request, or `None` when the request
    /// completed during the call (nothing to ask, host gone, batch launch
    /// failed). If an in-flight request asks for the same capability set,
    /// `callback` joins it and that request's id is returned. `callback` is
    /// invoked exactly once either way.
    pub fn submit(
        &self,
        host: &Arc<dyn HostContext>,
        capabilities: Vec<Capability>,
        callback: impl FnOnce(RequestOutcome) + Send + 'static,
    ) -> Option<RequestId> {
        self.submit_with_id(RequestId::generate(), host, capabilities, callback)
    }

    /// Like [`submit`](Self::submit) with a caller-chosen id.
    ///
    /// Special-only requests dispatch their first capability during this call,
    /// so the UI owner must register its launcher provider under `id` first.
    /// When the call joins an identical in-flight request, the provider
    /// registered under `id` is dropped and the returned id differs from `id`.
    pub fn submit_with_id(
        &self,
        id: RequestId,
        host: &Arc<dyn HostContext>,
        capabilities: Vec<Capability>,
        callback: impl FnOnce(RequestOutcome) + Send + 'static,
    ) -> Option<RequestId> {
        let submitted = {
            let mut state = self.inner.lock();
            let submitted =
                state.submit(&self.inner.deps, id, host, capabilities, Box::new(callback));
            if submitted.created {
                self.inner.arm_sweeper(&mut state);
            }
            submitted
        };
        self.inner.run(submitted.effects);
        // Launch failures and re-entrant hosts may have settled the request already.
        submitted
            .request_id
            .filter(|id| self.inner.lock().pending.contains_key(id))
    }

    /// Report the batch dialog result: capability → granted.
    pub fn on_batch_result(&self, id: &RequestId, results: &HashMap<Capability, bool>) {
        let effects = self
            .inner
            .lock()
            .on_batch_result(&self.inner.deps, id, results);
        self.inner.run(effects);
    }

    /// Report that the settings round trip for `capability` returned.
    pub fn on_special_step_result(&self, id: &RequestId, capability: &Capability) {
        let effects = self
            .inner
            .lock()
            .on_special_step_result(&self.inner.deps, id, capability);
        self.inner.run(effects);
    }

    /// Report that the in-flight special round trip for `capability` failed.
    pub fn on_dispatch_failure(&self, id: &RequestId, capability: &Capability) {
        let effects = self
            .inner
            .lock()
            .on_dispatch_failure(&self.inner.deps, id, capability);
        self.inner.run(effects);
    }

    /// Cancel a pending request.
    ///
    /// Its callbacks receive one [`CompletionReason::Canceled`] outcome with
    /// every requested capability denied; later results for `id` are ignored.
    /// Returns whether the request was pending.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let effects = self.inner.lock().cancel(id);
        let canceled = !effects.is_empty();
        self.inner.run(effects);
        canceled
    }

    /// Attach `callback` to the in-flight request `id`.
    ///
    /// `capabilities` must equal the original request as a set.
    pub fn add_callback(
        &self,
        id: &RequestId,
        capabilities: &[Capability],
        callback: impl FnOnce(RequestOutcome) + Send + 'static,
    ) -> JoinResult {
        let mut state = self.inner.lock();
        let Some(request) = state.pending.get_mut(id) else {
            debug!(request_id = %id, "join: request not found");
            return JoinResult::RequestNotFound;
        };
        if !request.matches(capabilities) {
            debug!(request_id = %id, "join: capability set mismatch");
            return JoinResult::PermissionMismatch;
        }
        request.callbacks.push(Box::new(callback));
        debug!(request_id = %id, callbacks = request.callbacks.len(), "joined request");
        JoinResult::Success
    }

    /// Register the launcher provider for `id`, replacing any previous one.
    ///
    /// Only a weak reference is kept; the caller owns the provider. A
    /// registration that no request ever uses is dropped by the sweeper once
    /// it outlives the request timeout.
    pub fn register_delegate(
        &self,
        id: &RequestId,
        provider: &Arc<dyn LauncherProvider>,
    ) -> DelegateHandle {
        let now = self.inner.deps.clock.now();
        let mut state = self.inner.lock();
        let handle = state.registry.register(id.clone(), provider, now);
        if state.sweeper.as_ref().is_none_or(|s| s.is_cancelled()) {
            self.inner.arm_sweeper(&mut state);
        }
        handle
    }

    pub fn unregister_delegate(&self, id: &RequestId) -> bool {
        self.inner.lock().registry.unregister(id)
    }

    /// Unregister only if `handle` is still the current registration.
    pub fn release_delegate(&self, handle: &DelegateHandle) -> bool {
        self.inner.lock().registry.release(handle)
    }

    pub fn has_active_request(&self, id: &RequestId) -> bool {
        self.inner.lock().pending.contains_key(id)
    }

    pub fn requested_capabilities(&self, id: &RequestId) -> Option<BTreeSet<Capability>> {
        self.inner.lock().pending.get(id).map(|r| r.requested_set())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Finalize every expired request and drop orphaned providers now. Also
    /// runs on its own timer.
    pub fn sweep(&self) {
        self.inner.sweep();
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let now = self.inner.deps.clock.now();
        let state = self.inner.lock();
        let mut pending: Vec<PendingSnapshot> = state
            .pending
            .values()
            .map(|r| PendingSnapshot {
                request_id: r.id.clone(),
                requested: r.requested.clone(),
                remaining_special: r.remaining_special.iter().cloned().collect(),
                unsupported: r.unsupported.clone(),
                in_flight: match &r.phase {
                    Phase::Starting => InFlightStep::Starting,
                    Phase::Batch => InFlightStep::Batch,
                    Phase::Special(capability) => InFlightStep::Special {
                        capability: capability.clone(),
                    },
                },
                callbacks: r.callbacks.len(),
                age_ms: u64::try_from(r.age(now).as_millis()).unwrap_or(u64::MAX),
                has_delegate: state.registry.contains(&r.id),
            })
            .collect();
        pending.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        CoordinatorSnapshot { pending }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute effects outside the lock.
    ///
    /// Launches are re-checked against the table first: an earlier effect or
    /// another thread may have settled the request since the effect was queued.
    fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LaunchBatch {
                    request_id,
                    host,
                    capabilities,
                    denied_on_failure,
                } => {
                    if !self.lock().is_batch_in_flight(&request_id) {
                        debug!(request_id = %request_id, "dropping batch launch for a settled request");
                        continue;
                    }
                    debug!(request_id = %request_id, count = capabilities.len(), "launching batch");
                    let launched = guard_launch(|| host.launch_batch(&request_id, &capabilities));
                    if let Err(e) = launched {
                        error!(request_id = %request_id, code = e.code(), error = %e, "batch launch failed");
                        let follow = self
                            .lock()
                            .on_batch_launch_failed(&request_id, denied_on_failure);
                        self.run(follow);
                    }
                }
                Effect::LaunchSpecial(dispatch) => self.launch_if_in_flight(dispatch),
                Effect::Deliver { callbacks, outcome } => deliver(callbacks, &outcome),
            }
        }
    }

    fn launch_special(&self, dispatch: SpecialDispatch) {
        let Err(e) = dispatch.attempt() else {
            debug!(
                request_id = %dispatch.request_id,
                capability = %dispatch.capability,
                attempt = dispatch.attempt,
                "special launched"
            );
            return;
        };

        let retry = &self.deps.config.retry;
        if retry.should_retry(dispatch.attempt) {
            warn!(
                request_id = %dispatch.request_id,
                capability = %dispatch.capability,
                attempt = dispatch.attempt,
                error = %e,
                "special launch failed; retrying"
            );
            let delay = retry.delay_for_attempt(dispatch.attempt + 1);
            let weak = self.self_ref.clone();
            let next = dispatch.next_attempt();
            self.scheduler.schedule(
                delay,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.launch_if_in_flight(next);
                    }
                }),
            );
        } else {
            error!(
                request_id = %dispatch.request_id,
                capability = %dispatch.capability,
                code = e.code(),
                error = %e,
                "special launch failed; giving up"
            );
            let effects = self.lock().on_dispatch_failure(
                &self.deps,
                &dispatch.request_id,
                &dispatch.capability,
            );
            self.run(effects);
        }
    }

    fn launch_if_in_flight(&self, dispatch: SpecialDispatch) {
        let live = self
            .lock()
            .is_in_flight(&dispatch.request_id, &dispatch.capability);
        if live {
            self.launch_special(dispatch);
        } else {
            debug!(
                request_id = %dispatch.request_id,
                capability = %dispatch.capability,
                attempt = dispatch.attempt,
                "dropping launch for a step no longer in flight"
            );
        }
    }

    /// Replace the single sweeper timer with a fresh one.
    ///
    /// The sweeper runs while requests are pending or providers are registered.
    fn arm_sweeper(&self, state: &mut CoordinatorState) {
        if let Some(previous) = state.sweeper.take() {
            previous.cancel();
        }
        let weak = self.self_ref.clone();
        let handle = self.scheduler.schedule(
            self.deps.config.expiry.sweep_interval(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep();
                }
            }),
        );
        state.sweeper = Some(handle);
    }

    fn sweep(&self) {
        let effects = {
            let mut state = self.lock();
            let effects = state.sweep_expired(&self.deps, self.deps.clock.now());
            if state.pending.is_empty() && state.registry.is_empty() {
                if let Some(sweeper) = state.sweeper.take() {
                    sweeper.cancel();
                }
            } else {
                self.arm_sweeper(&mut state);
            }
            effects
        };
        self.run(effects);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(sweeper) = state.sweeper.take() {
            sweeper.cancel();
        }
    }
}
