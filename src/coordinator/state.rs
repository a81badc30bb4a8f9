//! Dispatch engine transitions.
//!
//! Everything here runs under the coordinator's single mutex. Transitions
//! never call out to hosts, launchers or callbacks; they return [`Effect`]s
//! that the coordinator executes after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capability::{Capability, RequestId, dedup_preserving_order};
use crate::classifier::{CapabilityClass, CapabilityClassifier};
use crate::config::CoordinatorConfig;
use crate::platform::{GrantOracle, HostContext};
use crate::policy::ActivationPolicy;
use crate::registry::DelegateRegistry;
use crate::retry::SpecialDispatch;
use crate::timer::{Clock, TimerHandle};

use super::outcome::{Callback, CompletionReason, RequestOutcome};
use super::pending::{PendingRequest, Phase};

/// Collaborators the transitions consult.
pub(crate) struct Collaborators {
    pub oracle: Arc<dyn GrantOracle>,
    pub classifier: Arc<dyn CapabilityClassifier>,
    pub policy: Arc<dyn ActivationPolicy>,
    pub clock: Arc<dyn Clock>,
    pub config: CoordinatorConfig,
}

/// Work to perform once the lock is released.
pub(crate) enum Effect {
    LaunchBatch {
        request_id: RequestId,
        host: Arc<dyn HostContext>,
        capabilities: Vec<Capability>,
        /// Reported if the launch itself fails.
        denied_on_failure: Vec<Capability>,
    },
    LaunchSpecial(SpecialDispatch),
    Deliver {
        callbacks: Vec<Callback>,
        outcome: RequestOutcome,
    },
}

impl Effect {
    fn deliver(callback: Callback, outcome: RequestOutcome) -> Self {
        Self::Deliver {
            callbacks: vec![callback],
            outcome,
        }
    }
}

/// Result of a submit transition.
pub(crate) struct Submitted {
    pub effects: Vec<Effect>,
    /// The pending request now carrying the callback, new or joined.
    pub request_id: Option<RequestId>,
    /// Whether a new pending request was registered.
    pub created: bool,
}

/// The pending-request table and delegate registry, guarded together.
#[derive(Default)]
pub(crate) struct CoordinatorState {
    pub pending: HashMap<RequestId, PendingRequest>,
    pub registry: DelegateRegistry,
    pub sweeper: Option<TimerHandle>,
}

impl CoordinatorState {
    pub fn submit(
        &mut self,
        deps: &Collaborators,
        id: RequestId,
        host: &Arc<dyn HostContext>,
        capabilities: Vec<Capability>,
        callback: Callback,
    ) -> Submitted {
        let requested = dedup_preserving_order(capabilities);
        let done = |effects: Vec<Effect>| Submitted {
            effects,
            request_id: None,
            created: false,
        };

        if self.pending.contains_key(&id) {
            warn!(request_id = %id, "request id already in flight; rejecting submit");
            let outcome = RequestOutcome::new(id, requested, CompletionReason::DispatchFailed);
            return done(vec![Effect::deliver(callback, outcome)]);
        }

        if requested.is_empty() {
            self.registry.unregister(&id);
            let outcome = RequestOutcome::new(id, Vec::new(), CompletionReason::Completed);
            return done(vec![Effect::deliver(callback, outcome)]);
        }

        if host.is_torn_down() {
            debug!(request_id = %id, "host torn down at submit");
            self.registry.unregister(&id);
            let outcome = RequestOutcome::new(id, requested, CompletionReason::HostTornDown);
            return done(vec![Effect::deliver(callback, outcome)]);
        }

        let now = deps.clock.now();
        let mut effects = self.sweep_expired(deps, now);

        let remaining = deps.oracle.remaining(&requested);
        if remaining.is_empty() {
            debug!(request_id = %id, "all capabilities already granted");
            self.registry.unregister(&id);
            let outcome = RequestOutcome::new(id, Vec::new(), CompletionReason::Completed);
            effects.push(Effect::deliver(callback, outcome));
            return done(effects);
        }

        // An identical ask already in flight absorbs this one.
        if let Some(existing) = self.pending.values_mut().find(|r| r.matches(&requested)) {
            let existing_id = existing.id.clone();
            existing.callbacks.push(callback);
            debug!(
                request_id = %existing_id,
                submitted_as = %id,
                callbacks = existing.callbacks.len(),
                "joined identical in-flight request"
            );
            self.registry.unregister(&id);
            return Submitted {
                effects,
                request_id: Some(existing_id),
                created: false,
            };
        }

        let mut normal = Vec::new();
        let mut special = Vec::new();
        let mut unsupported = Vec::new();
        for capability in &remaining {
            match deps.classifier.classify(capability) {
                CapabilityClass::Normal => normal.push(capability.clone()),
                CapabilityClass::Special => special.push(capability.clone()),
                CapabilityClass::Unsupported => unsupported.push(capability.clone()),
            }
        }

        if normal.is_empty() && special.is_empty() {
            debug!(request_id = %id, "only unsupported capabilities remain");
            self.registry.unregister(&id);
            let outcome = RequestOutcome::new(id, unsupported, CompletionReason::Completed);
            effects.push(Effect::deliver(callback, outcome));
            return done(effects);
        }

        let mut request =
            PendingRequest::new(id.clone(), callback, requested, now, Arc::downgrade(host));
        request.remaining_special = special.into();
        request.unsupported = unsupported;
        debug!(
            request_id = %id,
            normal = normal.len(),
            special = request.remaining_special.len(),
            unsupported = request.unsupported.len(),
            "request registered"
        );

        if normal.is_empty() {
            self.pending.insert(id.clone(), request);
            effects.extend(self.dispatch_special(deps, &id));
        } else {
            request.phase = Phase::Batch;
            request.batch = normal.clone();
            self.pending.insert(id.clone(), request);
            effects.push(Effect::LaunchBatch {
                request_id: id.clone(),
                host: Arc::clone(host),
                capabilities: normal,
                denied_on_failure: remaining,
            });
        }

        // Every special capability may have failed to dispatch already.
        let created = self.pending.contains_key(&id);
        Submitted {
            effects,
            request_id: created.then_some(id),
            created,
        }
    }

    pub fn on_batch_result(
        &mut self,
        deps: &Collaborators,
        id: &RequestId,
        results: &HashMap<Capability, bool>,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            debug!(request_id = %id, "batch result for unknown request");
            return Vec::new();
        };
        if request.phase != Phase::Batch {
            debug!(request_id = %id, "batch result while no batch is in flight");
            return Vec::new();
        }
        if request.host_torn_down() {
            debug!(request_id = %id, "batch result after host teardown; ignoring");
            return Vec::new();
        }

        // A capability can become granted out of band while the dialog is up.
        let denied: Vec<Capability> = request
            .batch
            .iter()
            .filter(|c| !results.get(*c).copied().unwrap_or(false) && !deps.oracle.is_granted(c))
            .cloned()
            .collect();

        if request.remaining_special.is_empty() {
            let denied = request
                .requested
                .iter()
                .filter(|c| denied.contains(c) || request.unsupported.contains(c))
                .cloned()
                .collect();
            return self.finalize(id, denied, CompletionReason::Completed);
        }
        debug!(
            request_id = %id,
            batch_denied = denied.len(),
            "batch finished; continuing with special capabilities"
        );
        self.dispatch_special(deps, id)
    }

    pub fn on_special_step_result(
        &mut self,
        deps: &Collaborators,
        id: &RequestId,
        capability: &Capability,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            debug!(request_id = %id, capability = %capability, "special result for unknown request");
            return Vec::new();
        };
        if request.in_flight_special() != Some(capability) {
            debug!(request_id = %id, capability = %capability, "stale special result");
            return Vec::new();
        }
        debug!(
            request_id = %id,
            capability = %capability,
            granted = deps.oracle.is_granted(capability),
            "special step finished"
        );
        self.dispatch_special(deps, id)
    }

    pub fn on_dispatch_failure(
        &mut self,
        deps: &Collaborators,
        id: &RequestId,
        capability: &Capability,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            return Vec::new();
        };
        if request.in_flight_special() != Some(capability) {
            debug!(request_id = %id, capability = %capability, "failure for a capability not in flight");
            return Vec::new();
        }
        self.fail_special(deps, id, capability)
    }

    /// Whether `id` is still waiting on its batch dialog.
    pub fn is_batch_in_flight(&self, id: &RequestId) -> bool {
        self.pending.get(id).is_some_and(|r| r.phase == Phase::Batch)
    }

    /// Whether `capability` is still the in-flight special step of `id`.
    pub fn is_in_flight(&self, id: &RequestId, capability: &Capability) -> bool {
        self.pending
            .get(id)
            .is_some_and(|r| r.in_flight_special() == Some(capability))
    }

    /// The launch of the batch dialog failed: the whole remaining set is denied.
    pub fn on_batch_launch_failed(
        &mut self,
        id: &RequestId,
        denied: Vec<Capability>,
    ) -> Vec<Effect> {
        match self.pending.get(id) {
            Some(request) if request.phase == Phase::Batch => {
                self.finalize(id, denied, CompletionReason::DispatchFailed)
            }
            _ => Vec::new(),
        }
    }

    pub fn cancel(&mut self, id: &RequestId) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            return Vec::new();
        };
        let denied = request.requested.clone();
        debug!(request_id = %id, "request canceled");
        self.finalize(id, denied, CompletionReason::Canceled)
    }

    /// Force-finalize every request older than the configured timeout and
    /// drop launcher providers no pending request needs.
    pub fn sweep_expired(&mut self, deps: &Collaborators, now: Instant) -> Vec<Effect> {
        let timeout = deps.config.expiry.request_timeout();
        let expired: Vec<RequestId> = self
            .pending
            .values()
            .filter(|r| r.is_expired(now, timeout))
            .map(|r| r.id.clone())
            .collect();

        let mut effects = Vec::new();
        for id in expired {
            let Some(request) = self.pending.get(&id) else {
                continue;
            };
            let age_ms = u64::try_from(request.age(now).as_millis()).unwrap_or(u64::MAX);
            info!(request_id = %id, age_ms, "request expired");
            let denied = request.requested.clone();
            effects.extend(self.finalize(&id, denied, CompletionReason::TimedOut));
        }

        let pending = &self.pending;
        let pruned = self
            .registry
            .prune(now, timeout, |id| pending.contains_key(id));
        if pruned > 0 {
            debug!(pruned, "pruned orphaned launcher providers");
        }
        effects
    }

    /// Dispatch the next queued special capability, or finalize when none remain.
    fn dispatch_special(&mut self, deps: &Collaborators, id: &RequestId) -> Vec<Effect> {
        let Some(request) = self.pending.get_mut(id) else {
            return Vec::new();
        };
        let Some(capability) = request.remaining_special.pop_front() else {
            return self.finalize_live(deps, id, CompletionReason::Completed);
        };

        let launcher = self.registry.lookup(id, &capability);
        let activation = deps.policy.build_activation(&capability);
        match (launcher, activation) {
            (Some(launcher), Some(activation)) => {
                request.phase = Phase::Special(capability.clone());
                debug!(request_id = %id, capability = %capability, action = %activation.action, "dispatching special capability");
                vec![Effect::LaunchSpecial(SpecialDispatch::new(
                    id.clone(),
                    capability,
                    activation,
                    launcher,
                ))]
            }
            (None, _) => {
                warn!(request_id = %id, capability = %capability, "no launcher available");
                self.fail_special(deps, id, &capability)
            }
            (Some(_), None) => {
                warn!(request_id = %id, capability = %capability, "no activation for capability");
                self.fail_special(deps, id, &capability)
            }
        }
    }

    /// Skip `failed` if the next queued capability can be launched, else finalize.
    fn fail_special(
        &mut self,
        deps: &Collaborators,
        id: &RequestId,
        failed: &Capability,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            return Vec::new();
        };
        let next_launchable = request
            .remaining_special
            .front()
            .is_some_and(|next| self.registry.lookup(id, next).is_some());

        if next_launchable {
            debug!(request_id = %id, capability = %failed, "skipping failed special capability");
            self.dispatch_special(deps, id)
        } else {
            self.finalize_live(deps, id, CompletionReason::DispatchFailed)
        }
    }

    /// Finalize with denial re-derived from live grant state.
    fn finalize_live(
        &mut self,
        deps: &Collaborators,
        id: &RequestId,
        reason: CompletionReason,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.get(id) else {
            return Vec::new();
        };
        let denied = request
            .requested
            .iter()
            .filter(|c| request.unsupported.contains(c) || !deps.oracle.is_granted(c))
            .cloned()
            .collect();
        self.finalize(id, denied, reason)
    }

    /// Remove the request and its delegate; hand its callbacks the outcome.
    fn finalize(
        &mut self,
        id: &RequestId,
        denied: Vec<Capability>,
        reason: CompletionReason,
    ) -> Vec<Effect> {
        let Some(request) = self.pending.remove(id) else {
            return Vec::new();
        };
        self.registry.unregister(id);
        debug!(
            request_id = %id,
            denied = denied.len(),
            callbacks = request.callbacks.len(),
            reason = ?reason,
            "request finalized"
        );
        vec![Effect::Deliver {
            callbacks: request.callbacks,
            outcome: RequestOutcome::new(request.id, denied, reason),
        }]
    }
}
