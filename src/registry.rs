//! Delegate registry.
//!
//! Maps a request id to the [`LauncherProvider`] its UI owner registered. The
//! registry only keeps a [`Weak`] reference: once the owner drops its last
//! `Arc`, lookups start failing and the dispatch engine routes the in-flight
//! capability into its failure path.
//!
//! Owners are still expected to unregister on teardown. Each registration
//! returns a [`DelegateHandle`] carrying a generation number, so an owner that
//! was replaced by a recreated one cannot evict its successor. Entries that
//! no pending request backs are dropped by [`prune`](DelegateRegistry::prune)
//! once they outlive the request timeout or their provider is gone.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capability::{Capability, RequestId};
use crate::platform::{LauncherProvider, SpecialLauncher};

/// Proof of one registration, used for generation-checked release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateHandle {
    pub request_id: RequestId,
    pub generation: u64,
}

struct DelegateEntry {
    provider: Weak<dyn LauncherProvider>,
    generation: u64,
    registered_at: Instant,
}

/// Weak-ownership table from request id to launcher provider.
#[derive(Default)]
pub struct DelegateRegistry {
    entries: HashMap<RequestId, DelegateEntry>,
    next_generation: u64,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `request_id`, replacing any earlier provider.
    pub fn register(
        &mut self,
        request_id: RequestId,
        provider: &Arc<dyn LauncherProvider>,
        now: Instant,
    ) -> DelegateHandle {
        self.next_generation += 1;
        let generation = self.next_generation;
        let entry = DelegateEntry {
            provider: Arc::downgrade(provider),
            generation,
            registered_at: now,
        };
        if let Some(previous) = self.entries.insert(request_id.clone(), entry) {
            warn!(
                request_id = %request_id,
                previous_generation = previous.generation,
                generation,
                "replacing launcher provider"
            );
        } else {
            debug!(request_id = %request_id, generation, "launcher provider registered");
        }
        DelegateHandle {
            request_id,
            generation,
        }
    }

    /// Remove the entry for `request_id`. Returns whether one existed.
    pub fn unregister(&mut self, request_id: &RequestId) -> bool {
        self.entries.remove(request_id).is_some()
    }

    /// Remove the entry only if it still belongs to `handle`'s registration.
    pub fn release(&mut self, handle: &DelegateHandle) -> bool {
        match self.entries.get(&handle.request_id) {
            Some(entry) if entry.generation == handle.generation => {
                self.entries.remove(&handle.request_id);
                true
            }
            Some(entry) => {
                debug!(
                    request_id = %handle.request_id,
                    stale = handle.generation,
                    current = entry.generation,
                    "ignoring release from a replaced provider"
                );
                false
            }
            None => false,
        }
    }

    /// The launcher for `capability`, if the provider is still alive and has one.
    pub fn lookup(
        &self,
        request_id: &RequestId,
        capability: &Capability,
    ) -> Option<Arc<dyn SpecialLauncher>> {
        let entry = self.entries.get(request_id)?;
        let Some(provider) = entry.provider.upgrade() else {
            debug!(request_id = %request_id, "launcher provider was reclaimed");
            return None;
        };
        provider.special_launcher(capability)
    }

    /// Drop entries not backed by a pending request that are older than
    /// `max_age` or whose provider was reclaimed. Returns how many were dropped.
    pub fn prune(
        &mut self,
        now: Instant,
        max_age: Duration,
        is_pending: impl Fn(&RequestId) -> bool,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|request_id, entry| {
            if is_pending(request_id) {
                return true;
            }
            let expired = now.saturating_duration_since(entry.registered_at) > max_age;
            let reclaimed = entry.provider.strong_count() == 0;
            if expired || reclaimed {
                debug!(request_id = %request_id, expired, reclaimed, "dropping orphaned launcher provider");
            }
            !(expired || reclaimed)
        });
        before - self.entries.len()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
