//! Pending-request bookkeeping.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Weak;
use std::time::{Duration, Instant};

use crate::capability::{Capability, RequestId};
use crate::platform::HostContext;

use super::outcome::Callback;

/// Which round trip a request is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Registered, nothing launched yet.
    Starting,
    /// Waiting for the batch dialog result.
    Batch,
    /// Waiting for this special capability's settings round trip.
    Special(Capability),
}

/// One in-flight logical ask.
pub(crate) struct PendingRequest {
    pub id: RequestId,
    pub callbacks: Vec<Callback>,
    /// De-duplicated original capability list, in caller order.
    pub requested: Vec<Capability>,
    /// Normal capabilities sent in the batch round trip.
    pub batch: Vec<Capability>,
    /// Special capabilities not yet dispatched. Only ever shrinks.
    pub remaining_special: VecDeque<Capability>,
    /// Capabilities the device cannot grant; always reported denied.
    pub unsupported: Vec<Capability>,
    pub phase: Phase,
    pub created_at: Instant,
    pub host: Weak<dyn HostContext>,
}

impl PendingRequest {
    pub fn new(
        id: RequestId,
        callback: Callback,
        requested: Vec<Capability>,
        created_at: Instant,
        host: Weak<dyn HostContext>,
    ) -> Self {
        Self {
            id,
            callbacks: vec![callback],
            requested,
            batch: Vec::new(),
            remaining_special: VecDeque::new(),
            unsupported: Vec::new(),
            phase: Phase::Starting,
            created_at,
            host,
        }
    }

    pub fn requested_set(&self) -> BTreeSet<Capability> {
        self.requested.iter().cloned().collect()
    }

    /// Order-independent set equality with the original request.
    pub fn matches(&self, capabilities: &[Capability]) -> bool {
        let other: BTreeSet<Capability> = capabilities.iter().cloned().collect();
        other == self.requested_set()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) > timeout
    }

    /// A dropped host counts as torn down.
    pub fn host_torn_down(&self) -> bool {
        self.host.upgrade().is_none_or(|host| host.is_torn_down())
    }

    pub fn in_flight_special(&self) -> Option<&Capability> {
        match &self.phase {
            Phase::Special(capability) => Some(capability),
            _ => None,
        }
    }
}
