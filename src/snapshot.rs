//! Read-only export of in-flight requests.
//!
//! Hosts that persist coordinator state across process death serialize a
//! [`CoordinatorSnapshot`] into their own store. Restoring from it is up to
//! the host; the coordinator only produces it.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, RequestId};
use crate::error::{GrantflowError, Result};

/// The round trip a request is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum InFlightStep {
    /// Registered, nothing launched yet.
    Starting,
    Batch,
    Special { capability: Capability },
}

/// One pending request as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    pub request_id: RequestId,
    pub requested: Vec<Capability>,
    pub remaining_special: Vec<Capability>,
    pub unsupported: Vec<Capability>,
    pub in_flight: InFlightStep,
    pub callbacks: usize,
    pub age_ms: u64,
    pub has_delegate: bool,
}

/// All pending requests, ordered by request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub pending: Vec<PendingSnapshot>,
}

impl CoordinatorSnapshot {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&PendingSnapshot> {
        self.pending.iter().find(|p| &p.request_id == request_id)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GrantflowError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GrantflowError::Serialization(e.to_string()))
    }

    /// Parse a snapshot previously produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`GrantflowError::Serialization`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GrantflowError::Serialization(e.to_string()))
    }
}
