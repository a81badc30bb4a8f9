//! What callers receive when a request completes.

use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::oneshot;
use tracing::error;

use crate::capability::{Capability, RequestId};

/// Consumer of one request outcome. Invoked at most once.
pub type Callback = Box<dyn FnOnce(RequestOutcome) + Send>;

/// Why a request completed.
///
/// Callers should act on [`RequestOutcome::denied`]; the reason is for
/// diagnostics. A timeout is indistinguishable from the user denying
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every round trip ran (or nothing needed asking).
    Completed,
    /// A launch failed for good and the sequence could not continue.
    DispatchFailed,
    /// The request outlived the expiry timeout.
    TimedOut,
    /// The host container was gone at submit time.
    HostTornDown,
    /// The request was canceled by its owner.
    Canceled,
}

/// Final result delivered to every callback of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: RequestId,
    /// Capabilities that are not granted, in request order.
    pub denied: Vec<Capability>,
    pub reason: CompletionReason,
}

impl RequestOutcome {
    pub fn new(request_id: RequestId, denied: Vec<Capability>, reason: CompletionReason) -> Self {
        Self {
            request_id,
            denied,
            reason,
        }
    }

    /// Whether every requested capability ended up granted.
    pub fn all_granted(&self) -> bool {
        self.denied.is_empty()
    }
}

/// Result of joining an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinResult {
    /// The callback will receive the in-flight request's outcome.
    Success,
    /// No such request (already completed or canceled).
    RequestNotFound,
    /// The request exists but asks for a different capability set.
    PermissionMismatch,
}

/// A callback that forwards the outcome into a oneshot channel.
///
/// ```
/// use grantflow::coordinator::outcome_channel;
///
/// let (callback, mut rx) = outcome_channel();
/// drop(callback);
/// assert!(rx.try_recv().is_err());
/// ```
pub fn outcome_channel() -> (Callback, oneshot::Receiver<RequestOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: Callback = Box::new(move |outcome| {
        // The receiver may have been dropped; nobody is waiting then.
        let _ = tx.send(outcome);
    });
    (callback, rx)
}

/// Invoke every callback with its own copy of `outcome`.
///
/// A panicking callback is logged and does not stop the others.
pub(crate) fn deliver(callbacks: Vec<Callback>, outcome: &RequestOutcome) {
    for (index, callback) in callbacks.into_iter().enumerate() {
        let copy = outcome.clone();
        if catch_unwind(AssertUnwindSafe(move || callback(copy))).is_err() {
            error!(
                request_id = %outcome.request_id,
                callback = index,
                "outcome callback panicked"
            );
        }
    }
}
