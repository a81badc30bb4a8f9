//! Bounded retry of special launches.

use grantflow::capability::names;
use grantflow::{
    ActivationDescriptor, Capability, CompletionReason, LaunchError, LauncherProvider, RequestId,
    SpecialLauncher,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::helpers::{caps, collector, harness, only};

const RETRY_DELAY: Duration = Duration::from_millis(50);

#[test]
fn launch_failing_once_is_retried_after_delay() {
    let h = harness();
    h.provider.fail(names::WRITE_SETTINGS, 1);
    let (id, outcomes) = h.submit_with_provider(&[names::WRITE_SETTINGS]);

    assert_eq!(h.provider.launches().len(), 1);

    h.scheduler.advance(RETRY_DELAY - Duration::from_millis(1));
    assert_eq!(h.provider.launches().len(), 1, "retry waits for the delay");

    h.scheduler.advance(Duration::from_millis(1));
    assert_eq!(h.provider.launches().len(), 2);
    assert!(outcomes.lock().unwrap().is_empty());
    assert!(h.coordinator.has_active_request(&id));

    h.answer_special(&id, names::WRITE_SETTINGS, true);
    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::Completed);
    assert!(outcome.all_granted());
}

#[test]
fn launch_failing_twice_goes_to_failure_path() {
    let h = harness();
    h.provider.fail(names::WRITE_SETTINGS, 2);
    let (id, outcomes) = h.submit_with_provider(&[names::WRITE_SETTINGS]);

    h.scheduler.advance(RETRY_DELAY);

    assert_eq!(h.provider.launches().len(), 2, "exactly two attempts");
    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::DispatchFailed);
    assert_eq!(outcome.denied, caps(&[names::WRITE_SETTINGS]));
    assert!(!h.coordinator.has_active_request(&id));

    h.scheduler.advance(Duration::from_secs(1));
    assert_eq!(h.provider.launches().len(), 2);
}

#[test]
fn exhausted_retry_skips_to_next_special() {
    let h = harness();
    h.provider.fail(names::SYSTEM_ALERT_WINDOW, 2);
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);

    h.scheduler.advance(RETRY_DELAY);

    assert_eq!(
        h.provider.launched(),
        caps(&[
            names::SYSTEM_ALERT_WINDOW,
            names::SYSTEM_ALERT_WINDOW,
            names::WRITE_SETTINGS
        ])
    );

    h.answer_special(&id, names::WRITE_SETTINGS, true);
    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::Completed);
    assert_eq!(outcome.denied, caps(&[names::SYSTEM_ALERT_WINDOW]));
}

#[test]
fn pending_retry_is_dropped_after_cancel() {
    let h = harness();
    h.provider.fail(names::WRITE_SETTINGS, 1);
    let (id, outcomes) = h.submit_with_provider(&[names::WRITE_SETTINGS]);

    h.coordinator.cancel(&id);
    h.scheduler.advance(RETRY_DELAY);

    assert_eq!(h.provider.launches().len(), 1);
    assert_eq!(only(&outcomes).reason, CompletionReason::Canceled);
}

#[test]
fn retried_launch_keeps_the_same_activation() {
    let h = harness();
    h.provider.fail(names::MANAGE_EXTERNAL_STORAGE, 1);
    let (_id, _outcomes) = h.submit_with_provider(&[names::MANAGE_EXTERNAL_STORAGE]);

    h.scheduler.advance(RETRY_DELAY);

    let launches = h.provider.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0].activation, launches[1].activation);
    assert_eq!(
        launches[1].activation.action,
        "android.settings.MANAGE_APP_ALL_FILES_ACCESS_PERMISSION"
    );
}

/// Provider whose launchers panic for the first `panics` attempts.
struct PanickingProvider {
    attempts: Arc<AtomicU32>,
    panics: u32,
}

impl LauncherProvider for PanickingProvider {
    fn special_launcher(&self, _: &Capability) -> Option<Arc<dyn SpecialLauncher>> {
        let attempts = Arc::clone(&self.attempts);
        let panics = self.panics;
        Some(Arc::new(
            move |_: &RequestId, _: &ActivationDescriptor| -> Result<(), LaunchError> {
                if attempts.fetch_add(1, Ordering::SeqCst) < panics {
                    panic!("settings activity not found");
                }
                Ok(())
            },
        ))
    }
}

fn submit_with_panicking_provider(
    h: &super::helpers::Harness,
    panics: u32,
) -> (RequestId, Arc<AtomicU32>, Arc<dyn LauncherProvider>, super::helpers::Outcomes) {
    let attempts = Arc::new(AtomicU32::new(0));
    let provider: Arc<dyn LauncherProvider> = Arc::new(PanickingProvider {
        attempts: Arc::clone(&attempts),
        panics,
    });
    let id = RequestId::generate();
    h.coordinator.register_delegate(&id, &provider);
    let (outcomes, callback) = collector();
    h.coordinator
        .submit_with_id(id.clone(), &h.host_ctx, caps(&[names::WRITE_SETTINGS]), callback);
    (id, attempts, provider, outcomes)
}

#[test]
fn panicking_launcher_is_retried_like_a_failed_launch() {
    let h = harness();
    let (id, attempts, _provider, outcomes) = submit_with_panicking_provider(&h, 1);

    assert!(h.coordinator.has_active_request(&id));
    h.scheduler.advance(RETRY_DELAY);

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(outcomes.lock().unwrap().is_empty());
    h.answer_special(&id, names::WRITE_SETTINGS, true);
    assert!(only(&outcomes).all_granted());
}

#[test]
fn launcher_panicking_on_every_attempt_fails_the_request() {
    let h = harness();
    let (id, attempts, _provider, outcomes) = submit_with_panicking_provider(&h, u32::MAX);

    h.scheduler.advance(RETRY_DELAY);

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::DispatchFailed);
    assert_eq!(outcome.denied, caps(&[names::WRITE_SETTINGS]));
    assert!(!h.coordinator.has_active_request(&id));
}
