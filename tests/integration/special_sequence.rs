//! Special capabilities: strict one-at-a-time dispatch and the failure path.

use grantflow::capability::names;
use grantflow::snapshot::InFlightStep;
use grantflow::{Capability, CompletionReason};

use super::helpers::{caps, harness, only};

#[test]
fn specials_dispatch_one_at_a_time_in_order() {
    let h = harness();
    let (id, outcomes) = h.submit_with_provider(&[
        names::SYSTEM_ALERT_WINDOW,
        names::WRITE_SETTINGS,
        names::PACKAGE_USAGE_STATS,
    ]);

    assert_eq!(h.provider.launched(), caps(&[names::SYSTEM_ALERT_WINDOW]));

    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);
    assert_eq!(
        h.provider.launched(),
        caps(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS])
    );

    h.answer_special(&id, names::WRITE_SETTINGS, false);
    assert_eq!(h.provider.launches().len(), 3);
    assert!(outcomes.lock().unwrap().is_empty());

    h.answer_special(&id, names::PACKAGE_USAGE_STATS, true);
    assert_eq!(only(&outcomes).denied, caps(&[names::WRITE_SETTINGS]));
}

#[test]
fn late_result_for_an_earlier_step_is_ignored() {
    let h = harness();
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);
    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);

    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);

    assert_eq!(h.provider.launches().len(), 2);
    assert!(outcomes.lock().unwrap().is_empty());
    let snapshot = h.coordinator.snapshot();
    assert_eq!(
        snapshot.get(&id).unwrap().in_flight,
        InFlightStep::Special {
            capability: Capability::from(names::WRITE_SETTINGS)
        }
    );
}

#[test]
fn result_for_a_queued_step_does_not_skip_ahead() {
    let h = harness();
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);

    h.answer_special(&id, names::WRITE_SETTINGS, true);

    assert_eq!(h.provider.launched(), caps(&[names::SYSTEM_ALERT_WINDOW]));
    assert!(outcomes.lock().unwrap().is_empty());
}

#[test]
fn final_denial_reflects_revocations_during_the_sequence() {
    let h = harness();
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);
    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);

    h.revoke(names::SYSTEM_ALERT_WINDOW);
    h.answer_special(&id, names::WRITE_SETTINGS, true);

    assert_eq!(only(&outcomes).denied, caps(&[names::SYSTEM_ALERT_WINDOW]));
}

// ─── Failure path ─────────────────────────────────────────────────────────────

#[test]
fn missing_launcher_skips_to_next_launchable_capability() {
    let h = harness();
    h.provider.withhold(names::SYSTEM_ALERT_WINDOW);
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);

    assert_eq!(h.provider.launched(), caps(&[names::WRITE_SETTINGS]));

    h.answer_special(&id, names::WRITE_SETTINGS, true);
    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::Completed);
    assert_eq!(outcome.denied, caps(&[names::SYSTEM_ALERT_WINDOW]));
}

#[test]
fn failure_finalizes_when_next_capability_has_no_launcher() {
    let h = harness();
    h.provider.withhold(names::WRITE_SETTINGS);
    let (id, outcomes) = h.submit_with_provider(&[
        names::SYSTEM_ALERT_WINDOW,
        names::WRITE_SETTINGS,
        names::PACKAGE_USAGE_STATS,
    ]);
    h.grant(names::PACKAGE_USAGE_STATS);

    h.coordinator
        .on_dispatch_failure(&id, &names::SYSTEM_ALERT_WINDOW.into());

    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::DispatchFailed);
    // Denial is re-derived live, so the already-granted capability is not reported.
    assert_eq!(
        outcome.denied,
        caps(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS])
    );
    assert!(!h.coordinator.has_active_request(&id));
}

#[test]
fn failure_path_rederives_earlier_grants() {
    let h = harness();
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);
    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);

    h.coordinator
        .on_dispatch_failure(&id, &names::WRITE_SETTINGS.into());

    assert_eq!(only(&outcomes).denied, caps(&[names::WRITE_SETTINGS]));
}

#[test]
fn failure_report_for_a_capability_not_in_flight_is_ignored() {
    let h = harness();
    let (id, outcomes) =
        h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW, names::WRITE_SETTINGS]);

    h.coordinator
        .on_dispatch_failure(&id, &names::WRITE_SETTINGS.into());

    assert!(outcomes.lock().unwrap().is_empty());
    assert_eq!(h.provider.launches().len(), 1);
}

#[test]
fn reclaimed_provider_routes_into_failure_path() {
    let h = harness();
    let (id, outcomes) = {
        let provider: std::sync::Arc<dyn grantflow::LauncherProvider> =
            super::helpers::RecordingProvider::new();
        let id = grantflow::RequestId::generate();
        h.coordinator.register_delegate(&id, &provider);
        let (outcomes, callback) = super::helpers::collector();
        h.coordinator.submit_with_id(
            id.clone(),
            &h.host_ctx,
            caps(&[names::CAMERA, names::WRITE_SETTINGS]),
            callback,
        );
        (id, outcomes)
    };

    // The owning UI went away while the batch dialog was up.
    h.answer_batch(&id, &[(names::CAMERA, true)]);

    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::DispatchFailed);
    assert_eq!(outcome.denied, caps(&[names::WRITE_SETTINGS]));
}
