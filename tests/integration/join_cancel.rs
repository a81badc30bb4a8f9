//! Joining in-flight requests and canceling them.

use grantflow::capability::names;
use grantflow::{CompletionReason, JoinResult, RequestId};
use std::sync::{Arc, Mutex};

use super::helpers::{caps, collector, harness, only};

// ─── Join ─────────────────────────────────────────────────────────────────────

#[test]
fn joined_callers_share_one_dispatch_and_one_result() {
    let h = harness();
    let (id, first) = h.submit(&[names::CAMERA, names::RECORD_AUDIO]);
    let id = id.unwrap();
    let (second, callback) = collector();

    let joined = h.coordinator.add_callback(
        &id,
        &caps(&[names::RECORD_AUDIO, names::CAMERA]),
        callback,
    );
    assert_eq!(joined, JoinResult::Success);

    h.answer_batch(&id, &[(names::CAMERA, true), (names::RECORD_AUDIO, false)]);

    assert_eq!(h.host.batches().len(), 1);
    let a = only(&first);
    let b = only(&second);
    assert_eq!(a, b);
    assert_eq!(a.denied, caps(&[names::RECORD_AUDIO]));
}

#[test]
fn identical_submits_share_one_batch_dialog() {
    let h = harness();
    let (first_id, first) = h.submit(&[names::CAMERA, names::RECORD_AUDIO]);
    let (second_id, second) = h.submit(&[names::RECORD_AUDIO, names::CAMERA]);
    let first_id = first_id.unwrap();

    assert_eq!(second_id.as_ref(), Some(&first_id));
    assert_eq!(h.host.batches().len(), 1);
    assert_eq!(h.coordinator.pending_count(), 1);

    h.answer_batch(&first_id, &[(names::CAMERA, true), (names::RECORD_AUDIO, false)]);

    let a = only(&first);
    assert_eq!(a, only(&second));
    assert_eq!(a.denied, caps(&[names::RECORD_AUDIO]));
}

#[test]
fn identical_special_submits_share_one_settings_sequence() {
    let h = harness();
    let (first_id, first) = h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW]);
    let late_id = RequestId::generate();
    h.coordinator.register_delegate(&late_id, &h.provider_ctx);
    let (second, callback) = collector();

    let returned = h.coordinator.submit_with_id(
        late_id.clone(),
        &h.host_ctx,
        caps(&[names::SYSTEM_ALERT_WINDOW]),
        callback,
    );

    assert_eq!(returned, Some(first_id.clone()));
    assert_eq!(h.provider.launches().len(), 1);
    assert!(!h.coordinator.unregister_delegate(&late_id));

    h.answer_special(&first_id, names::SYSTEM_ALERT_WINDOW, true);
    assert!(only(&first).all_granted());
    assert!(only(&second).all_granted());
}

#[test]
fn join_with_mismatched_set_is_rejected() {
    let h = harness();
    let (id, first) = h.submit(&[names::CAMERA, names::RECORD_AUDIO]);
    let id = id.unwrap();
    let (rejected, callback) = collector();

    let joined = h
        .coordinator
        .add_callback(&id, &caps(&[names::CAMERA]), callback);
    assert_eq!(joined, JoinResult::PermissionMismatch);

    h.answer_batch(&id, &[(names::CAMERA, true), (names::RECORD_AUDIO, true)]);
    assert!(only(&first).all_granted());
    assert!(rejected.lock().unwrap().is_empty());
}

#[test]
fn join_after_completion_reports_not_found() {
    let h = harness();
    let (id, _first) = h.submit(&[names::CAMERA]);
    let id = id.unwrap();
    h.answer_batch(&id, &[(names::CAMERA, true)]);
    let (late, callback) = collector();

    let joined = h
        .coordinator
        .add_callback(&id, &caps(&[names::CAMERA]), callback);

    assert_eq!(joined, JoinResult::RequestNotFound);
    assert!(late.lock().unwrap().is_empty());
}

#[test]
fn requested_capabilities_expose_the_original_set() {
    let h = harness();
    h.grant(names::CAMERA);
    let (id, _outcomes) = h.submit(&[names::CAMERA, names::RECORD_AUDIO]);
    let id = id.unwrap();

    let requested = h.coordinator.requested_capabilities(&id).unwrap();
    assert_eq!(
        requested.into_iter().collect::<Vec<_>>(),
        caps(&[names::CAMERA, names::RECORD_AUDIO])
    );
    assert!(
        h.coordinator
            .requested_capabilities(&RequestId::from("missing"))
            .is_none()
    );
}

#[test]
fn panicking_joined_callback_does_not_starve_siblings() {
    let h = harness();
    let (id, first) = h.submit(&[names::CAMERA]);
    let id = id.unwrap();
    h.coordinator
        .add_callback(&id, &caps(&[names::CAMERA]), |_| panic!("ui already gone"));
    let (third, callback) = collector();
    h.coordinator
        .add_callback(&id, &caps(&[names::CAMERA]), callback);

    h.answer_batch(&id, &[(names::CAMERA, true)]);

    assert!(only(&first).all_granted());
    assert!(only(&third).all_granted());
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

#[test]
fn cancel_delivers_one_canceled_outcome() {
    let h = harness();
    let (id, outcomes) = h.submit(&[names::CAMERA, names::RECORD_AUDIO]);
    let id = id.unwrap();

    assert!(h.coordinator.cancel(&id));

    let outcome = only(&outcomes);
    assert_eq!(outcome.reason, CompletionReason::Canceled);
    assert_eq!(outcome.denied, caps(&[names::CAMERA, names::RECORD_AUDIO]));
    assert!(!h.coordinator.has_active_request(&id));
}

#[test]
fn results_after_cancel_are_no_ops() {
    let h = harness();
    let (id, outcomes) = h.submit_with_provider(&[names::CAMERA, names::SYSTEM_ALERT_WINDOW]);
    h.coordinator.cancel(&id);

    h.answer_batch(&id, &[(names::CAMERA, true)]);
    h.answer_special(&id, names::SYSTEM_ALERT_WINDOW, true);

    assert_eq!(outcomes.lock().unwrap().len(), 1);
    assert!(h.provider.launches().is_empty());
    assert!(!h.coordinator.cancel(&id));
}

#[test]
fn cancel_clears_delegate_registration() {
    let h = harness();
    let (id, _outcomes) = h.submit_with_provider(&[names::SYSTEM_ALERT_WINDOW]);
    assert!(h.coordinator.snapshot().get(&id).unwrap().has_delegate);

    h.coordinator.cancel(&id);

    assert!(!h.coordinator.unregister_delegate(&id));
}

#[test]
fn cancel_reaches_every_joined_callback() {
    let h = harness();
    let (id, first) = h.submit(&[names::CAMERA]);
    let id = id.unwrap();
    let seen = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&seen);
    h.coordinator
        .add_callback(&id, &caps(&[names::CAMERA]), move |outcome| {
            assert_eq!(outcome.reason, CompletionReason::Canceled);
            *counter.lock().unwrap() += 1;
        });

    h.coordinator.cancel(&id);

    assert_eq!(only(&first).reason, CompletionReason::Canceled);
    assert_eq!(*seen.lock().unwrap(), 1);
}
