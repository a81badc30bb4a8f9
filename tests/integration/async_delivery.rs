//! Coordinator on a real tokio runtime: default scheduler, oneshot delivery.

use grantflow::capability::names;
use grantflow::{
    CompletionReason, GrantStore, HostContext, LauncherProvider, PermissionCoordinator,
    PlatformClassifier, RequestId, outcome_channel,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::helpers::{RecordingHost, RecordingProvider, caps};

fn tokio_coordinator(store: &grantflow::SharedGrantStore) -> PermissionCoordinator {
    PermissionCoordinator::builder(store.clone(), Arc::new(PlatformClassifier::new(34)))
        .build()
        .expect("tokio runtime is running")
}

#[tokio::test]
async fn outcome_arrives_through_oneshot() {
    let store = GrantStore::default_shared();
    let coordinator = tokio_coordinator(&store);
    let host: Arc<dyn HostContext> = RecordingHost::new();
    let (callback, rx) = outcome_channel();

    let id = coordinator
        .submit(&host, caps(&[names::CAMERA]), callback)
        .unwrap();
    store.lock().unwrap().grant(names::CAMERA);
    let results = HashMap::from([(names::CAMERA.into(), true)]);
    coordinator.on_batch_result(&id, &results);

    let outcome = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("outcome in time")
        .expect("sender not dropped");
    assert_eq!(outcome.request_id, id);
    assert!(outcome.all_granted());
}

#[tokio::test]
async fn retry_runs_on_the_tokio_timer() {
    let store = GrantStore::default_shared();
    let coordinator = tokio_coordinator(&store);
    let host: Arc<dyn HostContext> = RecordingHost::new();
    let provider = RecordingProvider::new();
    provider.fail(names::WRITE_SETTINGS, 2);
    let provider_ctx: Arc<dyn LauncherProvider> = provider.clone();
    let id = RequestId::generate();
    coordinator.register_delegate(&id, &provider_ctx);
    let (callback, rx) = outcome_channel();

    coordinator.submit_with_id(id, &host, caps(&[names::WRITE_SETTINGS]), callback);

    let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("outcome in time")
        .expect("sender not dropped");
    assert_eq!(outcome.reason, CompletionReason::DispatchFailed);
    assert_eq!(provider.launches().len(), 2);
}

#[tokio::test]
async fn dropped_receiver_does_not_disturb_completion() {
    let store = GrantStore::default_shared();
    let coordinator = tokio_coordinator(&store);
    let host: Arc<dyn HostContext> = RecordingHost::new();
    let (callback, rx) = outcome_channel();
    drop(rx);

    let id = coordinator
        .submit(&host, caps(&[names::RECORD_AUDIO]), callback)
        .unwrap();
    coordinator.cancel(&id);

    assert_eq!(coordinator.pending_count(), 0);
}
