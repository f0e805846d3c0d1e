//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and
//! assert on emitted metrics without needing a real exporter.

use std::sync::Arc;
use std::time::Duration;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use consejo::store::MemoryBlobStore;
use consejo::telemetry;
use consejo::{AdviceEngine, AdviceRequest, ProviderTokens};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn engine_for(primary: &MockServer, secondary: &MockServer, cap: u32) -> AdviceEngine {
    AdviceEngine::builder()
        .static_tokens(ProviderTokens::new(vec!["hf_a".into()], None))
        .blob_store(Arc::new(MemoryBlobStore::new()))
        .primary_base_url(primary.uri())
        .secondary_base_url(secondary.uri())
        .primary_models(vec!["test/modelo".into()])
        .quota_cap(cap)
        .http_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread
/// runtime. `block_in_place` keeps the sync `with_local_recorder`
/// closure on the current thread while `block_on` drives the inner
/// async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn request_and_attempt_metrics_are_recorded() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let primary = MockServer::start().await;
                let secondary = MockServer::start().await;
                Mock::given(method("POST"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(
                        serde_json::json!([{ "generated_text": "consejo" }]),
                    ))
                    .mount(&primary)
                    .await;

                let engine = engine_for(&primary, &secondary, 3);
                let request = AdviceRequest::new("Beagle").user("u1").pet("p1");
                engine.get_advice(&request).await.unwrap();
                // Second call is a fresh-cache hit.
                engine.get_advice(&request).await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::PROVIDER_ATTEMPTS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn quota_rejection_is_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let primary = MockServer::start().await;
                let secondary = MockServer::start().await;
                Mock::given(method("POST"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(
                        serde_json::json!([{ "generated_text": "consejo" }]),
                    ))
                    .mount(&primary)
                    .await;

                let engine = engine_for(&primary, &secondary, 1);
                let request = AdviceRequest::new("Beagle").user("u1").pet("p1");
                engine.regenerate(&request).await.unwrap();
                let _ = engine.regenerate(&request).await.unwrap_err();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::QUOTA_REJECTIONS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn corrupt_store_reset_is_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let blob = Arc::new(MemoryBlobStore::with_blob(
            consejo::store::BLOB_KEY,
            "{corrupt",
        ));
        let store = consejo::store::CacheStore::load(blob);
        assert!(store.is_empty());
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::STORE_RESETS_TOTAL), 1);
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "generated_text": "consejo" }])),
        )
        .mount(&primary)
        .await;

    let engine = engine_for(&primary, &secondary, 3);
    engine
        .get_advice(&AdviceRequest::new("Beagle").user("u1").pet("p1"))
        .await
        .unwrap();
}
