//! End-to-end engine scenarios: cold start, cache reuse, fallback,
//! outage, quota exhaustion, and history management.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consejo::store::{AdviceSource, BlobStore, MemoryBlobStore};
use consejo::{AdviceEngine, AdviceRequest, ConsejoError, ProviderTokens};

const MODEL: &str = "test/modelo";

fn tokens() -> ProviderTokens {
    ProviderTokens::new(vec!["hf_a".into()], Some("co_key".into()))
}

fn engine_for(
    primary: &MockServer,
    secondary: &MockServer,
    blob: Arc<dyn BlobStore>,
) -> AdviceEngine {
    AdviceEngine::builder()
        .static_tokens(tokens())
        .blob_store(blob)
        .primary_base_url(primary.uri())
        .secondary_base_url(secondary.uri())
        .primary_models(vec![MODEL.into()])
        .http_timeout(Duration::from_secs(5))
        .build()
        .expect("engine should build")
}

async fn mock_primary_success(server: &MockServer, text: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "generated_text": text }])),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn request() -> AdviceRequest {
    AdviceRequest::new("Labrador").user("u1").pet("p1")
}

// ============================================================================
// Cold start and cache reuse
// ============================================================================

#[tokio::test]
async fn cold_start_generates_via_primary_and_spends_one() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo labrador", 1).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    let outcome = engine.get_advice(&request()).await.unwrap();
    assert_eq!(outcome.source, AdviceSource::Primary);
    assert_eq!(outcome.text, "consejo labrador");
    assert!(!outcome.topic.is_empty());

    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 2);
    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 1);
}

#[tokio::test]
async fn fresh_entry_is_reused_without_network_or_quota() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 1).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    let first = engine.get_advice(&request()).await.unwrap();
    let second = engine.get_advice(&request()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 1);
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 2);
}

#[tokio::test]
async fn regenerate_bypasses_fresh_entry() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 2).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    engine.get_advice(&request()).await.unwrap();
    engine.regenerate(&request()).await.unwrap();

    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 2);
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 1);
}

#[tokio::test]
async fn breed_spelling_variants_share_one_stream() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 1).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    engine
        .get_advice(&AdviceRequest::new("Labrador Retriever").user("u1").pet("p1"))
        .await
        .unwrap();
    // Different raw spelling, same normalized breed: fresh hit, no call.
    let again = engine
        .get_advice(&AdviceRequest::new("labrador   retriever!").user("u1").pet("p1"))
        .await
        .unwrap();

    assert_eq!(again.text, "consejo");
    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 1);
}

// ============================================================================
// Fallback and outage
// ============================================================================

#[tokio::test]
async fn primary_404_falls_back_to_secondary_spending_one() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "generations": [{ "text": "respaldo" }]
        })))
        .expect(1)
        .mount(&secondary)
        .await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    let outcome = engine.get_advice(&request()).await.unwrap();
    assert_eq!(outcome.source, AdviceSource::Secondary);
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 2);
}

#[tokio::test]
async fn full_outage_returns_sentinel_and_spends_nothing() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&secondary)
        .await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));
    let before = engine.remaining_quota(Some("u1"), Some("p1"));

    let outcome = engine.regenerate(&request()).await.unwrap();
    assert_eq!(outcome.source, AdviceSource::Unavailable);

    // The sentinel entry is logged but never billed.
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), before);
    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 1);
    assert_eq!(
        engine.history(Some("u1"), Some("p1"))[0].source,
        AdviceSource::Unavailable
    );
}

#[tokio::test]
async fn unavailable_entries_do_not_consume_the_cap() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    // Three total outages first, then a working primary.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&secondary)
        .await;
    mock_primary_success(&primary, "por fin", 1).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    for _ in 0..3 {
        let outcome = engine.regenerate(&request()).await.unwrap();
        assert_eq!(outcome.source, AdviceSource::Unavailable);
    }
    let outcome = engine.regenerate(&request()).await.unwrap();
    assert_eq!(outcome.source, AdviceSource::Primary);

    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 2);
}

// ============================================================================
// Quota
// ============================================================================

#[tokio::test]
async fn quota_exhaustion_rejects_without_network() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    // Exactly the three allowed generations reach the provider.
    mock_primary_success(&primary, "consejo", 3).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    for _ in 0..3 {
        engine.regenerate(&request()).await.unwrap();
    }

    let err = engine.regenerate(&request()).await.unwrap_err();
    match err {
        ConsejoError::QuotaExceeded { used, cap, .. } => {
            assert_eq!(used, 3);
            assert_eq!(cap, 3);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 0);
}

#[tokio::test]
async fn quota_monotonically_decreases() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 3).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    for expected in [2u32, 1, 0] {
        engine.regenerate(&request()).await.unwrap();
        assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), expected);
    }
}

#[tokio::test]
async fn anonymous_callers_are_unlimited() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 5).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    for _ in 0..5 {
        let outcome = engine
            .regenerate(&AdviceRequest::new("Labrador"))
            .await
            .unwrap();
        assert_eq!(outcome.source, AdviceSource::Primary);
    }
}

// ============================================================================
// Topics
// ============================================================================

#[tokio::test]
async fn topics_rotate_without_repetition() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 6).await;

    let engine = AdviceEngine::builder()
        .static_tokens(tokens())
        .blob_store(Arc::new(MemoryBlobStore::new()))
        .primary_base_url(primary.uri())
        .secondary_base_url(secondary.uri())
        .primary_models(vec![MODEL.into()])
        .quota_cap(10)
        .build()
        .unwrap();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..6 {
        let outcome = engine.regenerate(&request()).await.unwrap();
        assert!(
            seen.insert(outcome.topic.clone()),
            "topic repeated before exhaustion: {}",
            outcome.topic
        );
    }
}

#[tokio::test]
async fn pinned_topic_is_respected() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 1).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    let outcome = engine
        .get_advice(&request().topic("salud dental"))
        .await
        .unwrap();
    assert_eq!(outcome.topic, "salud dental");
    assert_eq!(engine.history(Some("u1"), Some("p1"))[0].topic, "salud dental");
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn clear_history_resets_quota_and_spares_others() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 3).await;

    let engine = engine_for(&primary, &secondary, Arc::new(MemoryBlobStore::new()));

    engine.regenerate(&request()).await.unwrap();
    engine.regenerate(&request()).await.unwrap();
    engine
        .regenerate(&AdviceRequest::new("Beagle").user("u2").pet("p9"))
        .await
        .unwrap();

    let removed = engine.clear_history(Some("u1"), Some("p1"));
    assert_eq!(removed, 1);

    assert!(engine.history(Some("u1"), Some("p1")).is_empty());
    assert_eq!(engine.remaining_quota(Some("u1"), Some("p1")), 3);
    assert_eq!(engine.history(Some("u2"), Some("p9")).len(), 1);
}

#[tokio::test]
async fn history_survives_engine_restarts() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    mock_primary_success(&primary, "consejo", 1).await;

    let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    let engine = engine_for(&primary, &secondary, Arc::clone(&blob));
    engine.get_advice(&request()).await.unwrap();
    drop(engine);

    // New engine over the same blob: the fresh entry is served from the
    // reloaded cache, with no further provider calls (expect(1) above).
    let engine = engine_for(&primary, &secondary, blob);
    let outcome = engine.get_advice(&request()).await.unwrap();
    assert_eq!(outcome.text, "consejo");
    assert_eq!(engine.history(Some("u1"), Some("p1")).len(), 1);
}

// ============================================================================
// Configuration failures
// ============================================================================

#[tokio::test]
async fn missing_credentials_fail_closed_before_any_call() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&primary)
        .await;

    let engine = AdviceEngine::builder()
        .static_tokens(ProviderTokens::new(vec![], None))
        .blob_store(Arc::new(MemoryBlobStore::new()))
        .primary_base_url(primary.uri())
        .secondary_base_url(secondary.uri())
        .build()
        .unwrap();

    let err = engine.get_advice(&request()).await.unwrap_err();
    assert!(matches!(err, ConsejoError::NoCredentials));
    assert!(engine.history(Some("u1"), Some("p1")).is_empty());
}

#[test]
fn builder_requires_a_token_source() {
    let err = AdviceEngine::builder().build().unwrap_err();
    assert!(matches!(err, ConsejoError::Configuration(_)));
}
