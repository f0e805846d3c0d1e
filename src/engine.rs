//! The advice engine — public entry point over quota, cache, topics,
//! and the provider chain.
//!
//! One [`AdviceEngine`] instance owns the cache store and serves every
//! caller. A request flows: quota guard → fresh-cache short-circuit
//! (skipped by [`regenerate`](AdviceEngine::regenerate)) → topic
//! selection → prompt build + sanitize → credentials → provider chain →
//! append + persist.
//!
//! # Concurrency
//!
//! check-quota → generate → append is serialized **per cache key** with
//! an async mutex held across the provider call, so two concurrent
//! generations for the same (user, pet, breed) cannot both pass the
//! quota check and overshoot the monthly cap. Requests for different
//! keys proceed concurrently; read-only calls never take a key lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::credentials::{
    CachedTokenSource, HttpTokenSource, ProviderTokens, StaticTokenSource, TOKEN_CACHE_TTL,
    TokenSource,
};
use crate::providers::{CohereClient, HuggingFaceClient, ProviderChain};
use crate::quota::{self, DEFAULT_QUOTA_CAP, QuotaStatus};
use crate::store::{AdviceEntry, AdviceSource, BlobStore, CacheKey, CacheStore, FileBlobStore};
use crate::topic::Season;
use crate::{ConsejoError, Result, prompt, telemetry, topic};

/// How long the most recent entry for a key is reused instead of
/// generating again.
pub const DEFAULT_REUSE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default per-request HTTP timeout for provider and token calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One advice request.
///
/// ```rust
/// use consejo::AdviceRequest;
///
/// let request = AdviceRequest::new("Golden Retriever")
///     .user("u1")
///     .pet("p1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdviceRequest {
    /// Free-text breed name; normalized internally.
    pub breed: String,
    /// Owner id; `None` means anonymous (unlimited, no history).
    pub user_id: Option<String>,
    /// Pet id; `None` means no pet selected.
    pub pet_id: Option<String>,
    /// Fixed topic; when absent the selector rotates one in.
    pub topic: Option<String>,
    /// Full prompt override; bypasses the prompt builder (still
    /// sanitized).
    pub prompt_override: Option<String>,
}

impl AdviceRequest {
    /// Request advice for a breed.
    pub fn new(breed: impl Into<String>) -> Self {
        Self {
            breed: breed.into(),
            ..Self::default()
        }
    }

    /// Attach the owner id.
    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Attach the pet id.
    pub fn pet(mut self, id: impl Into<String>) -> Self {
        self.pet_id = Some(id.into());
        self
    }

    /// Pin the topic instead of letting the selector rotate one.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Replace the built prompt entirely.
    pub fn prompt_override(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_override = Some(prompt.into());
        self
    }
}

/// What a request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AdviceOutcome {
    /// Advice text (or the unavailable sentinel).
    pub text: String,
    /// Topic it was generated for.
    pub topic: String,
    /// Origin: primary, secondary, or unavailable. Cache hits carry the
    /// source of the cached entry.
    pub source: AdviceSource,
}

/// The advice caching & quota engine.
pub struct AdviceEngine {
    store: CacheStore,
    chain: ProviderChain,
    tokens: CachedTokenSource,
    quota_cap: u32,
    reuse_ttl: Duration,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for AdviceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdviceEngine")
            .field("quota_cap", &self.quota_cap)
            .field("reuse_ttl", &self.reuse_ttl)
            .finish_non_exhaustive()
    }
}

impl AdviceEngine {
    /// Create a builder for configuring an engine.
    pub fn builder() -> AdviceEngineBuilder {
        AdviceEngineBuilder::new()
    }

    /// Generate (or reuse) advice for a request.
    ///
    /// Returns a fresh cached entry when one exists within the reuse
    /// TTL — no quota consumed, no network. Otherwise generates through
    /// the provider chain and appends the result to the history.
    ///
    /// # Errors
    ///
    /// [`ConsejoError::QuotaExceeded`] when the monthly cap is reached,
    /// [`ConsejoError::NoCredentials`]/[`ConsejoError::Configuration`]
    /// when no provider credentials can be loaded. Provider failures
    /// are never errors: total exhaustion yields an outcome with
    /// [`AdviceSource::Unavailable`].
    #[instrument(skip(self, request), fields(operation = "get_advice"))]
    pub async fn get_advice(&self, request: &AdviceRequest) -> Result<AdviceOutcome> {
        self.run(request, "get_advice", false).await
    }

    /// Same as [`get_advice`](Self::get_advice) but always generates,
    /// ignoring any fresh cached entry.
    #[instrument(skip(self, request), fields(operation = "regenerate"))]
    pub async fn regenerate(&self, request: &AdviceRequest) -> Result<AdviceOutcome> {
        self.run(request, "regenerate", true).await
    }

    /// Billable generations left this calendar month for a (user, pet)
    /// pair.
    pub fn remaining_quota(&self, user: Option<&str>, pet: Option<&str>) -> u32 {
        self.quota_status(user, pet).remaining
    }

    /// Full quota snapshot for a (user, pet) pair. Read-only.
    pub fn quota_status(&self, user: Option<&str>, pet: Option<&str>) -> QuotaStatus {
        quota::check(&self.store, user, pet, self.quota_cap)
    }

    /// Advice history for a (user, pet) pair, most recent first, across
    /// all breeds.
    pub fn history(&self, user: Option<&str>, pet: Option<&str>) -> Vec<AdviceEntry> {
        self.store.history(user, pet)
    }

    /// Remove every record for a (user, pet) pair; quota resets to the
    /// full cap as a consequence. Returns the number of records
    /// removed.
    pub fn clear_history(&self, user: Option<&str>, pet: Option<&str>) -> usize {
        self.store.clear_for(user, pet)
    }

    async fn run(
        &self,
        request: &AdviceRequest,
        operation: &'static str,
        bypass_cache: bool,
    ) -> Result<AdviceOutcome> {
        let user = request.user_id.as_deref();
        let pet = request.pet_id.as_deref();
        let key = CacheKey::new(&request.breed, user, pet);

        let _guard = self.lock_key(&key).await;
        let start = Instant::now();

        let status = quota::check(&self.store, user, pet, self.quota_cap);
        if !status.allowed {
            metrics::counter!(telemetry::QUOTA_REJECTIONS_TOTAL).increment(1);
            return Err(ConsejoError::QuotaExceeded {
                used: status.used,
                cap: status.cap,
                message: status.message,
            });
        }

        if !bypass_cache {
            if let Some(entry) = self.store.fresh(&key, self.reuse_ttl) {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Self::record_request(operation, "cache", start);
                debug!(key = %key, "serving fresh cached advice");
                return Ok(AdviceOutcome {
                    text: entry.text,
                    topic: entry.topic,
                    source: entry.source,
                });
            }
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        }

        let topic = match request.topic.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(topic) => topic.trim().to_string(),
            None => {
                // Topic history is per-(user, pet); anonymous callers
                // have none, so their first draw always succeeds.
                let used = if user.is_some() && pet.is_some() {
                    self.store.used_topics(user, pet)
                } else {
                    Vec::new()
                };
                topic::select_topic(key.breed(), &used, Season::current(), &mut rand::thread_rng())
            }
        };

        let prompt_text = match &request.prompt_override {
            Some(p) => p.clone(),
            None => prompt::build_prompt(request.breed.trim(), &topic),
        };
        let prompt_text = prompt::sanitize(&prompt_text, prompt::MAX_PROMPT_CHARS);

        // Fail closed: no credentials means no generation at all.
        let tokens = self.tokens.get().await?;

        let generated = self.chain.generate(&prompt_text, &tokens).await;
        let entry = AdviceEntry::new(generated.text.clone(), topic.clone(), generated.source);
        self.store.append(&key, entry);

        Self::record_request(operation, generated.source.as_str(), start);
        Ok(AdviceOutcome {
            text: generated.text,
            topic,
            source: generated.source,
        })
    }

    /// Per-key serialization guard (see module docs).
    async fn lock_key(&self, key: &CacheKey) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock().expect("key lock map poisoned");
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    fn record_request(operation: &'static str, source: &'static str, start: Instant) {
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => operation,
            "source" => source,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "operation" => operation,
        )
        .record(start.elapsed().as_secs_f64());
    }
}

/// Builder for configuring engine instances.
pub struct AdviceEngineBuilder {
    token_source: Option<Arc<dyn TokenSource>>,
    token_url: Option<String>,
    token_cache_ttl: Duration,
    blob: Option<Arc<dyn BlobStore>>,
    primary_base_url: Option<String>,
    secondary_base_url: Option<String>,
    primary_models: Option<Vec<String>>,
    secondary_model: Option<String>,
    quota_cap: u32,
    reuse_ttl: Duration,
    http_timeout: Duration,
}

impl AdviceEngineBuilder {
    /// Start from defaults.
    pub fn new() -> Self {
        Self {
            token_source: None,
            token_url: None,
            token_cache_ttl: TOKEN_CACHE_TTL,
            blob: None,
            primary_base_url: None,
            secondary_base_url: None,
            primary_models: None,
            secondary_model: None,
            quota_cap: DEFAULT_QUOTA_CAP,
            reuse_ttl: DEFAULT_REUSE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Use a custom token source (overrides
    /// [`token_url`](Self::token_url)).
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Fetch tokens from an HTTP document endpoint.
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Use fixed in-process tokens.
    pub fn static_tokens(self, tokens: ProviderTokens) -> Self {
        self.token_source(Arc::new(StaticTokenSource::new(tokens)))
    }

    /// Override how long fetched tokens are reused (default 5 minutes).
    pub fn token_cache_ttl(mut self, ttl: Duration) -> Self {
        self.token_cache_ttl = ttl;
        self
    }

    /// Persist through a custom blob store (default: a file under
    /// `~/.cache/consejo/`).
    pub fn blob_store(mut self, blob: Arc<dyn BlobStore>) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Override the primary provider base URL (for testing with
    /// wiremock).
    pub fn primary_base_url(mut self, url: impl Into<String>) -> Self {
        self.primary_base_url = Some(url.into());
        self
    }

    /// Override the secondary provider base URL.
    pub fn secondary_base_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_base_url = Some(url.into());
        self
    }

    /// Override the primary model candidate list.
    pub fn primary_models(mut self, models: Vec<String>) -> Self {
        self.primary_models = Some(models);
        self
    }

    /// Override the secondary model.
    pub fn secondary_model(mut self, model: impl Into<String>) -> Self {
        self.secondary_model = Some(model.into());
        self
    }

    /// Monthly cap on billable generations per (user, pet). Default 3.
    pub fn quota_cap(mut self, cap: u32) -> Self {
        self.quota_cap = cap;
        self
    }

    /// How long cached entries are reused. Default 24 hours.
    pub fn reuse_ttl(mut self, ttl: Duration) -> Self {
        self.reuse_ttl = ttl;
        self
    }

    /// Per-request HTTP timeout. Default 30 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Build the engine, loading (and migrating) the persisted cache.
    ///
    /// # Errors
    ///
    /// [`ConsejoError::Configuration`] when no token source is
    /// configured.
    pub fn build(self) -> Result<AdviceEngine> {
        let source = match (self.token_source, self.token_url) {
            (Some(source), _) => source,
            (None, Some(url)) => {
                Arc::new(HttpTokenSource::new(url, self.http_timeout)) as Arc<dyn TokenSource>
            }
            (None, None) => {
                return Err(ConsejoError::Configuration(
                    "no token source configured".to_string(),
                ));
            }
        };

        let blob = self
            .blob
            .unwrap_or_else(|| Arc::new(FileBlobStore::default()));
        let store = CacheStore::load(blob);

        let primary = match self.primary_base_url {
            Some(url) => HuggingFaceClient::with_base_url(url, self.http_timeout),
            None => HuggingFaceClient::new(self.http_timeout),
        };
        let secondary = match self.secondary_base_url {
            Some(url) => CohereClient::with_base_url(url, self.http_timeout),
            None => CohereClient::new(self.http_timeout),
        };

        let mut chain = ProviderChain::new(primary, secondary);
        if let Some(models) = self.primary_models {
            chain = chain.with_primary_models(models);
        }
        if let Some(model) = self.secondary_model {
            chain = chain.with_secondary_model(model);
        }

        Ok(AdviceEngine {
            store,
            chain,
            tokens: CachedTokenSource::with_ttl(source, self.token_cache_ttl),
            quota_cap: self.quota_cap,
            reuse_ttl: self.reuse_ttl,
            key_locks: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for AdviceEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
