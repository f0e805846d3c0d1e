//! Provider credential loading.
//!
//! Credentials live in an external document store (the deployment
//! writes them; this crate only reads). The engine pulls them through a
//! [`TokenSource`] and keeps the result in a 5-minute in-process TTL
//! cache. Fetch errors are never cached, so a transient outage of the
//! token document retries on the next request — and without credentials
//! the engine fails closed ([`ConsejoError::NoCredentials`]) instead of
//! calling providers with empty bearer tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{ConsejoError, Result};

/// How long fetched tokens are reused before a fresh fetch.
pub const TOKEN_CACHE_TTL: Duration = Duration::from_secs(300);

/// Resolved provider credentials.
///
/// `primary` is ordered: the chain tries tokens front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTokens {
    /// Primary-provider tokens, in priority order.
    pub primary: Vec<String>,
    /// Secondary-provider token, if configured.
    pub secondary: Option<String>,
}

impl ProviderTokens {
    /// Build a token set, dropping empty strings.
    pub fn new(primary: Vec<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into_iter().filter(|t| !t.is_empty()).collect(),
            secondary: secondary.filter(|t| !t.is_empty()),
        }
    }
}

/// Source of provider credentials.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch the current token set.
    ///
    /// Must fail (not return an empty set) when no primary token is
    /// available — the engine treats that as a deployment problem.
    async fn fetch(&self) -> Result<ProviderTokens>;
}

/// Fixed in-process tokens, for tests and embedding applications that
/// manage credentials themselves.
pub struct StaticTokenSource {
    tokens: ProviderTokens,
}

impl StaticTokenSource {
    /// Wrap an already-resolved token set.
    pub fn new(tokens: ProviderTokens) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch(&self) -> Result<ProviderTokens> {
        if self.tokens.primary.is_empty() {
            return Err(ConsejoError::NoCredentials);
        }
        Ok(self.tokens.clone())
    }
}

/// Wire shape of the remote token document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDocument {
    hf_token: Option<String>,
    hf_token_backup: Option<String>,
    cohere_token: Option<String>,
}

/// Token source backed by an HTTP document endpoint returning the named
/// token fields as JSON.
pub struct HttpTokenSource {
    http: Client,
    url: String,
}

impl HttpTokenSource {
    /// Fetch tokens from `url` with the given per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> Result<ProviderTokens> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ConsejoError::Configuration(format!("token fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ConsejoError::Configuration(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let doc: TokenDocument = response
            .json()
            .await
            .map_err(|e| ConsejoError::Configuration(format!("token document malformed: {e}")))?;

        let tokens = ProviderTokens::new(
            [doc.hf_token, doc.hf_token_backup]
                .into_iter()
                .flatten()
                .collect(),
            doc.cohere_token,
        );

        if tokens.primary.is_empty() {
            return Err(ConsejoError::NoCredentials);
        }
        debug!(
            primary = tokens.primary.len(),
            secondary = tokens.secondary.is_some(),
            "fetched provider tokens"
        );
        Ok(tokens)
    }
}

/// TTL-caching decorator over any [`TokenSource`].
///
/// Successful fetches are reused for [`TOKEN_CACHE_TTL`]; errors are
/// never cached. Concurrent callers share a single in-flight fetch.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    cache: moka::future::Cache<(), ProviderTokens>,
}

impl CachedTokenSource {
    /// Cache `inner` with the default 5-minute TTL.
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self::with_ttl(inner, TOKEN_CACHE_TTL)
    }

    /// Cache `inner` with a custom TTL.
    pub fn with_ttl(inner: Arc<dyn TokenSource>, ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Current tokens, from cache or a fresh fetch.
    pub async fn get(&self) -> Result<ProviderTokens> {
        let inner = Arc::clone(&self.inner);
        self.cache
            .try_get_with((), async move { inner.fetch().await })
            .await
            .map_err(|e: Arc<ConsejoError>| match &*e {
                ConsejoError::NoCredentials => ConsejoError::NoCredentials,
                other => ConsejoError::Configuration(other.to_string()),
            })
    }
}
