//! Consejo - caching and quota engine for AI-generated pet care advice
//!
//! This crate fronts two remote text-generation providers with an
//! ordered fallback chain, keeps every generated advice entry in a
//! persistent append-only cache, and enforces a monthly per-(user, pet)
//! quota derived from that log rather than a counter that could drift.
//!
//! # Example
//!
//! ```rust,no_run
//! use consejo::{AdviceEngine, AdviceRequest};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> consejo::Result<()> {
//!     let engine = AdviceEngine::builder()
//!         .token_url("https://config.example.com/tokens.json")
//!         .build()?;
//!
//!     let outcome = engine
//!         .get_advice(&AdviceRequest::new("Golden Retriever").user("u1").pet("p1"))
//!         .await?;
//!
//!     println!("[{}] {}: {}", outcome.source, outcome.topic, outcome.text);
//!     println!("quedan {} este mes", engine.remaining_quota(Some("u1"), Some("p1")));
//!     Ok(())
//! }
//! ```
//!
//! # Outcome states
//!
//! A caller distinguishes four states, never one generic failure:
//! advice returned (from cache or a provider), quota exhausted
//! ([`ConsejoError::QuotaExceeded`] — wait for next month), temporarily
//! unavailable (an outcome with [`AdviceSource::Unavailable`] — retry
//! soon, no quota spent), and misconfiguration
//! ([`ConsejoError::NoCredentials`] — a deployment problem).

pub mod credentials;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod prompt;
pub mod providers;
pub mod quota;
pub mod store;
pub mod telemetry;
pub mod topic;

// Re-export main types at crate root
pub use credentials::{CachedTokenSource, HttpTokenSource, ProviderTokens, StaticTokenSource,
    TokenSource};
pub use engine::{AdviceEngine, AdviceEngineBuilder, AdviceOutcome, AdviceRequest};
pub use error::{ConsejoError, Result};
pub use providers::{GeneratedAdvice, ProviderChain, UNAVAILABLE_TEXT};
pub use quota::{DEFAULT_QUOTA_CAP, QuotaStatus};
pub use store::{AdviceEntry, AdviceSource, BlobStore, CacheKey, CacheRecord, CacheStore,
    FileBlobStore, MemoryBlobStore};
pub use topic::Season;
