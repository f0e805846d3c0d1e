//! Telemetry metric name constants.
//!
//! Centralised metric names for consejo operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `consejo_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation` — engine entry point ("get_advice" | "regenerate")
//! - `source` — outcome origin: "primary" | "secondary" | "unavailable" | "cache"
//! - `provider` — provider attempted ("primary" | "secondary")
//! - `outcome` — per-attempt result: "ok" | "skip" | "error"

/// Total advice requests served through the engine.
///
/// Labels: `operation`, `source`.
pub const REQUESTS_TOTAL: &str = "consejo_requests_total";

/// End-to-end request duration in seconds.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "consejo_request_duration_seconds";

/// Individual provider attempts made by the chain driver.
///
/// Labels: `provider`, `outcome` ("ok" | "skip" | "error").
pub const PROVIDER_ATTEMPTS_TOTAL: &str = "consejo_provider_attempts_total";

/// Fresh-entry cache hits that short-circuited generation.
pub const CACHE_HITS_TOTAL: &str = "consejo_cache_hits_total";

/// Cache misses that went on to the provider chain.
pub const CACHE_MISSES_TOTAL: &str = "consejo_cache_misses_total";

/// Requests rejected by the quota guard before any network activity.
pub const QUOTA_REJECTIONS_TOTAL: &str = "consejo_quota_rejections_total";

/// Times the persisted store was reset after failing to load.
pub const STORE_RESETS_TOTAL: &str = "consejo_store_resets_total";
