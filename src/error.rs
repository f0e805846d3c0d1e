//! Consejo error types

use std::time::Duration;

/// Consejo error types
#[derive(Debug, thiserror::Error)]
pub enum ConsejoError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty response from model")]
    EmptyResponse,

    // Configuration errors
    //
    // Missing credentials are a deployment problem, not a provider
    // outage: surfaced as an error instead of the unavailable sentinel
    // so the caller can tell the two apart.
    #[error("no provider credentials available")]
    NoCredentials,

    #[error("configuration error: {0}")]
    Configuration(String),

    // Quota errors
    /// Monthly generation cap reached for this (user, pet) pair.
    ///
    /// The message is user-facing; callers are expected to disable the
    /// generate action until the next calendar month.
    #[error("{message}")]
    QuotaExceeded { used: u32, cap: u32, message: String },

    // Persistence errors
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ConsejoError {
    /// Whether this error is transient from the provider chain's point of
    /// view — the chain advances to the next attempt instead of aborting.
    ///
    /// Auth failures are excluded: they are permanent for a credential
    /// and skip all of that credential's remaining models.
    pub fn is_transient(&self) -> bool {
        match self {
            ConsejoError::Http(_) | ConsejoError::RateLimited { .. } => true,
            ConsejoError::Api { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            }
            ConsejoError::EmptyResponse => true,
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ConsejoError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for consejo operations
pub type Result<T> = std::result::Result<T, ConsejoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(
            ConsejoError::Api {
                status: 503,
                message: "loading".into()
            }
            .is_transient()
        );
        assert!(ConsejoError::Http("connection reset".into()).is_transient());
    }

    #[test]
    fn auth_and_config_errors_are_permanent() {
        assert!(!ConsejoError::AuthenticationFailed.is_transient());
        assert!(!ConsejoError::NoCredentials.is_transient());
        assert!(
            !ConsejoError::Api {
                status: 404,
                message: "missing".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn retry_after_only_from_rate_limit() {
        let e = ConsejoError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ConsejoError::AuthenticationFailed.retry_after(), None);
    }
}
