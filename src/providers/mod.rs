//! Provider clients and the fallback chain.
//!
//! Two HTTP clients — [`HuggingFaceClient`] (primary, many models ×
//! several credentials) and [`CohereClient`] (secondary, one shot) —
//! plus [`ProviderChain`], the data-driven attempt plan that walks them
//! in priority order until something answers.

pub mod chain;
pub mod cohere;
pub mod huggingface;

pub use chain::{
    Attempt, GeneratedAdvice, PRIMARY_MODELS, ProviderChain, SECONDARY_MODEL, UNAVAILABLE_TEXT,
};
pub use cohere::CohereClient;
pub use huggingface::HuggingFaceClient;
