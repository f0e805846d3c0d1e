//! Provider chain with fallback semantics.
//!
//! Generation runs through an ordered **attempt plan**: every
//! (credential, model) pair for the primary provider, then the single
//! secondary attempt. One driver loop walks the plan; per-attempt
//! outcomes decide how far to skip:
//!
//! - success → return immediately, tagged with the attempt's source
//! - model not found / transient error → next attempt
//! - auth failure → abandon every remaining model for that credential
//! - plan exhausted → the static unavailable sentinel, which is a
//!   normal terminal state, never an error, and never billed
//!
//! Adding a third provider means extending [`Attempt`] and the plan —
//! a data change, not new control flow.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use super::cohere::CohereClient;
use super::huggingface::HuggingFaceClient;
use crate::credentials::ProviderTokens;
use crate::store::AdviceSource;
use crate::telemetry;

/// Primary-provider model identifiers, in priority order.
///
/// Free-tier text models come and go; a long candidate list maximises
/// the chance one of them answers.
pub const PRIMARY_MODELS: &[&str] = &[
    "google/gemma-2-2b-it",
    "mistralai/Mistral-7B-Instruct-v0.3",
    "Qwen/Qwen2.5-1.5B-Instruct",
    "microsoft/Phi-3-mini-4k-instruct",
    "HuggingFaceH4/zephyr-7b-beta",
    "tiiuae/falcon-7b-instruct",
    "google/flan-t5-large",
    "bigscience/bloomz-560m",
    "gpt2",
];

/// Secondary-provider model identifier.
pub const SECONDARY_MODEL: &str = "command-light";

/// Static payload returned when every provider attempt failed.
pub const UNAVAILABLE_TEXT: &str =
    "El servicio de consejos no está disponible en este momento. Inténtalo de nuevo en unos minutos.";

/// One step of the fallback plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Primary provider with the credential at `credential` (an index
    /// into [`ProviderTokens::primary`]) and one model.
    Primary { credential: usize, model: String },
    /// Secondary provider, single credential.
    Secondary,
}

/// Outcome of a chain run. `source` is [`AdviceSource::Unavailable`]
/// when the plan was exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAdvice {
    /// Generated (or sentinel) text.
    pub text: String,
    /// Which provider produced it.
    pub source: AdviceSource,
}

/// The ordered fallback chain over both providers.
pub struct ProviderChain {
    primary: HuggingFaceClient,
    secondary: CohereClient,
    primary_models: Vec<String>,
    secondary_model: String,
}

impl ProviderChain {
    /// Build a chain over the given clients with the default model
    /// lists.
    pub fn new(primary: HuggingFaceClient, secondary: CohereClient) -> Self {
        Self {
            primary,
            secondary,
            primary_models: PRIMARY_MODELS.iter().map(|m| m.to_string()).collect(),
            secondary_model: SECONDARY_MODEL.to_string(),
        }
    }

    /// Override the primary model candidate list.
    pub fn with_primary_models(mut self, models: Vec<String>) -> Self {
        self.primary_models = models;
        self
    }

    /// Override the secondary model.
    pub fn with_secondary_model(mut self, model: impl Into<String>) -> Self {
        self.secondary_model = model.into();
        self
    }

    /// Materialise the attempt plan for a token set.
    pub fn plan(&self, tokens: &ProviderTokens) -> Vec<Attempt> {
        let mut plan = Vec::with_capacity(tokens.primary.len() * self.primary_models.len() + 1);
        for credential in 0..tokens.primary.len() {
            for model in &self.primary_models {
                plan.push(Attempt::Primary {
                    credential,
                    model: model.clone(),
                });
            }
        }
        if tokens.secondary.is_some() {
            plan.push(Attempt::Secondary);
        }
        plan
    }

    /// Run the plan until one attempt succeeds.
    ///
    /// Never returns an error: total exhaustion yields the unavailable
    /// sentinel. Individual attempt failures are logged and consumed
    /// here, not surfaced.
    #[instrument(skip(self, prompt, tokens), fields(operation = "generate"))]
    pub async fn generate(&self, prompt: &str, tokens: &ProviderTokens) -> GeneratedAdvice {
        let start = Instant::now();
        let mut dead_credentials: HashSet<usize> = HashSet::new();

        for attempt in self.plan(tokens) {
            match &attempt {
                Attempt::Primary { credential, model } => {
                    if dead_credentials.contains(credential) {
                        Self::record_attempt("primary", "skip");
                        continue;
                    }
                    let token = &tokens.primary[*credential];
                    match self.primary.generate(prompt, token, model).await {
                        Ok(text) => {
                            Self::record_attempt("primary", "ok");
                            debug!(
                                model = %model,
                                credential,
                                elapsed_ms = start.elapsed().as_millis() as u64,
                                "primary generation succeeded"
                            );
                            return GeneratedAdvice {
                                text,
                                source: AdviceSource::Primary,
                            };
                        }
                        Err(crate::ConsejoError::AuthenticationFailed) => {
                            Self::record_attempt("primary", "error");
                            warn!(credential, "primary credential rejected, skipping its remaining models");
                            dead_credentials.insert(*credential);
                        }
                        Err(e) => {
                            Self::record_attempt("primary", "error");
                            debug!(model = %model, credential, error = %e, "primary attempt failed, advancing");
                        }
                    }
                }
                Attempt::Secondary => {
                    // plan() only emits this when the token exists
                    let token = tokens.secondary.as_deref().unwrap_or_default();
                    match self
                        .secondary
                        .generate(prompt, token, &self.secondary_model)
                        .await
                    {
                        Ok(text) => {
                            Self::record_attempt("secondary", "ok");
                            return GeneratedAdvice {
                                text,
                                source: AdviceSource::Secondary,
                            };
                        }
                        Err(e) => {
                            Self::record_attempt("secondary", "error");
                            debug!(error = %e, "secondary attempt failed");
                        }
                    }
                }
            }
        }

        warn!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "all provider attempts exhausted, returning unavailable sentinel"
        );
        GeneratedAdvice {
            text: UNAVAILABLE_TEXT.to_string(),
            source: AdviceSource::Unavailable,
        }
    }

    fn record_attempt(provider: &'static str, outcome: &'static str) {
        metrics::counter!(telemetry::PROVIDER_ATTEMPTS_TOTAL,
            "provider" => provider,
            "outcome" => outcome,
        )
        .increment(1);
    }
}
