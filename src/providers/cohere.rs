//! Cohere generate-endpoint client — the secondary provider.
//!
//! One credential, one model, one request: the chain falls through to
//! this client only after the whole primary plan is exhausted.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{ConsejoError, Result};

/// Default base URL for the Cohere API.
const DEFAULT_BASE_URL: &str = "https://api.cohere.ai";

/// Client for Cohere's `/v1/generate` endpoint.
#[derive(Clone)]
pub struct CohereClient {
    http: Client,
    base_url: String,
}

impl CohereClient {
    /// Create a client against the public API.
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Run one generation request.
    pub async fn generate(&self, prompt: &str, token: &str, model: &str) -> Result<String> {
        let url = format!("{}/v1/generate", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&GenerateRequest {
                model,
                prompt,
                max_tokens: 300,
                temperature: 0.7,
                stop_sequences: &[],
            })
            .send()
            .await
            .map_err(|e| ConsejoError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => ConsejoError::AuthenticationFailed,
                404 => ConsejoError::ModelNotFound(model.to_string()),
                code => ConsejoError::Api {
                    status: code,
                    message: format!("Cohere API error: {status}"),
                },
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ConsejoError::Http(e.to_string()))?;

        let text = body
            .generations
            .into_iter()
            .next()
            .map(|g| g.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ConsejoError::EmptyResponse);
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stop_sequences: &'a [&'a str],
}

#[derive(Deserialize)]
struct GenerateResponse {
    generations: Vec<Generation>,
}

#[derive(Deserialize)]
struct Generation {
    text: String,
}
