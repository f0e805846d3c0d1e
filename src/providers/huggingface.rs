//! HuggingFace Inference API client for text generation.
//!
//! This client uses HuggingFace's serverless inference endpoints.
//! See: <https://huggingface.co/docs/api-inference/index>
//!
//! Free-tier endpoints are unreliable per model (cold starts,
//! deprecations), so the chain driver calls this client once per
//! (credential, model) pair and interprets the error variants to decide
//! what to try next.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{ConsejoError, Result};

/// Default base URL for the HuggingFace Inference API.
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Client for the HuggingFace text-generation endpoint.
///
/// Credentials are passed per call: the chain iterates several tokens
/// over one client instance.
#[derive(Clone)]
pub struct HuggingFaceClient {
    http: Client,
    base_url: String,
}

impl HuggingFaceClient {
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

    /// Run one generation request against a (token, model) pair.
    ///
    /// Returns the generated text, or a classified error for the chain
    /// driver: `ModelNotFound` (try next model), `AuthenticationFailed`
    /// (abandon this token), transient `Api`/`Http` (try next model).
    pub async fn generate(&self, prompt: &str, token: &str, model: &str) -> Result<String> {
        let url = format!("{}/models/{}", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&GenerateRequest {
                inputs: prompt,
                parameters: GenerateParameters {
                    max_new_tokens: 250,
                    temperature: 0.7,
                    do_sample: true,
                    return_full_text: false,
                },
                options: RequestOptions {
                    wait_for_model: true,
                    use_cache: false,
                },
            })
            .send()
            .await
            .map_err(|e| ConsejoError::Http(e.to_string()))?;

        self.handle_response_errors(&response, model)?;

        let completions: Vec<Completion> = response
            .json()
            .await
            .map_err(|e| ConsejoError::Http(e.to_string()))?;

        let text = completions
            .into_iter()
            .next()
            .and_then(|c| c.generated_text.or(c.text))
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ConsejoError::EmptyResponse);
        }
        Ok(text)
    }

    /// Check response status and map to the appropriate error.
    fn handle_response_errors(&self, response: &reqwest::Response, model: &str) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(ConsejoError::AuthenticationFailed),
            404 => Err(ConsejoError::ModelNotFound(model.to_string())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ConsejoError::RateLimited { retry_after })
            }
            503 => Err(ConsejoError::Api {
                status: 503,
                message: "model is loading or unavailable".to_string(),
            }),
            code => Err(ConsejoError::Api {
                status: code,
                message: format!("HuggingFace API error: {status}"),
            }),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
    options: RequestOptions,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
    use_cache: bool,
}

/// Success responses are an array of completions; older models use
/// `text` instead of `generated_text`.
#[derive(Deserialize)]
struct Completion {
    generated_text: Option<String>,
    text: Option<String>,
}
