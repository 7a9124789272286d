//! Model backend abstraction and the retrying invoker.
//!
//! Defines the [`ModelBackend`] trait and two HTTP implementations:
//! - **[`BedrockBackend`]**: Anthropic models on AWS Bedrock (`InvokeModel`,
//!   SigV4-signed).
//! - **[`AnthropicBackend`]**: the Anthropic Messages API directly.
//!
//! [`ModelInvoker`] wraps a backend with the throttling retry policy.
//!
//! # Retry Strategy
//!
//! - Throttled (HTTP 429, Anthropic 529, `ThrottlingException`) → retry with
//!   exponential backoff plus random jitter, up to `max_attempts` attempts
//! - Any other failure → returned to the caller immediately
//! - Backoff: `base × 2^attempt + rand(0..base)`
//!
//! Failures are never turned into empty strings: an empty `Ok` always means
//! the model really answered with nothing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::aws::{self, AwsCredentials, SigV4Request};
use crate::config::ModelConfig;
use crate::error::ModelError;

/// A single request/response call to an LLM.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Returns the model identifier used in logs.
    fn name(&self) -> &str;

    /// Send `prompt` as one user message and return the text of the reply.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError>;
}

/// Create the backend selected by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown providers, missing credentials, or if the
/// HTTP client cannot be built.
pub fn create_backend(config: &ModelConfig) -> Result<Arc<dyn ModelBackend>> {
    match config.provider.as_str() {
        "bedrock" => Ok(Arc::new(BedrockBackend::new(config)?)),
        "anthropic" => Ok(Arc::new(AnthropicBackend::new(config)?)),
        other => anyhow::bail!("Unknown model provider: {}", other),
    }
}

fn http_client(config: &ModelConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build model HTTP client")
}

/// Anthropic messages body shared by both backends.
fn messages_body(prompt: &str, max_tokens: u32, temperature: f32) -> Value {
    json!({
        "max_tokens": max_tokens,
        "temperature": temperature,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

/// Concatenate the `text` blocks of an Anthropic messages response.
fn parse_messages_response(json: &Value) -> Result<String, ModelError> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            ModelError::InvocationFailed("invalid response: missing content array".to_string())
        })?;

    Ok(content
        .iter()
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

/// Map a non-success HTTP status and body to a [`ModelError`].
fn classify_failure(status: reqwest::StatusCode, body: &str) -> ModelError {
    let snippet: String = body.chars().take(500).collect();
    if status.as_u16() == 429
        || status.as_u16() == 529
        || body.contains("ThrottlingException")
        || body.contains("overloaded_error")
    {
        ModelError::Throttled(format!("HTTP {}: {}", status, snippet))
    } else {
        ModelError::InvocationFailed(format!("HTTP {}: {}", status, snippet))
    }
}

async fn read_response(resp: reqwest::Response) -> Result<String, ModelError> {
    let status = resp.status();
    if status.is_success() {
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::InvocationFailed(format!("invalid response body: {}", e)))?;
        return parse_messages_response(&json);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

// ============ Bedrock ============

/// Anthropic models served by AWS Bedrock.
///
/// Calls `POST /model/{model_id}/invoke` on `bedrock-runtime.{region}.amazonaws.com`
/// (or `endpoint_url`), signed with SigV4 for service `bedrock`.
pub struct BedrockBackend {
    client: reqwest::Client,
    creds: AwsCredentials,
    model_id: String,
    region: String,
    scheme: &'static str,
    host: String,
    temperature: f32,
}

impl BedrockBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        Self::with_credentials(config, creds)
    }

    pub fn with_credentials(config: &ModelConfig, creds: AwsCredentials) -> Result<Self> {
        let (scheme, host) = match config.endpoint_url {
            Some(ref endpoint) => (aws::endpoint_scheme(endpoint), aws::endpoint_host(endpoint)),
            None => (
                "https",
                format!("bedrock-runtime.{}.amazonaws.com", config.region),
            ),
        };
        Ok(Self {
            client: http_client(config)?,
            creds,
            model_id: config.model_id.clone(),
            region: config.region.clone(),
            scheme,
            host,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelBackend for BedrockBackend {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let mut body = messages_body(prompt, max_tokens, self.temperature);
        body["anthropic_version"] = json!("bedrock-2023-05-31");
        let payload = serde_json::to_vec(&body)
            .map_err(|e| ModelError::InvocationFailed(e.to_string()))?;

        let encoded_id = aws::uri_encode(&self.model_id);
        // Non-S3 services sign each path segment encoded twice.
        let canonical_uri = format!("/model/{}/invoke", aws::uri_encode(&encoded_id));
        let signed = aws::sign(
            &self.creds,
            &SigV4Request {
                method: "POST",
                host: &self.host,
                canonical_uri: &canonical_uri,
                query: &[],
                payload: &payload,
                region: &self.region,
                service: "bedrock",
            },
        );

        let url = format!("{}://{}/model/{}/invoke", self.scheme, self.host, encoded_id);
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(payload);

        let resp = signed
            .apply(request)
            .send()
            .await
            .map_err(|e| ModelError::InvocationFailed(format!("request to Bedrock failed: {}", e)))?;

        read_response(resp).await
    }
}

// ============ Anthropic API ============

/// The Anthropic Messages API. Requires `ANTHROPIC_API_KEY`.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
}

impl AnthropicBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ModelConfig, api_key: String) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Anthropic API key");
        let base = config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        Ok(Self {
            client: http_client(config)?,
            api_key,
            model: config.model_id.clone(),
            endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let mut body = messages_body(prompt, max_tokens, self.temperature);
        body["model"] = json!(self.model);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ModelError::InvocationFailed(format!("request to Anthropic API failed: {}", e))
            })?;

        read_response(resp).await
    }
}

// ============ Invoker ============

/// A backend plus the throttling retry policy. Cheap to clone.
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    max_attempts: u32,
    base_delay: Duration,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn ModelBackend>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Call the model, retrying only while it reports throttling.
    ///
    /// Returns the last `Throttled` error once `max_attempts` calls have been
    /// throttled; any other failure is returned on first occurrence.
    pub async fn invoke(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let mut attempt = 0u32;
        loop {
            match self.backend.complete(prompt, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_throttled() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        model = self.backend.name(),
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "model throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(model = self.backend.name(), attempt = attempt + 1, "model call failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let exp = base_ms.saturating_mul(1u64 << attempt.min(10));
        let jitter = rand::thread_rng().gen_range(0..base_ms);
        Duration::from_millis(exp.saturating_add(jitter))
    }
}
