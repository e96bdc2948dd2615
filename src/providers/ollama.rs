use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{send_with_retry, Provider, RateLimiter, RetryPolicy};
use crate::errors::ProviderError;

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    /// How long to keep the model loaded in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub model: String,
    /// Generated text
    #[serde(default)]
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            stream: Some(false),
            keep_alive: None,
        }
    }

    /// Set the system message
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Cap the number of generated tokens
    pub fn num_predict(mut self, num_predict: u32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).num_predict = Some(num_predict);
        self
    }

    /// Set how long to keep the model loaded
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// Build a base URL from a host that may or may not carry a scheme or port
fn base_url(host: &str, port: u16) -> String {
    match host.split_once("://") {
        Some((scheme, rest)) if rest.contains(':') => format!("{}://{}", scheme, rest.trim_end_matches('/')),
        Some((scheme, rest)) => format!("{}://{}:{}", scheme, rest.trim_end_matches('/'), port),
        None => format!("http://{}:{}", host, port),
    }
}

/// Parse a generate response, tolerating servers that stream JSON lines anyway
fn parse_generation(body: &str) -> Result<GenerationResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<GenerationResponse>(body) {
        return Ok(response);
    }

    let mut merged = GenerationResponse::default();
    let mut parsed_any = false;
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let chunk: GenerationResponse = serde_json::from_str(line)
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Ollama response line: {}", e)))?;
        merged.model = chunk.model;
        merged.response.push_str(&chunk.response);
        merged.done = chunk.done;
        merged.prompt_eval_count = chunk.prompt_eval_count.or(merged.prompt_eval_count);
        merged.eval_count = chunk.eval_count.or(merged.eval_count);
        parsed_any = true;
    }

    if parsed_any {
        Ok(merged)
    } else {
        Err(ProviderError::ParseError("Empty Ollama response".to_string()))
    }
}

impl Ollama {
    /// Create a new Ollama client with default retry settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::new_with_config(host, port, 3, 1000, None, 120)
    }

    /// Create a new Ollama client with configuration
    ///
    /// Ollama speaks HTTP/1.1, so the client is pinned to it.
    pub fn new_with_config(
        host: impl Into<String>,
        port: u16,
        max_retries: u32,
        backoff_base_ms: u64,
        rate_limit: Option<u32>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url(&host.into(), port),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs.max(1)))
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            retry: RetryPolicy::new(max_retries, backoff_base_ms),
            limiter: RateLimiter::new(rate_limit),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text from the Ollama API with retry logic
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = send_with_retry("Ollama", self.retry, &self.limiter, || {
            self.client.post(&url).json(&request).send()
        })
        .await?;

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read Ollama response: {}", e)))?;
        let parsed = parse_generation(&body)?;
        debug!(
            "Ollama generated {} token(s) from {} prompt token(s)",
            parsed.eval_count.unwrap_or(0),
            parsed.prompt_eval_count.unwrap_or(0)
        );
        Ok(parsed)
    }

    /// Get the Ollama API version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = send_with_retry("Ollama", RetryPolicy::new(0, 0), &self.limiter, || {
            self.client.get(&url).send()
        })
        .await?
        .json()
        .await
        .map_err(|e| ProviderError::ParseError(format!("Failed to parse Ollama version response: {}", e)))?;

        response["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError("Invalid version format in response".to_string()))
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = GenerationRequest;
    type Response = GenerationResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        self.generate(request).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.version().await.map(|_| ())
    }

    fn extract_text(response: &Self::Response) -> String {
        response.response.trim().to_string()
    }
}
