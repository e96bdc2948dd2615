use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{send_with_retry, Provider, RateLimiter, RetryPolicy};
use crate::errors::ProviderError;

/// Default public API base URL
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// OpenAI client, also used for OpenAI-compatible servers such as LM Studio
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL, including the `/v1` suffix
    endpoint: String,
    /// Retry settings
    retry: RetryPolicy,
    /// Client-side request pacing
    limiter: RateLimiter,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,

    /// The conversation so far
    messages: Vec<OpenAIMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage reported by the API
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

/// Text-to-speech request for `/audio/speech`
#[derive(Debug, Clone, Serialize)]
pub struct SpeechRequest {
    /// Speech model, e.g. `tts-1-hd`
    model: String,
    /// Text to speak
    input: String,
    /// Voice name, e.g. `onyx`
    voice: String,
    /// Audio container, e.g. `mp3`
    response_format: String,
    /// Playback speed (0.25 to 4.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

impl OpenAIRequest {
    /// Create a new chat request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl SpeechRequest {
    pub fn new(model: impl Into<String>, input: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            voice: voice.into(),
            response_format: "mp3".to_string(),
            speed: None,
        }
    }

    pub fn response_format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }
}

impl OpenAI {
    /// Create a new OpenAI client with default retry settings
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new_with_config(api_key, endpoint, 3, 1000, None, 60)
    }

    /// Create a new OpenAI client with retry, rate limit and timeout settings
    pub fn new_with_config(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        max_retries: u32,
        backoff_base_ms: u64,
        rate_limit: Option<u32>,
        timeout_secs: u64,
    ) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs.max(1)))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() { DEFAULT_ENDPOINT.to_string() } else { endpoint },
            retry: RetryPolicy::new(max_retries, backoff_base_ms),
            limiter: RateLimiter::new(rate_limit),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }

    /// Complete a chat request
    pub async fn complete(&self, request: OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        let url = self.url("chat/completions");
        let response = send_with_retry("OpenAI", self.retry, &self.limiter, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
        })
        .await?;

        response
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse OpenAI response: {}", e)))
    }

    /// Synthesize speech, returning the encoded audio bytes
    pub async fn speech(&self, request: SpeechRequest) -> Result<Bytes, ProviderError> {
        let url = self.url("audio/speech");
        let response = send_with_retry("OpenAI speech", self.retry, &self.limiter, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
        })
        .await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read speech audio: {}", e)))?;
        if audio.is_empty() {
            return Err(ProviderError::ParseError("OpenAI speech returned no audio".to_string()));
        }
        Ok(audio)
    }

    /// List models, used as a cheap connectivity check
    pub async fn list_models(&self) -> Result<(), ProviderError> {
        let url = self.url("models");
        send_with_retry("OpenAI", RetryPolicy::new(0, 0), &self.limiter, || {
            self.client.get(&url).bearer_auth(&self.api_key).send()
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Provider for OpenAI {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        OpenAI::complete(self, request).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.list_models().await
    }

    fn extract_text(response: &Self::Response) -> String {
        response
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default()
    }
}
