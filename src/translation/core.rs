/*!
 * Core translation service implementation.
 *
 * This module contains the TranslationService struct, which translates one
 * narration segment at a time with whichever provider the configuration
 * selects, and exposes it to the pipeline as a `TranslationBackend`.
 */

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::backends::TranslationBackend;
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::ollama::{GenerationRequest, Ollama};
use crate::providers::openai::{OpenAI, OpenAIRequest};
use crate::providers::Provider;

/// Upper bound on generated tokens for one segment
const MAX_SEGMENT_TOKENS: u32 = 2048;

/// Token usage statistics for tracking API consumption
#[derive(Debug, Clone)]
pub struct TokenUsageStats {
    /// Number of prompt tokens
    pub prompt_tokens: u64,

    /// Number of completion tokens
    pub completion_tokens: u64,

    /// Number of requests sent
    pub requests: u64,

    /// Total time spent waiting on the provider
    pub api_duration: Duration,
}

impl Default for TokenUsageStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenUsageStats {
    /// Create a new empty token usage stats instance
    pub fn new() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            requests: 0,
            api_duration: Duration::ZERO,
        }
    }

    /// Record one request
    pub fn record(&mut self, prompt_tokens: Option<u64>, completion_tokens: Option<u64>, elapsed: Duration) {
        self.prompt_tokens += prompt_tokens.unwrap_or(0);
        self.completion_tokens += completion_tokens.unwrap_or(0);
        self.requests += 1;
        self.api_duration += elapsed;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Generate a one-line summary of token usage
    pub fn summary(&self) -> String {
        format!(
            "{} request(s), {} prompt + {} completion token(s), {:.1}s waiting on the provider",
            self.requests,
            self.prompt_tokens,
            self.completion_tokens,
            self.api_duration.as_secs_f64()
        )
    }
}

/// Parse an endpoint string into host and port
fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    if endpoint.is_empty() {
        return Err(anyhow!("Endpoint cannot be empty"));
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };

    let host = url.host_str()
        .ok_or_else(|| anyhow!("Invalid host in endpoint: {}", endpoint))?;
    let port = url.port().unwrap_or(if url.scheme() == "https" { 443 } else { 80 });

    Ok((format!("{}://{}", url.scheme(), host), port))
}

/// Fill the `{source_language}` / `{target_language}` placeholders with language names
pub fn render_system_prompt(template: &str, source_language: &str, target_language: &str) -> String {
    let source = language_utils::get_language_name(source_language).unwrap_or_else(|_| source_language.to_string());
    let target = language_utils::get_language_name(target_language).unwrap_or_else(|_| target_language.to_string());
    template
        .replace("{source_language}", &source)
        .replace("{target_language}", &target)
}

/// Trim model output and drop one pair of wrapping quotes the source did not have
pub fn clean_translation(source: &str, translated: &str) -> String {
    let trimmed = translated.trim();
    let source = source.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('«', '»')] {
        let wrapped = trimmed.len() >= 2 && trimmed.starts_with(open) && trimmed.ends_with(close);
        if wrapped && !(source.starts_with(open) && source.ends_with(close)) {
            let inner = &trimmed[open.len_utf8()..trimmed.len() - close.len_utf8()];
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Translation provider implementation variants
#[derive(Debug)]
enum TranslationProviderImpl {
    /// Ollama LLM service
    Ollama { client: Ollama },
    /// OpenAI API service
    OpenAI { client: OpenAI },
    /// LM Studio local server (OpenAI-compatible)
    LMStudio { client: OpenAI },
    /// Anthropic API service
    Anthropic { client: Anthropic },
}

/// Translation service for narration segments
#[derive(Debug)]
pub struct TranslationService {
    /// Provider implementation
    provider: TranslationProviderImpl,

    /// Configuration for the translation service
    pub config: TranslationConfig,

    /// Language of the text handed to `translate`
    source_language: String,

    usage: Mutex<TokenUsageStats>,

    /// Caps in-flight provider requests at the provider's `concurrent_requests`
    request_permits: Semaphore,

    max_concurrent_requests: usize,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: TranslationConfig, source_language: impl Into<String>) -> Result<Self> {
        let retry_count = config.common.retry_count;
        let retry_backoff_ms = config.common.retry_backoff_ms;
        let rate_limit = config.get_rate_limit();
        let timeout_secs = config.get_timeout_secs();
        let max_concurrent_requests = config.optimal_concurrent_requests().max(1);

        let provider = match config.provider {
            ConfigTranslationProvider::Ollama => {
                let (host, port) = parse_endpoint(&config.get_endpoint())?;
                TranslationProviderImpl::Ollama {
                    client: Ollama::new_with_config(host, port, retry_count, retry_backoff_ms, rate_limit, timeout_secs),
                }
            }
            ConfigTranslationProvider::OpenAI => TranslationProviderImpl::OpenAI {
                client: OpenAI::new_with_config(
                    config.get_api_key(),
                    config.get_endpoint(),
                    retry_count,
                    retry_backoff_ms,
                    rate_limit,
                    timeout_secs,
                ),
            },
            ConfigTranslationProvider::LMStudio => {
                // LM Studio ignores the key but the header must be present
                let api_key = {
                    let k = config.get_api_key();
                    if k.is_empty() { "lm-studio".to_string() } else { k }
                };
                TranslationProviderImpl::LMStudio {
                    client: OpenAI::new_with_config(
                        api_key,
                        config.get_endpoint(),
                        retry_count,
                        retry_backoff_ms,
                        rate_limit,
                        timeout_secs,
                    ),
                }
            }
            ConfigTranslationProvider::Anthropic => TranslationProviderImpl::Anthropic {
                client: Anthropic::new_with_config(
                    config.get_api_key(),
                    config.get_endpoint(),
                    retry_count,
                    retry_backoff_ms,
                    rate_limit,
                    timeout_secs,
                ),
            },
        };

        Ok(Self {
            provider,
            config,
            source_language: source_language.into(),
            usage: Mutex::new(TokenUsageStats::new()),
            request_permits: Semaphore::new(max_concurrent_requests),
            max_concurrent_requests,
        })
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    /// Most provider requests this service keeps in flight at once
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    /// Snapshot of token usage so far
    pub fn usage(&self) -> TokenUsageStats {
        self.usage.lock().clone()
    }

    /// Test the connection to the translation provider
    pub async fn test_connection(&self) -> Result<()> {
        info!(
            "Testing connection to {} with model {}",
            self.config.provider.display_name(),
            self.config.get_model()
        );

        let result = match &self.provider {
            TranslationProviderImpl::Ollama { client } => client.version().await.map(|version| {
                debug!("Ollama version {}", version);
            }),
            TranslationProviderImpl::OpenAI { client } | TranslationProviderImpl::LMStudio { client } => {
                client.test_connection().await
            }
            TranslationProviderImpl::Anthropic { client } => client.test_connection().await,
        };

        result.map_err(|e| anyhow!("Failed to connect to {}: {}", self.config.provider.display_name(), e))
    }

    /// Translate one segment of narration
    pub async fn translate_text(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let system_prompt = render_system_prompt(&self.config.common.system_prompt, &self.source_language, target_language);
        let model = self.config.get_model();
        let temperature = self.config.common.temperature;
        let _permit = self
            .request_permits
            .acquire()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let started = Instant::now();

        let (raw, prompt_tokens, completion_tokens) = match &self.provider {
            TranslationProviderImpl::Ollama { client } => {
                let request = GenerationRequest::new(&model, text)
                    .system(system_prompt)
                    .temperature(temperature);
                let response = client.complete(request).await?;
                (Ollama::extract_text(&response), response.prompt_eval_count, response.eval_count)
            }
            TranslationProviderImpl::OpenAI { client } | TranslationProviderImpl::LMStudio { client } => {
                let request = OpenAIRequest::new(&model)
                    .add_message("system", system_prompt)
                    .add_message("user", text)
                    .temperature(temperature)
                    .max_tokens(MAX_SEGMENT_TOKENS);
                let response = client.complete(request).await?;
                let usage = response.usage.as_ref();
                (
                    OpenAI::extract_text(&response),
                    usage.map(|u| u.prompt_tokens as u64),
                    usage.map(|u| u.completion_tokens as u64),
                )
            }
            TranslationProviderImpl::Anthropic { client } => {
                let request = AnthropicRequest::new(&model, MAX_SEGMENT_TOKENS)
                    .system(system_prompt)
                    .add_message("user", text)
                    .temperature(temperature);
                let response = client.complete(request).await?;
                let usage = response.usage.as_ref();
                (
                    Anthropic::extract_text(&response),
                    usage.map(|u| u.input_tokens as u64),
                    usage.map(|u| u.output_tokens as u64),
                )
            }
        };

        self.usage.lock().record(prompt_tokens, completion_tokens, started.elapsed());

        let translated = clean_translation(text, &raw);
        if translated.is_empty() {
            return Err(ProviderError::ParseError(format!(
                "{} returned an empty translation",
                self.config.provider.display_name()
            )));
        }
        Ok(translated)
    }
}

#[async_trait]
impl TranslationBackend for TranslationService {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        self.translate_text(text, target_language).await
    }
}
