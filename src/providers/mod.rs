/*!
 * Provider implementations for the hosted and local model services.
 *
 * This module contains client implementations for the services slidecast talks to:
 * - Ollama: Local LLM server (translation)
 * - OpenAI: OpenAI API integration (translation and speech), also used for LM Studio
 * - Anthropic: Anthropic API integration (translation)
 *
 * All clients share the retry loop and client-side rate limiter defined here.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};

use log::{error, warn};
use rand::Rng;
use tokio::sync::Mutex;

use crate::errors::ProviderError;

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably in the translation service.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Client-side limit on requests per minute
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// `None` or zero disables limiting
    pub fn new(requests_per_minute: Option<u32>) -> Self {
        let interval = requests_per_minute
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64));
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until the next request slot is free
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let wait = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next_slot).max(now);
            *next_slot = slot + interval;
            slot - now
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Retry settings shared by every client
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff_base_ms: 1000 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self { max_retries, backoff_base_ms }
    }

    /// Exponential backoff for the given (1-based) attempt, plus up to 25% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = if base >= 4 { rand::rng().random_range(0..=base / 4) } else { 0 };
        Duration::from_millis(base + jitter)
    }
}

/// Turn a non-success HTTP response into a provider error
pub async fn error_from_response(service: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let message = response.text().await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());

    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationError(format!("{} rejected credentials: {}", service, message)),
        429 => ProviderError::RateLimitExceeded(format!("{}: {}", service, message)),
        code => ProviderError::ApiError { status_code: code, message },
    }
}

/// Send a request until it succeeds, fails permanently, or retries run out.
///
/// `send` is called once per attempt; every attempt waits for the rate limiter.
pub async fn send_with_retry<F, Fut>(
    service: &str,
    policy: RetryPolicy,
    limiter: &RateLimiter,
    send: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;

    loop {
        limiter.acquire().await;

        let error = match send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => error_from_response(service, response).await,
            Err(e) if e.is_timeout() => ProviderError::ConnectionError(format!("{} request timed out: {}", service, e)),
            Err(e) => ProviderError::ConnectionError(format!("Failed to send request to {}: {}", service, e)),
        };

        attempt += 1;
        if !error.is_retryable() || attempt > policy.max_retries {
            error!("{} request failed after {} attempt(s): {}", service, attempt, error);
            return Err(error);
        }

        let delay = policy.backoff(attempt);
        warn!("{} error: {} - attempt {}/{}, retrying in {:?}", service, error, attempt, policy.max_retries + 1, delay);
        tokio::time::sleep(delay).await;
    }
}

pub mod ollama;
pub mod openai;
pub mod anthropic;
