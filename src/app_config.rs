use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::cache::CacheKeying;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language of `data/texts.txt` (ISO)
    #[serde(default = "default_input_language")]
    pub input_language: String,

    /// Languages to produce videos for (ISO)
    #[serde(default = "default_output_languages")]
    pub output_languages: Vec<String>,

    /// Project directory holding `data/`
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Text-to-speech config
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Video encoder config
    #[serde(default)]
    pub video: VideoConfig,

    /// Scheduling and cache config
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Remote presentation config
    #[serde(default)]
    pub presentation: PresentationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    Ollama,
    // @provider: OpenAI
    #[default]
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    // @returns: Environment variable consulted when no API key is configured
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::LMStudio => None,
        }
    }

    // @returns: Whether the provider is a hosted API that needs a key
    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max concurrent requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let (model, endpoint, timeout_secs, rate_limit) = match provider_type {
            TranslationProvider::Ollama => (
                default_ollama_model(),
                default_ollama_endpoint(),
                default_local_timeout_secs(),
                None,
            ),
            TranslationProvider::OpenAI => (
                default_openai_model(),
                default_openai_endpoint(),
                default_timeout_secs(),
                Some(60),
            ),
            // Anthropic allows 50 requests per minute on the standard tier
            TranslationProvider::Anthropic => (
                default_anthropic_model(),
                default_anthropic_endpoint(),
                default_timeout_secs(),
                Some(45),
            ),
            TranslationProvider::LMStudio => (
                default_lmstudio_model(),
                default_lmstudio_endpoint(),
                default_local_timeout_secs(),
                None,
            ),
        };

        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            concurrent_requests: default_concurrent_requests(),
            timeout_secs,
            rate_limit,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Speech response formats ffmpeg can read back from a file extension
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "opus", "aac", "flac", "wav"];

/// Text-to-speech configuration (OpenAI `/audio/speech`)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_model")]
    pub model: String,

    #[serde(default = "default_speech_voice")]
    pub voice: String,

    /// Audio container returned by the API, also the extension of audio artifacts
    #[serde(default = "default_speech_format")]
    pub response_format: String,

    /// API key; falls back to `OPENAI_API_KEY`
    #[serde(default = "String::new")]
    pub api_key: String,

    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Requests per minute
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: default_speech_model(),
            voice: default_speech_voice(),
            response_format: default_speech_format(),
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            timeout_secs: default_speech_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit: None,
        }
    }
}

impl SpeechConfig {
    /// The configured key, or `OPENAI_API_KEY`
    pub fn get_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("OPENAI_API_KEY").unwrap_or_default()
    }
}

/// ffmpeg configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoConfig {
    /// ffmpeg executable, looked up on PATH when not absolute
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_ffmpeg_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_ffmpeg_timeout_secs(),
        }
    }
}

/// Fan-out limits and cache keying
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_concurrent_languages")]
    pub max_concurrent_languages: usize,

    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// Cancel remaining work after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default)]
    pub cache_keying: CacheKeying,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_languages: default_max_concurrent_languages(),
            max_concurrent_segments: default_max_concurrent_segments(),
            fail_fast: false,
            cache_keying: CacheKeying::default(),
        }
    }
}

/// Google Slides source configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PresentationConfig {
    /// Presentation to fetch before running; local slides are used when unset
    #[serde(default)]
    pub google_slides_id: Option<String>,

    /// OAuth client file downloaded from the Google console; falls back to `GOOGLE_OAUTH_CREDENTIALS`
    #[serde(default)]
    pub oauth_client_path: Option<PathBuf>,

    /// Where the OAuth token is cached; defaults to the user config dir
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

impl PresentationConfig {
    pub fn get_oauth_client_path(&self) -> Option<PathBuf> {
        self.oauth_client_path
            .clone()
            .or_else(|| std::env::var_os("GOOGLE_OAUTH_CREDENTIALS").map(PathBuf::from))
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_input_language() -> String {
    "en".to_string()
}

fn default_output_languages() -> Vec<String> {
    vec!["en".to_string(), "fr".to_string()]
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_local_timeout_secs() -> u64 {
    120
}

fn default_speech_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_concurrent_languages() -> usize {
    2
}

fn default_max_concurrent_segments() -> usize {
    4
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffmpeg_timeout_secs() -> u64 {
    600
}

fn default_speech_model() -> String {
    "tts-1-hd".to_string()
}

fn default_speech_voice() -> String {
    "onyx".to_string()
}

fn default_speech_format() -> String {
    "mp3".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_lmstudio_endpoint() -> String {
    // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
    "http://localhost:1234/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_lmstudio_model() -> String {
    // Placeholder; users should set to the loaded model name in LM Studio
    "local-model".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional translator. Translate the following narration from {source_language} to {target_language}. Return only the translation, without quotes or commentary.".to_string()
}

impl Config {
    /// Load a config file, writing the defaults there first when it does not exist
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
        Ok((config, true))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::validate_language_code(&self.input_language)
            .context("Invalid input language")?;

        if self.output_languages.is_empty() {
            return Err(anyhow!("At least one output language is required"));
        }
        for language in &self.output_languages {
            crate::language_utils::validate_language_code(language)
                .with_context(|| format!("Invalid output language '{}'", language))?;
        }

        if self.pipeline.max_concurrent_languages == 0 || self.pipeline.max_concurrent_segments == 0 {
            return Err(anyhow!("Concurrency limits must be at least 1"));
        }

        let needs_translation = self.output_languages.iter().any(|l| l != &self.input_language);
        if needs_translation && self.translation.provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for {} provider",
                self.translation.provider.display_name()
            ));
        }

        let format = self.speech.response_format.to_lowercase();
        if !SUPPORTED_AUDIO_FORMATS.contains(&format.as_str()) {
            return Err(anyhow!(
                "Unsupported speech response format '{}' (expected one of: {})",
                self.speech.response_format,
                SUPPORTED_AUDIO_FORMATS.join(", ")
            ));
        }

        if self.speech.get_api_key().is_empty() {
            return Err(anyhow!("Speech API key is required (speech.api_key or OPENAI_API_KEY)"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            input_language: default_input_language(),
            output_languages: default_output_languages(),
            project_root: default_project_root(),
            translation: TranslationConfig::default(),
            speech: SpeechConfig::default(),
            video: VideoConfig::default(),
            pipeline: PipelineConfig::default(),
            presentation: PresentationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    pub fn optimal_concurrent_requests(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.concurrent_requests)
            .unwrap_or_else(default_concurrent_requests)
    }

    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }
        ProviderConfig::new(self.provider.clone()).model
    }

    /// Get the API key for the active provider, falling back to the provider's environment variable
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        self.provider
            .api_key_env()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }
        ProviderConfig::new(self.provider.clone()).endpoint
    }

    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        match self.get_active_provider_config() {
            Some(provider_config) => provider_config.rate_limit,
            None => ProviderConfig::new(self.provider.clone()).rate_limit,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
