/*!
 * Error types for the slidecast application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether the request that produced this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) | Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors produced by a single unit of pipeline work
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A file could not be created, read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A translation or synthesis backend call failed
    #[error("{stage} failed for segment {ordinal}: {source}")]
    Backend {
        stage: PipelineStage,
        ordinal: usize,
        #[source]
        source: ProviderError,
    },

    /// The external encoder exited unsuccessfully
    #[error("Encoding failed: {message}")]
    Encoding { message: String },

    /// Slides, narration or audio counts disagree for a language
    #[error("{what} count mismatch for '{language}': expected {expected}, found {actual}")]
    ShapeMismatch {
        language: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The run was cancelled before this item finished
    #[error("Cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Wrap an I/O error together with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Wrap a backend error for the given stage and ordinal
    pub fn backend(stage: PipelineStage, ordinal: usize, source: ProviderError) -> Self {
        Self::Backend { stage, ordinal, source }
    }

    /// Short label for the error class, used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Backend { .. } => "backend",
            Self::Encoding { .. } => "encoding",
            Self::ShapeMismatch { .. } => "shape",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from configuration loading or validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
