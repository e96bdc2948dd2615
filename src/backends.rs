/*!
 * Collaborator traits used by the pipeline.
 *
 * The pipeline never talks to a network service or spawns an encoder
 * directly; it holds these traits as `Arc<dyn ...>` so concrete clients and
 * test doubles are interchangeable.
 */

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{PipelineError, ProviderError};

/// Translates one narration segment
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Translate `text` into `target_language` (an ISO code)
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError>;
}

/// Turns narration text into encoded audio
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes, ProviderError>;
}

/// Produces per-slide video segments and joins them
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Render a still `image` for the length of `audio` into `output`
    async fn render_segment(&self, image: &Path, audio: &Path, output: &Path) -> Result<PathBuf, PipelineError>;

    /// Concatenate `inputs` in the given order into `output`
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf, PipelineError>;
}

/// Slides and speaker notes fetched from a presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPresentation {
    pub slides: Vec<PathBuf>,
    pub notes: Vec<String>,
}

/// Source of slide images and their narration
#[async_trait]
pub trait PresentationSource: Send + Sync {
    /// Fetch `presentation_id`, writing slide images into `slides_dir`
    async fn fetch(&self, presentation_id: &str, slides_dir: &Path) -> anyhow::Result<FetchedPresentation>;
}
