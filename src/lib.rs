/*!
 * # slidecast - narrated slide videos in every language
 *
 * Turns a folder of slide images and a narration script into one narrated
 * video per output language, redoing only the work whose inputs changed.
 *
 * ## Features
 *
 * - Translate narration with various AI providers:
 *   - Ollama (local LLM)
 *   - OpenAI API
 *   - Anthropic API
 * - Synthesize speech per slide with the OpenAI speech endpoint
 * - Render and join per-slide segments with ffmpeg
 * - Reuse translations, audio and segments across runs through content fingerprints
 * - Fetch slides and speaker notes from Google Slides
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Main application controller
 * - `backends`: Seams for translation, speech, video and presentation sources
 * - `cache`: Fingerprints, sidecar hash records and the reuse gate
 * - `narration`: The `texts.txt` narration format
 * - `pipeline`: Per-language stage orchestration
 * - `translation`: AI-powered narration translation
 * - `speech`: Text-to-speech backend
 * - `video`: ffmpeg segment rendering and concatenation
 * - `presentation`: Local and Google Slides presentation sources
 * - `providers`: Client implementations for various LLM providers
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod backends;
pub mod cache;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod narration;
pub mod pipeline;
pub mod presentation;
pub mod providers;
pub mod speech;
pub mod translation;
pub mod video;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use backends::{PresentationSource, SpeechBackend, TranslationBackend, VideoEncoder};
pub use cache::{CacheKeying, ProjectLayout};
pub use errors::{AppError, PipelineError, ProviderError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use narration::{LanguageSet, Segment};
pub use pipeline::{Backends, Pipeline, PipelineOptions, PipelineStage, RunReport};
pub use translation::TranslationService;
