/*!
 * Pipeline orchestrator.
 *
 * Loads the slides and the input narration once, then drives every output
 * language through translation, speech synthesis, segment rendering and
 * concatenation. Languages run concurrently up to a limit; a language that
 * fails stops at that stage while the others carry on.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::backends::{SpeechBackend, TranslationBackend, VideoEncoder};
use crate::cache::{GateStats, ProjectLayout};
use crate::errors::PipelineError;
use crate::file_utils::FileManager;
use crate::narration::{self, LanguageSet};

use super::report::{LanguageReport, RunReport, StageFailure};
use super::scheduler::{FanOut, WorkOutcome};
use super::stages::{self, StageContext, StageFailed};
use super::PipelineStage;

/// Called whenever a language enters a stage
pub type ProgressCallback = Arc<dyn Fn(&str, PipelineStage) + Send + Sync>;

/// The collaborators a run talks to
#[derive(Clone)]
pub struct Backends {
    pub translator: Arc<dyn TranslationBackend>,
    pub speech: Arc<dyn SpeechBackend>,
    pub encoder: Arc<dyn VideoEncoder>,
}

impl Backends {
    pub fn new(
        translator: Arc<dyn TranslationBackend>,
        speech: Arc<dyn SpeechBackend>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        Self { translator, speech, encoder }
    }
}

/// Languages and concurrency settings for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub input_language: String,
    pub output_languages: Vec<String>,
    pub max_concurrent_languages: usize,
    pub max_concurrent_segments: usize,
    pub fail_fast: bool,
}

impl PipelineOptions {
    pub fn new(input_language: impl Into<String>, output_languages: Vec<String>) -> Self {
        Self {
            input_language: input_language.into(),
            output_languages,
            max_concurrent_languages: 2,
            max_concurrent_segments: 4,
            fail_fast: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            input_language: config.input_language.clone(),
            output_languages: config.output_languages.clone(),
            max_concurrent_languages: config.pipeline.max_concurrent_languages,
            max_concurrent_segments: config.pipeline.max_concurrent_segments,
            fail_fast: config.pipeline.fail_fast,
        }
    }

    pub fn concurrency(mut self, languages: usize, segments: usize) -> Self {
        self.max_concurrent_languages = languages;
        self.max_concurrent_segments = segments;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Output languages without duplicates, in the order given
    fn unique_output_languages(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for language in &self.output_languages {
            if !seen.contains(language) {
                seen.push(language.clone());
            }
        }
        seen
    }
}

/// Incremental narrated-video pipeline for one project directory
pub struct Pipeline {
    layout: ProjectLayout,
    backends: Backends,
    options: PipelineOptions,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(layout: ProjectLayout, backends: Backends, options: PipelineOptions) -> Self {
        Self {
            layout,
            backends,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use an externally owned root token, e.g. one cancelled on Ctrl-C
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Slide images in numeric order
    pub fn load_slides(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = self.layout.slides_dir();
        if !FileManager::dir_exists(&dir) {
            return Err(PipelineError::io(
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "slides directory not found"),
            ));
        }
        FileManager::find_numbered_files(&dir, "png")
            .map_err(|e| PipelineError::io(&dir, std::io::Error::other(e.to_string())))
    }

    /// Input-language narration from `data/texts.txt`
    pub fn load_input(&self) -> Result<LanguageSet, PipelineError> {
        narration::load_language_set(&self.layout.input_texts(), &self.options.input_language)
    }

    /// Run every output language to completion or failure.
    ///
    /// Only a failure to load the shared inputs is returned as an error; all
    /// per-language problems are reported in the `RunReport`. Each run works
    /// under a child of the root token, so failing fast ends only that run.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let slides = self.load_slides()?;
        let input = self.load_input()?;
        info!(
            "Loaded {} slide(s) and {} '{}' segment(s)",
            slides.len(),
            input.len(),
            input.language
        );

        let stats = GateStats::new();
        let cancel = self.cancel.child_token();
        let languages = self.options.unique_output_languages();
        let language_fan_out = FanOut::new(self.options.max_concurrent_languages, cancel.clone())
            .interrupt_in_flight(false);
        let segment_fan_out = FanOut::new(self.options.max_concurrent_segments, cancel)
            .fail_fast(self.options.fail_fast);

        let (input_ref, slides_ref, stats_ref, segments_ref) = (&input, slides.as_slice(), &stats, &segment_fan_out);
        let outcomes = language_fan_out
            .run(languages.clone(), move |_, language| async move {
                Ok::<_, PipelineError>(self.run_language(&language, input_ref, slides_ref, stats_ref, segments_ref).await)
            })
            .await;

        let reports: Vec<LanguageReport> = outcomes
            .into_iter()
            .zip(languages)
            .map(|(outcome, language)| match outcome {
                WorkOutcome::Completed(report) => report,
                WorkOutcome::Failed(error) => LanguageReport::failed(
                    language,
                    PipelineStage::Loaded,
                    PipelineStage::Loaded,
                    vec![StageFailure::new(PipelineStage::Loaded, None, &error)],
                ),
                WorkOutcome::Cancelled => {
                    LanguageReport::cancelled(language, PipelineStage::Loaded, PipelineStage::Loaded, Vec::new())
                }
            })
            .collect();

        let report = RunReport {
            languages: reports,
            gate: stats.snapshot(),
            elapsed: started.elapsed(),
        };

        if report.is_success() {
            info!("All {} language(s) completed in {:.2?}", report.languages.len(), report.elapsed);
        } else {
            warn!("Languages not completed: {}", report.failed_languages().join(", "));
        }
        Ok(report)
    }

    fn enter(&self, language: &str, stage: PipelineStage) {
        if let Some(progress) = &self.progress {
            progress(language, stage);
        }
    }

    /// Stop a language at `failed.stage`, cancelling the run when failing fast
    fn stop(&self, fan_out: &FanOut, language: &str, reached: PipelineStage, failed: StageFailed) -> LanguageReport {
        if failed.cancelled && failed.failures.iter().all(|f| f.kind == "cancelled") {
            warn!("[{}] cancelled during {}", language, failed.stage);
            return LanguageReport::cancelled(language, failed.stage, reached, failed.failures);
        }

        error!("[{}] {} failed for {} item(s)", language, failed.stage, failed.failures.len());
        let cancel = fan_out.cancel_token();
        if self.options.fail_fast && !cancel.is_cancelled() {
            cancel.cancel();
        }
        LanguageReport::failed(language, failed.stage, reached, failed.failures)
    }

    async fn run_language(
        &self,
        language: &str,
        input: &LanguageSet,
        slides: &[PathBuf],
        stats: &GateStats,
        fan_out: &FanOut,
    ) -> LanguageReport {
        self.enter(language, PipelineStage::Loaded);
        if let Err(error) = self.layout.ensure_language_dirs(language) {
            return self.stop(
                fan_out,
                language,
                PipelineStage::Loaded,
                StageFailed {
                    stage: PipelineStage::Loaded,
                    failures: vec![StageFailure::new(PipelineStage::Loaded, None, &error)],
                    cancelled: false,
                },
            );
        }

        let ctx = StageContext {
            layout: &self.layout,
            backends: &self.backends,
            stats,
            fan_out,
            language,
        };

        self.enter(language, PipelineStage::Translated);
        let set = match stages::translate(&ctx, input, &self.options.input_language).await {
            Ok(set) => set,
            Err(failed) => return self.stop(fan_out, language, PipelineStage::Loaded, failed),
        };

        self.enter(language, PipelineStage::AudioSynthesized);
        let audio = match stages::synthesize(&ctx, &set).await {
            Ok(audio) => audio,
            Err(failed) => return self.stop(fan_out, language, PipelineStage::Translated, failed),
        };

        if let Err(error) = stages::check_shape(language, slides, &set, &audio) {
            let stage = PipelineStage::SegmentsRendered;
            return self.stop(
                fan_out,
                language,
                PipelineStage::AudioSynthesized,
                StageFailed {
                    stage,
                    failures: vec![StageFailure::new(stage, None, &error)],
                    cancelled: false,
                },
            );
        }

        self.enter(language, PipelineStage::SegmentsRendered);
        let segments = match stages::render(&ctx, slides, &audio).await {
            Ok(segments) => segments,
            Err(failed) => return self.stop(fan_out, language, PipelineStage::AudioSynthesized, failed),
        };

        self.enter(language, PipelineStage::Concatenated);
        match stages::concatenate(&ctx, &segments).await {
            Ok(output) => LanguageReport::completed(language, output),
            Err(failed) => self.stop(fan_out, language, PipelineStage::SegmentsRendered, failed),
        }
    }
}
