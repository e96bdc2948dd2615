use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::backends::PresentationSource;
use crate::cache::ProjectLayout;
use crate::file_utils::FileManager;
use crate::narration::{self, LanguageSet};
use crate::pipeline::orchestrator::ProgressCallback;
use crate::pipeline::{Backends, Pipeline, PipelineOptions, PipelineStage, RunReport};
use crate::presentation::{FileCredentialStore, GoogleAuthorizer, GoogleSlidesSource, OAuthClient};
use crate::speech::SpeechService;
use crate::translation::TranslationService;
use crate::video::FfmpegEncoder;

// @module: Application controller for narrated video generation

/// Stages shown on each language's progress bar
const STAGE_COUNT: u64 = 5;

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Project paths derived from the configuration
    layout: ProjectLayout,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let layout = ProjectLayout::new(config.project_root.clone(), config.pipeline.cache_keying)
            .with_audio_format(&config.speech.response_format);
        Ok(Self { config, layout })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Fetch the configured presentation (if any), then run every output language
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        if let Some(presentation_id) = self.config.presentation.google_slides_id.clone() {
            self.fetch_google_slides(&presentation_id).await?;
        }

        info!(
            "Translating with {} - {}, voice {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model(),
            self.config.speech.voice
        );

        let translator = Arc::new(
            TranslationService::new(self.config.translation.clone(), self.config.input_language.clone())
                .context("Failed to create translation service")?,
        );
        let encoder = Arc::new(FfmpegEncoder::new(&self.config.video));
        let backends = Backends::new(
            translator.clone(),
            Arc::new(SpeechService::new(&self.config.speech)),
            encoder.clone(),
        );

        let multi_progress = MultiProgress::new();
        let bars = self.language_bars(&multi_progress);
        let pipeline = Pipeline::new(self.layout.clone(), backends, PipelineOptions::from_config(&self.config))
            .with_cancel_token(cancel)
            .with_progress(Self::progress_callback(bars.clone()));

        let slides = pipeline.load_slides().context("Failed to load slides")?;
        if let Some(first) = slides.first() {
            encoder.reference_dimensions(first).await.context("Failed to read slide dimensions")?;
        }

        let report = pipeline.run().await.context("Failed to load project inputs")?;
        Self::finish_bars(&bars, &report);

        let usage = translator.usage();
        if usage.requests > 0 {
            info!("Translation usage: {}", usage.summary());
        }
        for stage in [PipelineStage::Translated, PipelineStage::AudioSynthesized, PipelineStage::SegmentsRendered] {
            let counts = report.counts(stage);
            info!(
                "{}: {} reused, {} recomputed ({:.0}% hit rate)",
                stage,
                counts.hits,
                counts.misses,
                counts.hit_rate() * 100.0
            );
        }

        self.append_run_log(&report);
        info!("Run finished in {}", Self::format_duration(report.elapsed));
        Ok(report)
    }

    /// Download slides and speaker notes, replacing `data/slides` and `data/texts.txt`
    pub async fn fetch_google_slides(&self, presentation_id: &str) -> Result<()> {
        let client_path = self.config.presentation.get_oauth_client_path().ok_or_else(|| {
            anyhow!("No Google OAuth client configured. Set presentation.oauth_client_path or GOOGLE_OAUTH_CREDENTIALS")
        })?;
        let client = OAuthClient::from_file(&client_path)?;

        let token_path = self.config.presentation.token_path.clone()
            .or_else(FileCredentialStore::default_path)
            .ok_or_else(|| anyhow!("Cannot determine where to store the Google OAuth token"))?;
        let authorizer = Arc::new(GoogleAuthorizer::new(client, Arc::new(FileCredentialStore::new(token_path))));

        if !authorizer.has_stored_token()? {
            Self::authorize_interactively(&authorizer).await?;
        }

        let source = GoogleSlidesSource::new(authorizer);
        let fetched = source
            .fetch(presentation_id, &self.layout.slides_dir())
            .await
            .with_context(|| format!("Failed to load Google Slides presentation {}", presentation_id))?;

        let notes = LanguageSet::from_texts(self.config.input_language.clone(), fetched.notes);
        narration::save_language_set(&self.layout.input_texts(), &notes)?;
        info!(
            "Saved {} slide(s) and narration to {}",
            fetched.slides.len(),
            self.layout.input_texts().display()
        );
        Ok(())
    }

    async fn authorize_interactively(authorizer: &GoogleAuthorizer) -> Result<()> {
        let url = authorizer.oauth_client().authorization_url()?;
        eprintln!("\nGoogle Slides authorization required.\n");
        eprintln!("Visit this URL to authorize slidecast:\n\n{}\n", url);
        eprint!("Enter the authorization code: ");
        let _ = std::io::stderr().flush();

        let code = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .context("Authorization prompt failed")?
        .context("Failed to read authorization code")?;

        if code.trim().is_empty() {
            return Err(anyhow!("No authorization code entered"));
        }
        authorizer.exchange_code(&code).await?;
        Ok(())
    }

    fn language_bars(&self, multi_progress: &MultiProgress) -> Arc<Mutex<HashMap<String, ProgressBar>>> {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:>6} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] {prefix} [{bar:30}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let mut bars = HashMap::new();
        for language in &self.config.output_languages {
            if bars.contains_key(language) {
                continue;
            }
            let bar = multi_progress.add(ProgressBar::new(STAGE_COUNT));
            bar.set_style(style.clone().progress_chars("#>-"));
            bar.set_prefix(language.clone());
            bar.set_message("waiting");
            bar.enable_steady_tick(Duration::from_millis(120));
            bars.insert(language.clone(), bar);
        }
        Arc::new(Mutex::new(bars))
    }

    fn progress_callback(bars: Arc<Mutex<HashMap<String, ProgressBar>>>) -> ProgressCallback {
        Arc::new(move |language: &str, stage: PipelineStage| {
            if let Some(bar) = bars.lock().get(language) {
                bar.set_position(stage as u64);
                bar.set_message(stage.display_name());
            }
        })
    }

    fn finish_bars(bars: &Arc<Mutex<HashMap<String, ProgressBar>>>, report: &RunReport) {
        let bars = bars.lock();
        for language_report in &report.languages {
            let Some(bar) = bars.get(&language_report.language) else {
                continue;
            };
            if let Some(output) = language_report.output() {
                bar.set_position(STAGE_COUNT);
                bar.finish_with_message(format!("done: {}", output.display()));
            } else {
                bar.abandon_with_message(format!("stopped at {}", language_report.reached));
            }
        }
    }

    /// Keep a line per run in `data/out/run.log`
    fn append_run_log(&self, report: &RunReport) {
        for line in report.summary().lines() {
            if report.is_success() {
                info!("{}", line);
            } else {
                warn!("{}", line);
            }
        }

        let log_path = self.layout.out_dir().join("run.log");
        if let Err(e) = FileManager::append_to_log_file(&log_path, &report.summary()) {
            error!("Failed to write run log {}: {}", log_path.display(), e);
        }
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
