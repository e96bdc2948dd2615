/*!
 * Stage work for one language.
 *
 * Every stage follows the same shape: load the previous run's sidecar once,
 * gate each ordinal, fan out the misses, join, then persist the digests of
 * the artifacts that were actually produced or reused. Failed ordinals get an
 * empty placeholder in the sidecar so the next run retries exactly those.
 */

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cache::gate::{self, CacheDecision};
use crate::cache::{hash_store, combine, fingerprint_bytes, CacheKeying, GateStats, ProjectLayout, StageDir};
use crate::errors::PipelineError;
use crate::file_utils::FileManager;
use crate::narration::{self, LanguageSet, Segment, SEGMENT_DELIMITER};

use super::orchestrator::Backends;
use super::report::StageFailure;
use super::scheduler::{FanOut, WorkOutcome};
use super::PipelineStage;

/// Everything a stage needs to work on one language
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub layout: &'a ProjectLayout,
    pub backends: &'a Backends,
    pub stats: &'a GateStats,
    pub fan_out: &'a FanOut,
    pub language: &'a str,
}

/// A per-ordinal artifact materialized by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub ordinal: usize,
    pub path: PathBuf,
    pub fingerprint: String,
    /// Produced during this run rather than reused
    pub recomputed: bool,
}

/// A stage that could not materialize every ordinal
#[derive(Debug)]
pub struct StageFailed {
    pub stage: PipelineStage,
    pub failures: Vec<StageFailure>,
    pub cancelled: bool,
}

impl StageFailed {
    fn single(stage: PipelineStage, error: PipelineError) -> Self {
        let cancelled = matches!(error, PipelineError::Cancelled);
        Self {
            stage,
            failures: vec![StageFailure::new(stage, None, &error)],
            cancelled,
        }
    }
}

/// Outcomes of a stage after its barrier
struct Joined<T> {
    items: Vec<Option<T>>,
    failures: Vec<StageFailure>,
    cancelled: usize,
}

impl<T> Joined<T> {
    fn new(stage: PipelineStage, outcomes: Vec<WorkOutcome<T>>) -> Self {
        let mut items = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut cancelled = 0;

        for (ordinal, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                WorkOutcome::Completed(value) => items.push(Some(value)),
                WorkOutcome::Failed(error) => {
                    warn!("{}", StageFailure::new(stage, Some(ordinal), &error));
                    failures.push(StageFailure::new(stage, Some(ordinal), &error));
                    items.push(None);
                }
                WorkOutcome::Cancelled => {
                    cancelled += 1;
                    items.push(None);
                }
            }
        }

        Self { items, failures, cancelled }
    }

    fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }

    fn into_result(self, stage: PipelineStage) -> Result<Vec<T>, StageFailed> {
        if self.is_complete() {
            Ok(self.items.into_iter().flatten().collect())
        } else {
            Err(StageFailed {
                stage,
                failures: self.failures,
                cancelled: self.cancelled > 0,
            })
        }
    }
}

fn ensure_not_cancelled(ctx: &StageContext<'_>, stage: PipelineStage) -> Result<(), StageFailed> {
    if ctx.fan_out.cancel_token().is_cancelled() {
        Err(StageFailed::single(stage, PipelineError::Cancelled))
    } else {
        Ok(())
    }
}

fn load_record(stage: PipelineStage, path: &Path) -> Result<Vec<String>, StageFailed> {
    hash_store::load(path).map_err(|e| StageFailed::single(stage, e))
}

fn save_record(stage: PipelineStage, path: &Path, digests: &[String]) -> Result<(), StageFailed> {
    hash_store::save(path, digests).map_err(|e| StageFailed::single(stage, e))
}

/// Digest per ordinal.
///
/// An ordinal that did not complete keeps its stored digest, since its artifact
/// was never overwritten. It gets an empty placeholder only if nothing was stored.
fn confirmed_digests<T>(
    items: &[Option<T>],
    stored: &[String],
    digest: impl Fn(usize, &T) -> String,
) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(ordinal, item)| match item {
            Some(value) => digest(ordinal, value),
            None => stored.get(ordinal).cloned().unwrap_or_default(),
        })
        .collect()
}

fn gate_positional_or_content(
    keying: CacheKeying,
    ordinal: usize,
    current: &str,
    stored: &[String],
    artifact: &Path,
) -> CacheDecision {
    match keying {
        CacheKeying::Positional => gate::decide(ordinal, current, stored, artifact),
        CacheKeying::Content => gate::decide_content_addressed(artifact),
    }
}

fn previous_translations(path: &Path) -> Result<Vec<String>, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(narration::parse_texts(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Normalized text of a translation unless it would split into several segments in `texts.txt`
fn check_translation(language: &str, text: String) -> Result<String, PipelineError> {
    let pieces = narration::parse_texts(&text).len();
    if text.lines().any(|line| line.trim_end_matches('\r') == SEGMENT_DELIMITER) {
        return Err(PipelineError::ShapeMismatch {
            language: language.to_string(),
            what: "translated segment",
            expected: 1,
            actual: pieces,
        });
    }
    Ok(narration::normalize_segment(&text))
}

async fn translate_segment(
    ctx: &StageContext<'_>,
    stored: &[String],
    previous: &[String],
    texts_path: &Path,
    ordinal: usize,
    segment: Segment,
) -> Result<String, PipelineError> {
    let stage = PipelineStage::Translated;
    let language = ctx.language;
    let source_fingerprint = segment.fingerprint();

    let segment_file = match ctx.layout.keying() {
        CacheKeying::Positional => {
            let cached = previous.get(ordinal);
            let decision =
                gate::decide_with_presence(ordinal, &source_fingerprint, stored, texts_path, cached.is_some());
            ctx.stats.record(stage, &decision);
            if let (CacheDecision::Reuse(_), Some(text)) = (&decision, cached) {
                debug!("[{}] reusing translation of segment {}", language, ordinal);
                return Ok(text.clone());
            }
            None
        }
        CacheKeying::Content => {
            let artifact = ctx.layout.translated_segment(language, &source_fingerprint);
            let decision = gate::decide_content_addressed(&artifact);
            ctx.stats.record(stage, &decision);
            if decision.is_reuse() {
                debug!("[{}] reusing translation {}", language, artifact.display());
                return tokio::fs::read_to_string(&artifact)
                    .await
                    .map_err(|e| PipelineError::io(&artifact, e));
            }
            Some(artifact)
        }
    };

    debug!("[{}] translating segment {}", language, ordinal);
    let translated = ctx
        .backends
        .translator
        .translate(&segment.text, language)
        .await
        .map_err(|e| PipelineError::backend(stage, ordinal, e))?;
    let translated = check_translation(language, translated)?;

    if let Some(artifact) = segment_file {
        FileManager::write_atomic(&artifact, translated.as_bytes()).map_err(|e| PipelineError::io(&artifact, e))?;
    }
    Ok(translated)
}

/// Loaded → Translated.
///
/// The input language passes through. Other languages reuse the previous
/// translation of ordinal `i` when the input fingerprint at `i` is unchanged.
pub async fn translate(
    ctx: &StageContext<'_>,
    source: &LanguageSet,
    input_language: &str,
) -> Result<LanguageSet, StageFailed> {
    let stage = PipelineStage::Translated;
    if ctx.language == input_language {
        return Ok(LanguageSet::new(ctx.language, source.segments.clone()));
    }
    ensure_not_cancelled(ctx, stage)?;

    let language = ctx.language;
    let hashes_path = ctx.layout.hashes_path(language, StageDir::Text);
    let texts_path = ctx.layout.translated_texts(language);

    let stored = load_record(stage, &hashes_path)?;
    let previous = match ctx.layout.keying() {
        CacheKeying::Positional => previous_translations(&texts_path).map_err(|e| StageFailed::single(stage, e))?,
        CacheKeying::Content => Vec::new(),
    };

    let (stored, previous, texts) = (stored.as_slice(), previous.as_slice(), texts_path.as_path());
    let outcomes = ctx
        .fan_out
        .run(source.segments.clone(), move |ordinal, segment| {
            translate_segment(ctx, stored, previous, texts, ordinal, segment)
        })
        .await;

    let joined = Joined::new(stage, outcomes);

    // The text file and its record are replaced together. An ordinal that did not
    // complete keeps its previous text and digest as a pair, or gets placeholders.
    let mut persisted: Vec<&str> = Vec::with_capacity(joined.items.len());
    let mut digests: Vec<String> = Vec::with_capacity(joined.items.len());
    for (ordinal, item) in joined.items.iter().enumerate() {
        match (item, stored.get(ordinal), previous.get(ordinal)) {
            (Some(text), _, _) => {
                persisted.push(text);
                digests.push(source.segments[ordinal].fingerprint());
            }
            (None, Some(digest), Some(text)) => {
                persisted.push(text);
                digests.push(digest.clone());
            }
            (None, _, _) => {
                persisted.push("");
                digests.push(String::new());
            }
        }
    }
    FileManager::write_atomic(&texts_path, narration::serialize_texts(&persisted).as_bytes())
        .map_err(|e| StageFailed::single(stage, PipelineError::io(&texts_path, e)))?;
    save_record(stage, &hashes_path, &digests)?;

    let texts = joined.into_result(stage)?;
    info!("[{}] translated {} segment(s)", language, texts.len());
    Ok(LanguageSet::from_texts(language, texts))
}

async fn synthesize_segment(
    ctx: &StageContext<'_>,
    stored: &[String],
    ordinal: usize,
    segment: Segment,
) -> Result<Artifact, PipelineError> {
    let stage = PipelineStage::AudioSynthesized;
    let language = ctx.language;
    let fingerprint = segment.fingerprint();
    let path = ctx.layout.audio_path(language, ordinal, &fingerprint);

    let decision = gate_positional_or_content(ctx.layout.keying(), ordinal, &fingerprint, stored, &path);
    ctx.stats.record(stage, &decision);
    if let CacheDecision::Reuse(path) = decision {
        debug!("[{}] reusing audio {}", language, path.display());
        return Ok(Artifact { ordinal, path, fingerprint, recomputed: false });
    }

    debug!("[{}] synthesizing segment {}", language, ordinal);
    let audio = ctx
        .backends
        .speech
        .synthesize(&segment.text)
        .await
        .map_err(|e| PipelineError::backend(stage, ordinal, e))?;
    FileManager::write_atomic(&path, &audio).map_err(|e| PipelineError::io(&path, e))?;

    Ok(Artifact { ordinal, path, fingerprint, recomputed: true })
}

/// Translated → AudioSynthesized, gated on the fingerprint of each segment's text
pub async fn synthesize(ctx: &StageContext<'_>, set: &LanguageSet) -> Result<Vec<Artifact>, StageFailed> {
    let stage = PipelineStage::AudioSynthesized;
    ensure_not_cancelled(ctx, stage)?;

    let language = ctx.language;
    let hashes_path = ctx.layout.hashes_path(language, StageDir::Audio);
    let stored = load_record(stage, &hashes_path)?;

    let stored_ref = stored.as_slice();
    let outcomes = ctx
        .fan_out
        .run(set.segments.clone(), move |ordinal, segment| {
            synthesize_segment(ctx, stored_ref, ordinal, segment)
        })
        .await;

    let joined = Joined::new(stage, outcomes);
    let digests = confirmed_digests(&joined.items, &stored, |_, artifact| artifact.fingerprint.clone());
    save_record(stage, &hashes_path, &digests)?;

    let artifacts = joined.into_result(stage)?;
    let recomputed = artifacts.iter().filter(|a| a.recomputed).count();
    info!("[{}] audio ready: {} synthesized, {} reused", language, recomputed, artifacts.len() - recomputed);
    Ok(artifacts)
}

/// Every language must have one narration segment and one audio file per slide
pub fn check_shape(
    language: &str,
    slides: &[PathBuf],
    set: &LanguageSet,
    audio: &[Artifact],
) -> Result<(), PipelineError> {
    if set.len() != slides.len() {
        return Err(PipelineError::ShapeMismatch {
            language: language.to_string(),
            what: "narration segment",
            expected: slides.len(),
            actual: set.len(),
        });
    }
    if audio.len() != slides.len() {
        return Err(PipelineError::ShapeMismatch {
            language: language.to_string(),
            what: "audio",
            expected: slides.len(),
            actual: audio.len(),
        });
    }
    Ok(())
}

async fn render_segment(
    ctx: &StageContext<'_>,
    stored: &[String],
    ordinal: usize,
    slide: PathBuf,
    audio: Artifact,
) -> Result<Artifact, PipelineError> {
    let stage = PipelineStage::SegmentsRendered;
    let language = ctx.language;

    let image = tokio::fs::read(&slide).await.map_err(|e| PipelineError::io(&slide, e))?;
    let slide_fingerprint = fingerprint_bytes(&image);
    let key = combine(&[audio.fingerprint.as_str(), slide_fingerprint.as_str()]);
    let path = ctx.layout.segment_video_path(language, ordinal, &key);

    let decision = if audio.recomputed {
        CacheDecision::Recompute
    } else {
        gate_positional_or_content(ctx.layout.keying(), ordinal, &key, stored, &path)
    };
    ctx.stats.record(stage, &decision);
    if let CacheDecision::Reuse(path) = decision {
        debug!("[{}] reusing segment {}", language, path.display());
        return Ok(Artifact { ordinal, path, fingerprint: key, recomputed: false });
    }

    debug!("[{}] rendering segment {}", language, ordinal);
    let path = ctx.backends.encoder.render_segment(&slide, &audio.path, &path).await?;
    Ok(Artifact { ordinal, path, fingerprint: key, recomputed: true })
}

/// AudioSynthesized → SegmentsRendered.
///
/// A segment is keyed on its audio and slide image together, and is
/// re-rendered whenever its audio was produced during this run.
pub async fn render(
    ctx: &StageContext<'_>,
    slides: &[PathBuf],
    audio: &[Artifact],
) -> Result<Vec<Artifact>, StageFailed> {
    let stage = PipelineStage::SegmentsRendered;
    ensure_not_cancelled(ctx, stage)?;

    let language = ctx.language;
    let hashes_path = ctx.layout.hashes_path(language, StageDir::Videos);
    let stored = load_record(stage, &hashes_path)?;

    let stored_ref = stored.as_slice();
    let items: Vec<(PathBuf, Artifact)> = slides.iter().cloned().zip(audio.iter().cloned()).collect();
    let outcomes = ctx
        .fan_out
        .run(items, move |ordinal, (slide, audio)| {
            render_segment(ctx, stored_ref, ordinal, slide, audio)
        })
        .await;

    let joined = Joined::new(stage, outcomes);
    let digests = confirmed_digests(&joined.items, &stored, |_, artifact| artifact.fingerprint.clone());
    save_record(stage, &hashes_path, &digests)?;

    let segments = joined.into_result(stage)?;
    let rendered = segments.iter().filter(|s| s.recomputed).count();
    info!("[{}] segments ready: {} rendered, {} reused", language, rendered, segments.len() - rendered);
    Ok(segments)
}

/// SegmentsRendered → Concatenated, joining segments in ordinal order
pub async fn concatenate(ctx: &StageContext<'_>, segments: &[Artifact]) -> Result<PathBuf, StageFailed> {
    let stage = PipelineStage::Concatenated;
    ensure_not_cancelled(ctx, stage)?;

    let language = ctx.language;
    let hashes_path = ctx.layout.hashes_path(language, StageDir::Final);
    let output = ctx.layout.output_path(language);

    let mut ordered: Vec<&Artifact> = segments.iter().collect();
    ordered.sort_by_key(|segment| segment.ordinal);
    let key = combine(&ordered.iter().map(|s| s.fingerprint.as_str()).collect::<Vec<_>>());

    let stored = load_record(stage, &hashes_path)?;
    let decision = if ordered.iter().any(|s| s.recomputed) {
        CacheDecision::Recompute
    } else {
        gate::decide(0, &key, &stored, &output)
    };
    ctx.stats.record(stage, &decision);
    if let CacheDecision::Reuse(path) = decision {
        info!("[{}] output unchanged: {}", language, path.display());
        return Ok(path);
    }

    if ordered.is_empty() {
        return Err(StageFailed::single(
            stage,
            PipelineError::Encoding { message: format!("no segments to concatenate for '{}'", language) },
        ));
    }

    let inputs: Vec<PathBuf> = ordered.iter().map(|s| s.path.clone()).collect();
    let cancel = ctx.fan_out.cancel_token();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = ctx.backends.encoder.concatenate(&inputs, &output) => result,
    };

    match result {
        Ok(path) => {
            save_record(stage, &hashes_path, &[key])?;
            info!("[{}] wrote {}", language, path.display());
            Ok(path)
        }
        // The encoder only replaces the output on success, so the stored record still describes it
        Err(error) => Err(StageFailed::single(stage, error)),
    }
}
