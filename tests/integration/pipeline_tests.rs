/*!
 * Integration tests for incremental pipeline runs
 */

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use slidecast::cache::{fingerprint, hash_store, CacheKeying, StageDir};
use slidecast::narration;
use slidecast::pipeline::{LanguageStatus, PipelineStage};

use crate::common::mock_backends::{CountingSpeech, CountingTranslator, FakeEncoder};
use crate::common::{options, TestProject};

struct Mocks {
    translator: Arc<CountingTranslator>,
    speech: Arc<CountingSpeech>,
    encoder: Arc<FakeEncoder>,
}

impl Mocks {
    fn new() -> Self {
        Self {
            translator: Arc::new(CountingTranslator::new()),
            speech: Arc::new(CountingSpeech::new()),
            encoder: Arc::new(FakeEncoder::new()),
        }
    }

    fn reset(&self) {
        self.translator.reset();
        self.speech.reset();
        self.encoder.reset();
    }
}

#[tokio::test]
async fn test_run_withFreshProject_shouldProduceEveryArtifact() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    let report = pipeline.run().await?;

    assert!(report.is_success());
    let output = project.layout.output_path("fr");
    assert_eq!(report.language("fr").and_then(|r| r.output()), Some(&output));
    assert!(output.is_file());

    let translated = narration::load_language_set(&project.layout.translated_texts("fr"), "fr")?;
    assert_eq!(translated.texts(), vec!["[fr] A", "[fr] B", "[fr] C"]);
    for ordinal in 0..3 {
        assert!(project.layout.audio_path("fr", ordinal, "").is_file());
        assert!(project.layout.segment_video_path("fr", ordinal, "").is_file());
    }
    assert_eq!(hash_store::load(&project.layout.hashes_path("fr", StageDir::Final))?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_twiceWithoutChanges_shouldReuseEverything() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["en", "fr"]));

    pipeline.run().await?;
    let first_outputs = (
        std::fs::read(project.layout.output_path("en"))?,
        std::fs::read(project.layout.output_path("fr"))?,
    );
    mocks.reset();

    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 0);
    assert_eq!(mocks.speech.calls(), 0);
    assert_eq!(mocks.encoder.renders(), 0);
    assert_eq!(mocks.encoder.concatenations(), 0);
    assert_eq!(std::fs::read(project.layout.output_path("en"))?, first_outputs.0);
    assert_eq!(std::fs::read(project.layout.output_path("fr"))?, first_outputs.1);

    let audio = report.counts(PipelineStage::AudioSynthesized);
    assert_eq!((audio.hits, audio.misses), (6, 0));
    Ok(())
}

#[tokio::test]
async fn test_run_withOneSegmentChanged_shouldRecomputeOnlyThatOrdinal() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C", "D"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr", "de"]));

    pipeline.run().await?;
    let untouched_audio = std::fs::read(project.layout.audio_path("de", 3, ""))?;
    mocks.reset();

    project.write_texts(&["A", "B", "C changed", "D"])?;
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 2);
    let mut requests = mocks.translator.requests();
    requests.sort();
    assert_eq!(
        requests,
        vec![
            ("C changed".to_string(), "de".to_string()),
            ("C changed".to_string(), "fr".to_string()),
        ]
    );
    assert_eq!(mocks.speech.calls(), 2);
    assert_eq!(mocks.encoder.renders(), 2);
    assert_eq!(mocks.encoder.concatenations(), 2);
    assert_eq!(std::fs::read(project.layout.audio_path("de", 3, ""))?, untouched_audio);
    Ok(())
}

#[tokio::test]
async fn test_run_withAbcScenario_shouldOnlyTouchChangedSidecarEntry() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    pipeline.run().await?;
    assert_eq!(mocks.translator.calls(), 3);
    assert_eq!(mocks.speech.calls(), 3);

    let text_hashes = project.layout.hashes_path("fr", StageDir::Text);
    let audio_hashes = project.layout.hashes_path("fr", StageDir::Audio);
    let text_before = hash_store::load(&text_hashes)?;
    let audio_before = hash_store::load(&audio_hashes)?;
    assert_eq!(text_before, vec![fingerprint("A"), fingerprint("B"), fingerprint("C")]);
    mocks.reset();

    project.write_texts(&["A", "B2", "C"])?;
    pipeline.run().await?;

    assert_eq!(mocks.translator.calls(), 1);
    assert_eq!(mocks.speech.calls(), 1);

    let text_after = hash_store::load(&text_hashes)?;
    let audio_after = hash_store::load(&audio_hashes)?;
    assert_eq!(text_after[0], text_before[0]);
    assert_ne!(text_after[1], text_before[1]);
    assert_eq!(text_after[2], text_before[2]);
    assert_eq!(text_after[1], fingerprint("B2"));
    assert_eq!(audio_after[0], audio_before[0]);
    assert_ne!(audio_after[1], audio_before[1]);
    assert_eq!(audio_after[2], audio_before[2]);
    Ok(())
}

#[tokio::test]
async fn test_run_withScrambledRenderTimes_shouldConcatenateInOrdinalOrder() -> Result<()> {
    let texts: Vec<String> = (0..12).map(|i| format!("segment {}", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let project = TestProject::new(&text_refs)?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(
        &mocks.translator,
        &mocks.speech,
        &mocks.encoder,
        options(&["en"]).concurrency(1, 8),
    );

    let report = pipeline.run().await?;

    assert!(report.is_success());
    let expected: Vec<_> = (0..12).map(|i| project.layout.segment_video_path("en", i, "")).collect();
    assert_eq!(mocks.encoder.concatenated_inputs(), expected);

    let mut joined = String::new();
    for path in &expected {
        joined.push_str(&std::fs::read_to_string(path)?);
    }
    assert_eq!(std::fs::read_to_string(project.layout.output_path("en"))?, joined);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailedSynthesis_shouldRetryOnlyFailedOrdinal() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    mocks.speech.fail_text(&CountingTranslator::translation_of("B", "fr"));
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    let report = pipeline.run().await?;

    let fr = report.language("fr").expect("fr report");
    assert_eq!(fr.status, LanguageStatus::Failed(PipelineStage::AudioSynthesized));
    assert_eq!(fr.reached, PipelineStage::Translated);
    assert_eq!(fr.failures.len(), 1);
    assert_eq!(fr.failures[0].ordinal, Some(1));
    assert!(!project.layout.output_path("fr").exists());

    let audio_record = hash_store::load(&project.layout.hashes_path("fr", StageDir::Audio))?;
    assert_eq!(audio_record.len(), 3);
    assert!(!audio_record[0].is_empty());
    assert!(audio_record[1].is_empty());
    assert!(!audio_record[2].is_empty());

    mocks.reset();
    mocks.speech.clear_failures();
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 0);
    assert_eq!(mocks.speech.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailingTranslationLanguage_shouldCompleteOtherLanguages() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    mocks.translator.fail_language("de");
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr", "de"]));

    let report = pipeline.run().await?;

    assert!(!report.is_success());
    assert_eq!(report.failed_languages(), vec!["de"]);
    let de = report.language("de").expect("de report");
    assert_eq!(de.status, LanguageStatus::Failed(PipelineStage::Translated));
    assert_eq!(de.reached, PipelineStage::Loaded);
    assert!(de.failures.iter().all(|f| f.kind == "backend"));
    assert!(project.layout.output_path("fr").is_file());
    assert!(!project.layout.output_path("de").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withMalformedTranslation_shouldFailOnlyThatLanguage() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    mocks.translator.malform_language("es");
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["es", "fr"]));

    let report = pipeline.run().await?;

    let es = report.language("es").expect("es report");
    assert!(matches!(es.status, LanguageStatus::Failed(_)));
    assert!(es.failures.iter().any(|f| f.kind == "shape"));
    assert!(report.language("fr").is_some_and(|r| r.is_completed()));
    Ok(())
}

#[tokio::test]
async fn test_run_withMoreSlidesThanSegments_shouldReportShapeMismatch() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    project.write_slides(3)?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["en"]));

    let report = pipeline.run().await?;

    let en = report.language("en").expect("en report");
    assert_eq!(en.status, LanguageStatus::Failed(PipelineStage::SegmentsRendered));
    assert_eq!(en.reached, PipelineStage::AudioSynthesized);
    assert_eq!(en.failures[0].kind, "shape");
    assert_eq!(mocks.encoder.renders(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailFast_shouldCancelUnstartedSegments() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    mocks.speech.fail_text(&CountingTranslator::translation_of("A", "fr"));
    let cancel = CancellationToken::new();
    let pipeline = project
        .pipeline(
            &mocks.translator,
            &mocks.speech,
            &mocks.encoder,
            options(&["fr"]).concurrency(1, 1).fail_fast(true),
        )
        .with_cancel_token(cancel.clone());

    let report = pipeline.run().await?;

    // Failing fast cancels the run, not the caller's token
    assert!(!cancel.is_cancelled());
    assert_eq!(mocks.speech.calls(), 1);
    let fr = report.language("fr").expect("fr report");
    assert_eq!(fr.status, LanguageStatus::Failed(PipelineStage::AudioSynthesized));
    assert_eq!(fr.failures.len(), 1);

    // Nothing was stored before this run, so every ordinal is a placeholder
    let audio_record = hash_store::load(&project.layout.hashes_path("fr", StageDir::Audio))?;
    assert_eq!(audio_record, vec![String::new(), String::new(), String::new()]);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailFastAfterSuccessfulRun_shouldKeepUnstartedDigests() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(
        &mocks.translator,
        &mocks.speech,
        &mocks.encoder,
        options(&["fr"]).concurrency(1, 1).fail_fast(true),
    );

    pipeline.run().await?;
    let audio_hashes = project.layout.hashes_path("fr", StageDir::Audio);
    let video_hashes = project.layout.hashes_path("fr", StageDir::Videos);
    let audio_before = hash_store::load(&audio_hashes)?;
    let video_before = hash_store::load(&video_hashes)?;

    project.write_texts(&["A2", "B", "C"])?;
    mocks.speech.fail_text(&CountingTranslator::translation_of("A2", "fr"));
    mocks.reset();
    let report = pipeline.run().await?;

    assert_eq!(mocks.speech.calls(), 1);
    assert!(!report.is_success());
    let audio_after = hash_store::load(&audio_hashes)?;
    assert_eq!(audio_after, audio_before);
    assert!(project.layout.audio_path("fr", 1, "").is_file());
    assert!(project.layout.audio_path("fr", 2, "").is_file());
    assert_eq!(hash_store::load(&video_hashes)?, video_before);

    mocks.speech.clear_failures();
    mocks.reset();
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 0);
    assert_eq!(mocks.speech.calls(), 1);
    assert_eq!(mocks.encoder.renders(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailedTranslationAfterSuccessfulRun_shouldKeepPreviousTexts() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(
        &mocks.translator,
        &mocks.speech,
        &mocks.encoder,
        options(&["fr"]).concurrency(1, 1).fail_fast(true),
    );

    pipeline.run().await?;
    let text_hashes = project.layout.hashes_path("fr", StageDir::Text);
    let text_before = hash_store::load(&text_hashes)?;

    project.write_texts(&["A2", "B", "C"])?;
    mocks.translator.fail_text("A2");
    mocks.reset();
    let report = pipeline.run().await?;

    let fr = report.language("fr").expect("fr report");
    assert_eq!(fr.status, LanguageStatus::Failed(PipelineStage::Translated));
    assert_eq!(mocks.translator.calls(), 1);
    assert_eq!(hash_store::load(&text_hashes)?, text_before);
    let translated = narration::load_language_set(&project.layout.translated_texts("fr"), "fr")?;
    assert_eq!(translated.texts(), vec!["[fr] A", "[fr] B", "[fr] C"]);

    mocks.translator.clear_failures();
    mocks.reset();
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 1);
    assert_eq!(mocks.speech.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_afterFailFastRun_shouldRunAgainOnSamePipeline() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    mocks.speech.fail_text(&CountingTranslator::translation_of("A", "fr"));
    let pipeline = project.pipeline(
        &mocks.translator,
        &mocks.speech,
        &mocks.encoder,
        options(&["fr", "de"]).fail_fast(true),
    );

    let report = pipeline.run().await?;
    assert!(!report.is_success());
    assert!(!pipeline.cancel_token().is_cancelled());

    mocks.speech.clear_failures();
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert!(report.languages.iter().all(|r| r.is_completed()));
    Ok(())
}

#[tokio::test]
async fn test_run_withCrlfTranslations_shouldReuseEverythingOnIdenticalRerun() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    mocks.translator.use_crlf_for("fr");
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    pipeline.run().await?;
    let translated = narration::load_language_set(&project.layout.translated_texts("fr"), "fr")?;
    assert_eq!(translated.texts(), vec!["Line one\n[fr] A", "Line one\n[fr] B"]);
    mocks.reset();

    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 0);
    assert_eq!(mocks.speech.calls(), 0);
    assert_eq!(mocks.encoder.renders(), 0);
    assert_eq!(mocks.encoder.concatenations(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withCancelledToken_shouldReportEveryLanguageCancelled() -> Result<()> {
    let project = TestProject::new(&["A"])?;
    let mocks = Mocks::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = project
        .pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr", "de"]))
        .with_cancel_token(cancel);

    let report = pipeline.run().await?;

    assert!(report
        .languages
        .iter()
        .all(|r| matches!(r.status, LanguageStatus::Cancelled(_))));
    assert_eq!(mocks.translator.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withContentKeyingAndInsertedSegment_shouldKeepOtherAudio() -> Result<()> {
    let project = TestProject::with_keying(&["A", "B", "C"], CacheKeying::Content)?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    pipeline.run().await?;
    mocks.reset();

    project.write_texts(&["Intro", "A", "B", "C"])?;
    project.write_slides(4)?;
    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 1);
    assert_eq!(mocks.speech.calls(), 1);
    assert_eq!(mocks.translator.requests(), vec![("Intro".to_string(), "fr".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_run_withPositionalKeyingAndInsertedSegment_shouldRecomputeShiftedOrdinals() -> Result<()> {
    let project = TestProject::new(&["A", "B", "C"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    pipeline.run().await?;
    mocks.reset();

    project.write_texts(&["Intro", "A", "B", "C"])?;
    project.write_slides(4)?;
    pipeline.run().await?;

    assert_eq!(mocks.translator.calls(), 4);
    assert_eq!(mocks.speech.calls(), 4);
    Ok(())
}

#[tokio::test]
async fn test_run_withDeletedAudioFile_shouldResynthesizeIt() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    pipeline.run().await?;
    std::fs::remove_file(project.layout.audio_path("fr", 0, ""))?;
    mocks.reset();

    let report = pipeline.run().await?;

    assert!(report.is_success());
    assert_eq!(mocks.translator.calls(), 0);
    assert_eq!(mocks.speech.calls(), 1);
    assert_eq!(mocks.encoder.renders(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withDuplicateOutputLanguages_shouldRunEachOnce() -> Result<()> {
    let project = TestProject::new(&["A", "B"])?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr", "fr"]));

    let report = pipeline.run().await?;

    assert_eq!(report.languages.len(), 1);
    assert_eq!(mocks.translator.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withMissingSlidesDirectory_shouldReturnError() -> Result<()> {
    let project = TestProject::new(&["A"])?;
    std::fs::remove_dir_all(project.layout.slides_dir())?;
    let mocks = Mocks::new();
    let pipeline = project.pipeline(&mocks.translator, &mocks.speech, &mocks.encoder, options(&["fr"]));

    let result = pipeline.run().await;

    assert!(result.is_err());
    assert_eq!(mocks.translator.calls(), 0);
    Ok(())
}
