/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;

use slidecast::app_config::{Config, TranslationProvider};
use slidecast::app_controller::Controller;
use slidecast::backends::PresentationSource;
use slidecast::cache::CacheKeying;
use slidecast::pipeline::PipelineOptions;
use slidecast::presentation::LocalPresentation;
use slidecast::translation::TranslationService;

use crate::common::{self, TestProject};

/// Test the controller with custom configuration
#[test]
fn test_controller_withCustomConfig_shouldDeriveLayoutFromConfig() -> Result<()> {
    let project = TestProject::new(&["A"])?;
    let mut config = Config::default();
    config.project_root = project.root().to_path_buf();
    config.pipeline.cache_keying = CacheKeying::Content;

    let controller = Controller::with_config(config)?;

    assert_eq!(controller.layout().root(), project.root());
    assert_eq!(controller.layout().keying(), CacheKeying::Content);
    assert_eq!(controller.layout().input_texts(), project.layout.input_texts());
    Ok(())
}

#[test]
fn test_controller_withWavResponseFormat_shouldNameAudioAfterFormat() -> Result<()> {
    let project = TestProject::new(&["A"])?;
    let mut config = Config::default();
    config.project_root = project.root().to_path_buf();
    config.speech.response_format = "wav".to_string();

    let controller = Controller::with_config(config)?;
    let audio = controller.layout().audio_path("fr", 0, "abc");

    assert_eq!(controller.layout().audio_format(), "wav");
    assert_eq!(audio.file_name().and_then(|n| n.to_str()), Some("0.wav"));
    Ok(())
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaultsThenReadThemBack() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let (created_config, created) = Config::load_or_create(&path)?;
    assert!(created);
    assert!(path.is_file());

    let (loaded_config, created_again) = Config::load_or_create(&path)?;
    assert!(!created_again);
    assert_eq!(loaded_config.input_language, created_config.input_language);
    assert_eq!(loaded_config.output_languages, created_config.output_languages);
    Ok(())
}

#[test]
fn test_pipelineOptions_fromConfig_shouldCarryLanguagesAndLimits() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{
            "input_language": "en",
            "output_languages": ["de", "es"],
            "pipeline": { "max_concurrent_languages": 3, "max_concurrent_segments": 6, "fail_fast": true }
        }"#,
    )?;

    let (config, _) = Config::load_or_create(&path)?;
    let options = PipelineOptions::from_config(&config);

    assert_eq!(options.input_language, "en");
    assert_eq!(options.output_languages, vec!["de".to_string(), "es".to_string()]);
    assert_eq!(options.max_concurrent_languages, 3);
    assert_eq!(options.max_concurrent_segments, 6);
    assert!(options.fail_fast);
    Ok(())
}

#[test]
fn test_localPresentation_fetch_shouldListSlidesNumericallyWithNotes() -> Result<()> {
    let texts: Vec<String> = (1..=11).map(|i| format!("note {}", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let project = TestProject::new(&text_refs)?;

    let source = LocalPresentation::new(project.layout.input_texts());
    let slides_dir = project.layout.slides_dir();
    let fetched = tokio_test::block_on(async { source.fetch("local", &slides_dir).await })?;

    assert_eq!(fetched.slides.len(), 11);
    assert_eq!(fetched.slides[1], project.layout.slide_path(1));
    assert_eq!(fetched.slides[10], project.layout.slide_path(10));
    assert_eq!(fetched.notes, texts);
    Ok(())
}

#[test]
fn test_translationService_withLocalProvider_shouldBuildWithoutApiKey() -> Result<()> {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;

    let service = TranslationService::new(config.translation, "en")?;

    assert_eq!(service.source_language(), "en");
    assert_eq!(service.usage().requests, 0);
    Ok(())
}

#[test]
fn test_translationService_withConcurrentRequests_shouldCapInFlightRequests() -> Result<()> {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    for provider in &mut config.translation.available_providers {
        provider.concurrent_requests = 3;
    }

    let service = TranslationService::new(config.translation.clone(), "en")?;
    assert_eq!(service.max_concurrent_requests(), 3);

    for provider in &mut config.translation.available_providers {
        provider.concurrent_requests = 0;
    }
    let service = TranslationService::new(config.translation, "en")?;
    assert_eq!(service.max_concurrent_requests(), 1);
    Ok(())
}
