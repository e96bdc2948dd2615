/*!
 * Tests for configuration defaults and validation
 */

use anyhow::Result;

use slidecast::app_config::{Config, LogLevel, TranslationProvider};
use slidecast::cache::CacheKeying;

use crate::common;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    config.speech.api_key = "sk-test".to_string();
    config
}

#[test]
fn test_default_shouldUseDocumentedValues() {
    let config = Config::default();

    assert_eq!(config.input_language, "en");
    assert_eq!(config.output_languages, vec!["en".to_string(), "fr".to_string()]);
    assert_eq!(config.speech.model, "tts-1-hd");
    assert_eq!(config.speech.voice, "onyx");
    assert_eq!(config.video.ffmpeg_path, "ffmpeg");
    assert_eq!(config.pipeline.max_concurrent_languages, 2);
    assert_eq!(config.pipeline.max_concurrent_segments, 4);
    assert!(!config.pipeline.fail_fast);
    assert_eq!(config.pipeline.cache_keying, CacheKeying::Positional);
}

#[test]
fn test_validate_withLocalProviderAndSpeechKey_shouldSucceed() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_validate_withInvalidOutputLanguage_shouldFail() {
    let mut config = valid_config();
    config.output_languages = vec!["fr".to_string(), "zz-not-a-code".to_string()];

    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withNoOutputLanguages_shouldFail() {
    let mut config = valid_config();
    config.output_languages.clear();

    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withZeroConcurrency_shouldFail() {
    let mut config = valid_config();
    config.pipeline.max_concurrent_segments = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{ "output_languages": ["de"], "pipeline": { "cache_keying": "content" }, "log_level": "debug" }"#,
    )?;

    let (config, created) = Config::load_or_create(&path)?;

    assert!(!created);
    assert_eq!(config.input_language, "en");
    assert_eq!(config.output_languages, vec!["de".to_string()]);
    assert_eq!(config.pipeline.cache_keying, CacheKeying::Content);
    assert_eq!(config.pipeline.max_concurrent_segments, 4);
    assert!(matches!(config.log_level, LogLevel::Debug));
    Ok(())
}

#[test]
fn test_loadOrCreate_withMalformedJson_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "conf.json", "{ not json")?;

    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}
