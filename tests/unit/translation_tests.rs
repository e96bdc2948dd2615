/*!
 * Tests for translation prompt rendering and output cleanup
 */

use slidecast::translation::core::{clean_translation, render_system_prompt};
use slidecast::translation::TokenUsageStats;
use std::time::Duration;

#[test]
fn test_renderSystemPrompt_shouldUseFullLanguageNames() {
    let prompt = render_system_prompt("Translate from {source_language} to {target_language}.", "en", "fr");

    assert_eq!(prompt, "Translate from English to French.");
}

#[test]
fn test_renderSystemPrompt_withUnknownCode_shouldKeepCode() {
    let prompt = render_system_prompt("to {target_language}", "en", "xx");

    assert_eq!(prompt, "to xx");
}

#[test]
fn test_cleanTranslation_shouldStripAddedQuotesOnly() {
    assert_eq!(clean_translation("Hello", "  \"Bonjour\"  "), "Bonjour");
    assert_eq!(clean_translation("\"Hello\"", "\"Bonjour\""), "\"Bonjour\"");
    assert_eq!(clean_translation("Hello", "« Bonjour »"), "Bonjour");
    assert_eq!(clean_translation("Hello", "Bonjour\n"), "Bonjour");
}

#[test]
fn test_tokenUsageStats_record_shouldAccumulate() {
    let mut stats = TokenUsageStats::new();

    stats.record(Some(10), Some(4), Duration::from_millis(100));
    stats.record(None, Some(6), Duration::from_millis(50));

    assert_eq!(stats.requests, 2);
    assert_eq!(stats.total_tokens(), 20);
    assert_eq!(stats.api_duration, Duration::from_millis(150));
}
