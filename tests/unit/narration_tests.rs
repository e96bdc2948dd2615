/*!
 * Tests for the narration file format
 */

use anyhow::Result;

use slidecast::narration::{self, LanguageSet, Segment};

use crate::common;

#[test]
fn test_loadLanguageSet_withWindowsLineEndings_shouldMatchUnixContent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let unix = common::create_test_file(dir.path(), "unix.txt", "Hello\nthere\n-\nBye")?;
    let windows = common::create_test_file(dir.path(), "windows.txt", "Hello\r\nthere\r\n-\r\nBye")?;

    let unix_set = narration::load_language_set(&unix, "en")?;
    let windows_set = narration::load_language_set(&windows, "en")?;

    assert_eq!(unix_set, windows_set);
    assert_eq!(unix_set.fingerprints(), windows_set.fingerprints());
    Ok(())
}

#[test]
fn test_loadLanguageSet_withMissingFile_shouldReturnIoError() {
    let result = narration::load_language_set(std::path::Path::new("/nonexistent/texts.txt"), "en");

    assert!(matches!(result, Err(slidecast::errors::PipelineError::Io { .. })));
}

#[test]
fn test_parseTexts_withEmptySegments_shouldKeepOrdinals() {
    let texts = narration::parse_texts("First\n-\n-\nThird");

    assert_eq!(texts, vec!["First", "", "Third"]);
}

#[test]
fn test_segment_fingerprint_shouldIgnoreOrdinal() {
    let first = Segment::new(0, "Same words");
    let later = Segment::new(7, "Same words");

    assert_eq!(first.fingerprint(), later.fingerprint());
}

#[test]
fn test_saveLanguageSet_shouldNotEndWithDelimiter() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("texts.txt");
    let set = LanguageSet::from_texts("fr", ["Un", "Deux", "Trois"]);

    narration::save_language_set(&path, &set)?;

    assert_eq!(std::fs::read_to_string(&path)?, "Un\n-\nDeux\n-\nTrois");
    Ok(())
}
