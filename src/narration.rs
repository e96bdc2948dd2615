/*!
 * Narration segments and the `texts.txt` codec.
 *
 * A narration file holds one segment per slide, separated by a line that
 * contains exactly `-`. Segment `i` is spoken over slide `i` in every
 * language.
 */

use std::path::Path;

use crate::cache::fingerprint::fingerprint;
use crate::errors::PipelineError;
use crate::file_utils::FileManager;

/// Line that separates two segments in a narration file
pub const SEGMENT_DELIMITER: &str = "-";

/// The narration for one slide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub ordinal: usize,
    pub text: String,
}

impl Segment {
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self { ordinal, text: text.into() }
    }

    /// Digest of the segment text; identifies the narration unit in the cache
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.text)
    }
}

/// All segments of one language, in slide order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSet {
    pub language: String,
    pub segments: Vec<Segment>,
}

impl LanguageSet {
    pub fn new(language: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self { language: language.into(), segments }
    }

    /// Build a set from texts, numbering them from zero
    pub fn from_texts<S: Into<String>>(language: impl Into<String>, texts: impl IntoIterator<Item = S>) -> Self {
        let segments = texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Segment::new(ordinal, text))
            .collect();
        Self::new(language, segments)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&Segment> {
        self.segments.get(ordinal)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn fingerprints(&self) -> Vec<String> {
        self.segments.iter().map(Segment::fingerprint).collect()
    }
}

/// Split a narration file into segment texts.
///
/// `\r\n` line endings are accepted. An empty file has no segments.
pub fn parse_texts(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line == SEGMENT_DELIMITER {
            segments.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    segments.push(current.join("\n"));

    segments
}

/// Segment text exactly as it reads back from a narration file.
///
/// Line endings become `\n` and trailing line breaks are dropped, so the text
/// fingerprints the same wherever it lands in the file.
pub fn normalize_segment(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(|line| line.strip_suffix('\r').unwrap_or(line)).collect();
    lines.join("\n").trim_end_matches('\n').to_string()
}

/// Join segment texts into narration file content
pub fn serialize_texts<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(&format!("\n{}\n", SEGMENT_DELIMITER))
}

/// Read a narration file into a language set
pub fn load_language_set(path: &Path, language: &str) -> Result<LanguageSet, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(LanguageSet::from_texts(language, parse_texts(&content)))
}

/// Write a language set as a narration file, replacing any previous content
pub fn save_language_set(path: &Path, set: &LanguageSet) -> Result<(), PipelineError> {
    let content = serialize_texts(&set.texts());
    FileManager::write_atomic(path, content.as_bytes()).map_err(|e| PipelineError::io(path, e))
}
