/*!
 * On-disk project layout.
 *
 * Every (language, stage, ordinal) tuple maps to one deterministic path under
 * `<root>/data`. Positional keying names per-ordinal artifacts after their
 * ordinal; content keying names them after their fingerprint, which makes
 * inserting or removing a slide harmless to the artifacts of the others.
 */

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::file_utils::FileManager;

/// Name of the sidecar fingerprint record inside each stage directory
pub const HASHES_FILE: &str = "hashes";

/// Name of the narration file, both for input and per-language translations
pub const TEXTS_FILE: &str = "texts.txt";

/// How per-ordinal artifacts are named
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeying {
    /// `audio/<ordinal>.mp3`, gated by the sidecar record
    #[default]
    Positional,
    /// `audio/<fingerprint>.mp3`, gated by presence alone
    #[serde(alias = "content-addressed")]
    Content,
}

/// Stage directories kept per language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDir {
    Text,
    Audio,
    Videos,
    Final,
}

impl StageDir {
    fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Videos => "videos",
            Self::Final => "final",
        }
    }
}

/// Path conventions for one project directory
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    keying: CacheKeying,
    // @field: Extension of synthesized audio, matching the speech response format
    audio_format: String,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, keying: CacheKeying) -> Self {
        Self {
            root: root.into(),
            keying,
            audio_format: "mp3".to_string(),
        }
    }

    /// Name audio artifacts after `format`, e.g. `wav` or `opus`
    pub fn with_audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into().to_lowercase();
        self
    }

    pub fn audio_format(&self) -> &str {
        &self.audio_format
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keying(&self) -> CacheKeying {
        self.keying
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Input-language narration, `data/texts.txt`
    pub fn input_texts(&self) -> PathBuf {
        self.data_dir().join(TEXTS_FILE)
    }

    pub fn slides_dir(&self) -> PathBuf {
        self.data_dir().join("slides")
    }

    /// Slide image for a 0-based ordinal; slide files are numbered from 1
    pub fn slide_path(&self, ordinal: usize) -> PathBuf {
        self.slides_dir().join(format!("slide_{}.png", ordinal + 1))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    pub fn language_dir(&self, language: &str) -> PathBuf {
        self.cache_dir().join(language)
    }

    pub fn stage_dir(&self, language: &str, stage: StageDir) -> PathBuf {
        self.language_dir(language).join(stage.name())
    }

    /// Sidecar fingerprint record for a language's stage
    pub fn hashes_path(&self, language: &str, stage: StageDir) -> PathBuf {
        self.stage_dir(language, stage).join(HASHES_FILE)
    }

    /// Translated narration for a language, `cache/<lang>/text/texts.txt`
    pub fn translated_texts(&self, language: &str) -> PathBuf {
        self.stage_dir(language, StageDir::Text).join(TEXTS_FILE)
    }

    /// Per-segment translation, only used with content keying
    pub fn translated_segment(&self, language: &str, fingerprint: &str) -> PathBuf {
        self.stage_dir(language, StageDir::Text).join(format!("{}.txt", fingerprint))
    }

    pub fn audio_path(&self, language: &str, ordinal: usize, fingerprint: &str) -> PathBuf {
        let name = match self.keying {
            CacheKeying::Positional => format!("{}.{}", ordinal, self.audio_format),
            CacheKeying::Content => format!("{}.{}", fingerprint, self.audio_format),
        };
        self.stage_dir(language, StageDir::Audio).join(name)
    }

    pub fn segment_video_path(&self, language: &str, ordinal: usize, fingerprint: &str) -> PathBuf {
        let name = match self.keying {
            CacheKeying::Positional => format!("slide{}_video_{}.mp4", ordinal + 1, language),
            CacheKeying::Content => format!("{}.mp4", fingerprint),
        };
        self.stage_dir(language, StageDir::Videos).join(name)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.data_dir().join("out")
    }

    /// Final concatenated video for a language
    pub fn output_path(&self, language: &str) -> PathBuf {
        self.out_dir().join(format!("output-{}.mp4", language))
    }

    /// Create every directory a language's stages write into
    pub fn ensure_language_dirs(&self, language: &str) -> Result<(), PipelineError> {
        let mut dirs: Vec<PathBuf> = [StageDir::Text, StageDir::Audio, StageDir::Videos, StageDir::Final]
            .into_iter()
            .map(|stage| self.stage_dir(language, stage))
            .collect();
        dirs.push(self.out_dir());

        for dir in dirs {
            FileManager::ensure_dir_io(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        Ok(())
    }
}
