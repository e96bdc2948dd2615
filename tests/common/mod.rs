/*!
 * Common test utilities for the slidecast test suite
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use slidecast::cache::{CacheKeying, ProjectLayout};
use slidecast::narration;
use slidecast::pipeline::{Backends, Pipeline, PipelineOptions};


use mock_backends::{CountingSpeech, CountingTranslator, FakeEncoder};

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A throwaway project directory with slides and narration
pub struct TestProject {
    pub dir: TempDir,
    pub layout: ProjectLayout,
}

impl TestProject {
    /// Project with one slide per text and positional keying
    pub fn new(texts: &[&str]) -> Result<Self> {
        Self::with_keying(texts, CacheKeying::Positional)
    }

    pub fn with_keying(texts: &[&str], keying: CacheKeying) -> Result<Self> {
        let dir = create_temp_dir()?;
        let layout = ProjectLayout::new(dir.path(), keying);
        let project = Self { dir, layout };
        project.write_texts(texts)?;
        project.write_slides(texts.len())?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Replace `data/texts.txt`
    pub fn write_texts(&self, texts: &[&str]) -> Result<()> {
        fs::create_dir_all(self.layout.data_dir())?;
        fs::write(self.layout.input_texts(), narration::serialize_texts(texts))?;
        Ok(())
    }

    /// Make sure `slide_1.png ..= slide_<count>.png` exist, each with distinct bytes
    pub fn write_slides(&self, count: usize) -> Result<()> {
        fs::create_dir_all(self.layout.slides_dir())?;
        for ordinal in 0..count {
            fs::write(self.layout.slide_path(ordinal), format!("png-bytes-{}", ordinal + 1))?;
        }
        Ok(())
    }

    /// Pipeline over this project with the given mocks
    pub fn pipeline(
        &self,
        translator: &Arc<CountingTranslator>,
        speech: &Arc<CountingSpeech>,
        encoder: &Arc<FakeEncoder>,
        options: PipelineOptions,
    ) -> Pipeline {
        let backends = Backends::new(translator.clone(), speech.clone(), encoder.clone());
        Pipeline::new(self.layout.clone(), backends, options)
    }
}

/// Options translating from English into `languages`
pub fn options(languages: &[&str]) -> PipelineOptions {
    PipelineOptions::new("en", languages.iter().map(|l| l.to_string()).collect()).concurrency(2, 4)
}
