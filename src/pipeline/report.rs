/*!
 * Run reports.
 *
 * Work items never abort the process; their errors are collected at each
 * stage barrier and end up here, next to the cache statistics of the run.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::StageCounts;
use crate::errors::PipelineError;

use super::PipelineStage;

/// One failed unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: PipelineStage,
    /// Ordinal of the failed item, if the failure concerns a single segment
    pub ordinal: Option<usize>,
    pub kind: &'static str,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: PipelineStage, ordinal: Option<usize>, error: &PipelineError) -> Self {
        Self {
            stage,
            ordinal,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "[{}] segment {}: {}", self.stage, ordinal, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Final state of one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageStatus {
    /// The final video was produced (or reused) at this path
    Completed(PathBuf),
    /// Work stopped at this stage because items failed
    Failed(PipelineStage),
    /// Work stopped at this stage because the run was cancelled
    Cancelled(PipelineStage),
}

/// Outcome of one language
#[derive(Debug, Clone)]
pub struct LanguageReport {
    pub language: String,
    pub status: LanguageStatus,
    /// Last stage whose every ordinal was materialized
    pub reached: PipelineStage,
    pub failures: Vec<StageFailure>,
}

impl LanguageReport {
    pub fn completed(language: impl Into<String>, output: PathBuf) -> Self {
        Self {
            language: language.into(),
            status: LanguageStatus::Completed(output),
            reached: PipelineStage::Concatenated,
            failures: Vec::new(),
        }
    }

    pub fn failed(
        language: impl Into<String>,
        stage: PipelineStage,
        reached: PipelineStage,
        failures: Vec<StageFailure>,
    ) -> Self {
        Self {
            language: language.into(),
            status: LanguageStatus::Failed(stage),
            reached,
            failures,
        }
    }

    pub fn cancelled(
        language: impl Into<String>,
        stage: PipelineStage,
        reached: PipelineStage,
        failures: Vec<StageFailure>,
    ) -> Self {
        Self {
            language: language.into(),
            status: LanguageStatus::Cancelled(stage),
            reached,
            failures,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, LanguageStatus::Completed(_))
    }

    pub fn output(&self) -> Option<&PathBuf> {
        match &self.status {
            LanguageStatus::Completed(path) => Some(path),
            _ => None,
        }
    }
}

/// Everything a caller needs to know about a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub languages: Vec<LanguageReport>,
    pub gate: BTreeMap<PipelineStage, StageCounts>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.languages.iter().all(LanguageReport::is_completed)
    }

    pub fn language(&self, language: &str) -> Option<&LanguageReport> {
        self.languages.iter().find(|report| report.language == language)
    }

    pub fn failed_languages(&self) -> Vec<&str> {
        self.languages
            .iter()
            .filter(|report| !report.is_completed())
            .map(|report| report.language.as_str())
            .collect()
    }

    pub fn counts(&self, stage: PipelineStage) -> StageCounts {
        self.gate.get(&stage).copied().unwrap_or_default()
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        for report in &self.languages {
            let line = match &report.status {
                LanguageStatus::Completed(path) => format!("{}: done -> {}", report.language, path.display()),
                LanguageStatus::Failed(stage) => format!(
                    "{}: failed during {} ({} error(s))",
                    report.language,
                    stage,
                    report.failures.len()
                ),
                LanguageStatus::Cancelled(stage) => format!("{}: cancelled during {}", report.language, stage),
            };
            lines.push(line);
        }

        for (stage, counts) in &self.gate {
            lines.push(format!(
                "{}: {} reused, {} recomputed ({:.0}% hit rate)",
                stage,
                counts.hits,
                counts.misses,
                counts.hit_rate() * 100.0
            ));
        }

        lines.join("\n")
    }
}
