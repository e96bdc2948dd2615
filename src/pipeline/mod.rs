/*!
 * Narrated-video pipeline.
 *
 * Each output language moves through the same strictly forward sequence of
 * stages. Within a stage, every ordinal is an independent unit of work run by
 * the fan-out scheduler; the scheduler's join is the barrier into the next
 * stage.
 *
 * - `scheduler`: bounded, cancellable fan-out with positional results
 * - `stages`: per-stage work for one language, gated by the cache
 * - `orchestrator`: drives every language through the stages
 * - `report`: per-language outcome and gate statistics
 */

use std::fmt;

pub mod orchestrator;
pub mod report;
pub mod scheduler;
pub mod stages;

pub use orchestrator::{Backends, Pipeline, PipelineOptions};
pub use report::{LanguageReport, LanguageStatus, RunReport, StageFailure};
pub use scheduler::{FanOut, WorkOutcome};

/// Lifecycle states of one language, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Loaded,
    Translated,
    AudioSynthesized,
    SegmentsRendered,
    Concatenated,
}

impl PipelineStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loaded => "load",
            Self::Translated => "translation",
            Self::AudioSynthesized => "speech synthesis",
            Self::SegmentsRendered => "segment rendering",
            Self::Concatenated => "concatenation",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
