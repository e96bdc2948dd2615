/*!
 * Stage cache gate.
 *
 * The gate answers one question per ordinal: may the artifact left by the
 * previous run be reused, or must it be recomputed? Reuse requires both a
 * matching stored fingerprint and the artifact actually being on disk, so a
 * record that outlived a failed write never produces a false hit.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::pipeline::PipelineStage;

/// Outcome of a cache lookup for one ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// The artifact at this path is current
    Reuse(PathBuf),
    /// The artifact must be produced again
    Recompute,
}

impl CacheDecision {
    pub fn is_reuse(&self) -> bool {
        matches!(self, Self::Reuse(_))
    }
}

/// A (ordinal, fingerprint, artifact) triple under consideration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub ordinal: usize,
    pub fingerprint: String,
    pub artifact: PathBuf,
}

impl CacheEntry {
    pub fn new(ordinal: usize, fingerprint: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            ordinal,
            fingerprint: fingerprint.into(),
            artifact: artifact.into(),
        }
    }

    /// Run the positional gate for this entry
    pub fn decide(&self, stored: &[String]) -> CacheDecision {
        decide(self.ordinal, &self.fingerprint, stored, &self.artifact)
    }
}

/// Positional gate: reuse iff `stored[ordinal] == current` and `artifact` is a file
pub fn decide(ordinal: usize, current: &str, stored: &[String], artifact: &Path) -> CacheDecision {
    decide_with_presence(ordinal, current, stored, artifact, artifact.is_file())
}

/// Positional gate for artifacts whose presence is established by the caller,
/// such as one segment inside a shared `texts.txt`
pub fn decide_with_presence(
    ordinal: usize,
    current: &str,
    stored: &[String],
    artifact: &Path,
    present: bool,
) -> CacheDecision {
    let matches = stored.get(ordinal).is_some_and(|previous| previous == current);

    if matches && present {
        CacheDecision::Reuse(artifact.to_path_buf())
    } else {
        if matches {
            debug!("Fingerprint matched for ordinal {} but {} is missing", ordinal, artifact.display());
        }
        CacheDecision::Recompute
    }
}

/// Gate for digest-named artifacts: the name is the fingerprint, so presence alone decides
pub fn decide_content_addressed(artifact: &Path) -> CacheDecision {
    if artifact.is_file() {
        CacheDecision::Reuse(artifact.to_path_buf())
    } else {
        CacheDecision::Recompute
    }
}

/// Hit and miss counts for one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub hits: usize,
    pub misses: usize,
}

impl StageCounts {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Per-stage gate statistics shared between concurrent workers
#[derive(Debug, Clone, Default)]
pub struct GateStats {
    counts: Arc<RwLock<BTreeMap<PipelineStage, StageCounts>>>,
}

impl GateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the decision taken for one ordinal at `stage`
    pub fn record(&self, stage: PipelineStage, decision: &CacheDecision) {
        let mut counts = self.counts.write();
        let entry = counts.entry(stage).or_default();
        if decision.is_reuse() {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
    }

    pub fn get(&self, stage: PipelineStage) -> StageCounts {
        self.counts.read().get(&stage).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<PipelineStage, StageCounts> {
        self.counts.read().clone()
    }
}
