/*!
 * Sidecar fingerprint records.
 *
 * Each stage directory carries a `hashes` file: one fingerprint per line, in
 * ordinal order. Line `i` describes the artifact for ordinal `i`. An empty
 * line is a placeholder for an ordinal whose artifact was never produced and
 * therefore never matches a real fingerprint.
 */

use std::path::Path;

use log::debug;

use crate::errors::PipelineError;
use crate::file_utils::FileManager;

/// Load a fingerprint record.
///
/// A missing file is not an error: it means no previous run produced this
/// stage, so every ordinal is a miss.
pub fn load(path: &Path) -> Result<Vec<String>, PipelineError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No fingerprint record at {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(PipelineError::io(path, e)),
    };

    Ok(content.lines().map(|line| line.trim_end().to_string()).collect())
}

/// Overwrite a fingerprint record with `digests`, in the given order.
///
/// The file is replaced atomically; a crash mid-write leaves the previous
/// record intact.
pub fn save<S: AsRef<str>>(path: &Path, digests: &[S]) -> Result<(), PipelineError> {
    let mut content = String::with_capacity(digests.len() * 65);
    for digest in digests {
        content.push_str(digest.as_ref());
        content.push('\n');
    }

    FileManager::write_atomic(path, content.as_bytes()).map_err(|e| PipelineError::io(path, e))?;
    debug!("Saved {} fingerprints to {}", digests.len(), path.display());
    Ok(())
}
