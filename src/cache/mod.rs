/*!
 * Incremental artifact cache.
 *
 * - `fingerprint`: SHA-256 content fingerprints
 * - `hash_store`: sidecar fingerprint records, one per language and stage
 * - `gate`: the reuse/recompute decision for a single ordinal
 * - `layout`: the on-disk directory convention
 */

pub mod fingerprint;
pub mod gate;
pub mod hash_store;
pub mod layout;

pub use self::fingerprint::{combine, fingerprint, fingerprint_bytes, fingerprint_file};
pub use self::gate::{CacheDecision, CacheEntry, GateStats, StageCounts};
pub use self::layout::{CacheKeying, ProjectLayout, StageDir};
