/*!
 * Tests for fingerprints, sidecar records and the cache gate
 */

use std::path::PathBuf;

use anyhow::Result;

use slidecast::cache::gate::{decide, decide_content_addressed, decide_with_presence};
use slidecast::cache::{combine, fingerprint, hash_store, CacheDecision, CacheKeying, GateStats, ProjectLayout, StageDir};
use slidecast::pipeline::PipelineStage;

use crate::common;

fn record(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| fingerprint(t)).collect()
}

#[test]
fn test_decide_eachBranch_shouldMatchGateRules() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let present = common::create_test_file(dir.path(), "0.mp3", "audio")?;
    let missing = dir.path().join("1.mp3");
    let stored = record(&["A", "B"]);

    // Match with artifact on disk
    assert_eq!(decide(0, &fingerprint("A"), &stored, &present), CacheDecision::Reuse(present.clone()));
    // Match without artifact
    assert_eq!(decide(1, &fingerprint("B"), &stored, &missing), CacheDecision::Recompute);
    // Fingerprint changed
    assert_eq!(decide(0, &fingerprint("A2"), &stored, &present), CacheDecision::Recompute);
    // Ordinal beyond the stored record
    assert_eq!(decide(5, &fingerprint("A"), &stored, &present), CacheDecision::Recompute);
    // No record at all
    assert_eq!(decide(0, &fingerprint("A"), &[], &present), CacheDecision::Recompute);
    Ok(())
}

#[test]
fn test_decide_withEmptyTextAndPlaceholder_shouldRecompute() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let artifact = common::create_test_file(dir.path(), "0.mp3", "audio")?;

    // A placeholder never equals a real fingerprint, even the one of empty text
    let decision = decide(0, &fingerprint(""), &[String::new()], &artifact);
    assert_eq!(decision, CacheDecision::Recompute);
    Ok(())
}

#[test]
fn test_decideWithPresence_withSharedFile_shouldIgnoreFilesystem() {
    let stored = record(&["A"]);
    let not_on_disk = PathBuf::from("/nonexistent/texts.txt");

    assert!(decide_with_presence(0, &fingerprint("A"), &stored, &not_on_disk, true).is_reuse());
    assert!(!decide_with_presence(0, &fingerprint("A"), &stored, &not_on_disk, false).is_reuse());
}

#[test]
fn test_decideContentAddressed_shouldOnlyCheckPresence() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let layout = ProjectLayout::new(dir.path(), CacheKeying::Content);
    let artifact = layout.audio_path("fr", 0, &fingerprint("A"));

    assert_eq!(decide_content_addressed(&artifact), CacheDecision::Recompute);
    layout.ensure_language_dirs("fr")?;
    std::fs::write(&artifact, b"audio")?;
    assert!(decide_content_addressed(&artifact).is_reuse());
    Ok(())
}

#[test]
fn test_hashStore_roundTrip_shouldPreserveOrderDuplicatesAndPlaceholders() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let layout = ProjectLayout::new(dir.path(), CacheKeying::Positional);
    let path = layout.hashes_path("de", StageDir::Audio);
    let digests = vec![fingerprint("B"), String::new(), fingerprint("B"), fingerprint("A")];

    hash_store::save(&path, &digests)?;

    assert_eq!(hash_store::load(&path)?, digests);
    Ok(())
}

#[test]
fn test_hashStore_load_withDirectoryInPlaceOfFile_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("hashes");
    std::fs::create_dir(&path)?;

    assert!(hash_store::load(&path).is_err());
    Ok(())
}

#[test]
fn test_combine_shouldDependOnOrder() {
    let a = fingerprint("A");
    let b = fingerprint("B");

    assert_ne!(combine(&[a.as_str(), b.as_str()]), combine(&[b.as_str(), a.as_str()]));
    assert_eq!(combine(&[a.as_str(), b.as_str()]), combine(&[a.clone(), b.clone()]));
}

#[test]
fn test_gateStats_acrossThreads_shouldAccumulate() {
    let stats = GateStats::new();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let stats = stats.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    stats.record(PipelineStage::SegmentsRendered, &CacheDecision::Recompute);
                }
            });
        }
    });

    assert_eq!(stats.get(PipelineStage::SegmentsRendered).misses, 100);
    assert_eq!(stats.snapshot().len(), 1);
}
