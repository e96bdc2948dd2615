/*!
 * Tests for file system helpers
 */

use anyhow::Result;

use slidecast::file_utils::FileManager;

use crate::common;

#[test]
fn test_findNumberedFiles_shouldSortNumericallyAndFilterExtension() -> Result<()> {
    let dir = common::create_temp_dir()?;
    for name in ["slide_10.png", "slide_2.png", "slide_1.png", "notes.txt", "cover.png"] {
        common::create_test_file(dir.path(), name, "x")?;
    }

    let files = FileManager::find_numbered_files(dir.path(), "png")?;
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();

    assert_eq!(names, vec!["slide_1.png", "slide_2.png", "slide_10.png", "cover.png"]);
    Ok(())
}

#[test]
fn test_writeAtomic_shouldCreateParentsAndReplaceContent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("cache/fr/audio/0.mp3");

    FileManager::write_atomic(&path, b"first")?;
    FileManager::write_atomic(&path, b"second")?;

    assert_eq!(std::fs::read(&path)?, b"second");
    let leftovers = std::fs::read_dir(path.parent().expect("parent"))?.count();
    assert_eq!(leftovers, 1);
    Ok(())
}

#[test]
fn test_appendToLogFile_shouldKeepEarlierEntries() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("out/run.log");

    FileManager::append_to_log_file(&path, "first run")?;
    FileManager::append_to_log_file(&path, "second run")?;

    let content = std::fs::read_to_string(&path)?;
    assert!(content.contains("first run"));
    assert!(content.contains("second run"));
    Ok(())
}
