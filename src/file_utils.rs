use anyhow::{Result, Context};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use std::fs::OpenOptions;
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;

// @module: File and directory utilities

// @const: Trailing number in a file stem, e.g. "slide_12"
static TRAILING_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)$").unwrap()
});

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        Self::ensure_dir_io(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))
    }

    // @creates: Directory and parents, keeping the io::Error for pipeline callers
    pub fn ensure_dir_io<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Find files with a specific extension in a directory
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let normalized_ext = extension.trim_start_matches('.');

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext.to_string_lossy().eq_ignore_ascii_case(normalized_ext) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        Ok(result)
    }

    /// List files of one extension directly inside `dir`, ordered by the number
    /// at the end of their stem (`slide_2.png` before `slide_10.png`).
    ///
    /// Files without a trailing number sort after numbered ones, by name.
    pub fn find_numbered_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let normalized_ext = extension.trim_start_matches('.');
        let mut files: Vec<(Option<u64>, PathBuf)> = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to read directory: {:?}", dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(normalized_ext));
            if !matches_ext {
                continue;
            }

            let number = path.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .and_then(|stem| {
                    TRAILING_NUMBER_REGEX.captures(&stem)
                        .and_then(|caps| caps[1].parse::<u64>().ok())
                });
            files.push((number, path.to_path_buf()));
        }

        files.sort_by(|(a_num, a_path), (b_num, b_path)| match (a_num, b_num) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| a_path.cmp(b_path)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a_path.cmp(b_path),
        });

        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Write bytes through a temporary file in the same directory, then rename
    /// over `path`. Readers see either the old content or the new, never a mix.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> std::io::Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir_io(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(content)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Get current timestamp
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        // Open file in append mode, create if it doesn't exist
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        // Write content with timestamp
        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }
}
