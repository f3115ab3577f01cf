//! File eligibility rules for capture.
//!
//! Decision order for a file:
//! 1. Inclusion globs override every other rule.
//! 2. The size cap excludes oversized files.
//! 3. Exclusion globs exclude on match.
//! 4. Everything else is included.
//!
//! Patterns match against the portable relative path; patterns without a
//! `/` also match against the basename, so `.DS_Store` excludes the file
//! at any depth. Malformed patterns are logged and never match.

use crate::config::SnapshotConfig;
use glob::Pattern;
use std::path::Path;
use tracing::{debug, warn};

/// Extensions treated as binary without sampling content.
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "wasm", "png", "jpg", "jpeg", "gif",
    "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "jar", "woff",
    "woff2", "ttf", "otf", "eot", "mp3", "mp4", "avi", "mov", "mkv", "sqlite", "db",
];

/// Bytes sampled from the head of a file for binary detection.
const BINARY_SAMPLE_LEN: usize = 512;

/// Compiled include/exclude rules plus the size cap.
pub struct FileFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    /// Directory stems of `dir/**` exclusions; pruning these stops the
    /// walk from ever entering an excluded tree.
    exclude_dirs: Vec<Pattern>,
    max_file_size: u64,
}

impl FileFilter {
    /// Build a filter from configuration.
    pub fn new(config: &SnapshotConfig) -> Self {
        Self::from_patterns(&config.include, &config.exclude, config.max_file_size)
    }

    /// Build a filter from raw pattern lists.
    pub fn from_patterns(include: &[String], exclude: &[String], max_file_size: u64) -> Self {
        let exclude_dirs = exclude
            .iter()
            .filter_map(|raw| raw.strip_suffix("/**"))
            .filter_map(compile_one)
            .collect();

        Self {
            include: include.iter().map(String::as_str).filter_map(compile_one).collect(),
            exclude: exclude.iter().map(String::as_str).filter_map(compile_one).collect(),
            exclude_dirs,
            max_file_size,
        }
    }

    /// Decide whether a file at `rel_path` (portable form) with the given
    /// size belongs in a capture.
    pub fn should_include(&self, rel_path: &str, size: u64) -> bool {
        // Inclusion globs override every other rule
        if matches_any(&self.include, rel_path) {
            return true;
        }

        if size > self.max_file_size {
            debug!(path = %rel_path, size, "Skipping oversized file");
            return false;
        }

        if matches_any(&self.exclude, rel_path) {
            return false;
        }

        true
    }

    /// Decide whether the walk may enter a directory at `rel_dir`.
    ///
    /// A `dir/**` exclusion prunes `dir` itself, so excluded trees are
    /// never read at all.
    pub fn should_descend(&self, rel_dir: &str) -> bool {
        if matches_any(&self.exclude_dirs, rel_dir) {
            return false;
        }
        if matches_any(&self.exclude, rel_dir) {
            return false;
        }
        true
    }

    /// Informational binary classification: known binary extension, else
    /// a NUL byte in the head of the content. An empty sample (including
    /// unreadable files) classifies as "not binary".
    pub fn is_binary(rel_path: &str, sample: &[u8]) -> bool {
        if let Some(ext) = Path::new(rel_path).extension().and_then(|e| e.to_str()) {
            if BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                return true;
            }
        }
        sample.iter().take(BINARY_SAMPLE_LEN).any(|&b| b == 0)
    }
}

/// Compile one pattern, logging and dropping malformed ones.
fn compile_one(raw: &str) -> Option<Pattern> {
    match Pattern::new(raw) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!(pattern = %raw, error = %e, "Ignoring malformed glob pattern");
            None
        }
    }
}

/// Dot-files participate in matching; `*` never crosses `/`, only `**` does.
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Match against the full relative path, with a basename fallback for
/// patterns that name no directory.
fn matches_any(patterns: &[Pattern], rel_path: &str) -> bool {
    let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
    patterns.iter().any(|pattern| {
        pattern.matches_with(rel_path, MATCH_OPTIONS)
            || (!pattern.as_str().contains('/') && pattern.matches_with(basename, MATCH_OPTIONS))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str], max_file_size: u64) -> FileFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        FileFilter::from_patterns(&include, &exclude, max_file_size)
    }

    #[test]
    fn test_default_config_excludes_node_modules() {
        let config = SnapshotConfig::default();
        let f = FileFilter::new(&config);

        assert!(f.should_include("src/a.js", 100));
        assert!(!f.should_include("node_modules/pkg/index.js", 100));
        assert!(!f.should_descend("node_modules"));
        assert!(f.should_descend("src"));
    }

    #[test]
    fn test_include_overrides_exclude_and_size() {
        let f = filter(&["important.log"], &["*.log"], 10);

        assert!(!f.should_include("debug.log", 5));
        // Include wins over the exclusion glob and over the size cap
        assert!(f.should_include("important.log", 5));
        assert!(f.should_include("important.log", 1_000_000));
    }

    #[test]
    fn test_size_cap() {
        let f = filter(&[], &[], 100);
        assert!(f.should_include("ok.txt", 100));
        assert!(!f.should_include("big.txt", 101));
    }

    #[test]
    fn test_basename_fallback_for_flat_patterns() {
        let f = filter(&[], &[".DS_Store", "*.tmp"], u64::MAX);

        assert!(!f.should_include(".DS_Store", 1));
        assert!(!f.should_include("deep/nested/.DS_Store", 1));
        assert!(!f.should_include("deep/scratch.tmp", 1));
        assert!(f.should_include("deep/keep.txt", 1));
    }

    #[test]
    fn test_dotfiles_match_globs() {
        let f = filter(&[], &[".git/**"], u64::MAX);
        assert!(!f.should_include(".git/config", 1));
        assert!(!f.should_descend(".git"));
        assert!(f.should_include(".gitignore", 1));
    }

    #[test]
    fn test_dir_glob_prunes_nested_dirs_by_basename() {
        let f = filter(&[], &["node_modules/**"], u64::MAX);
        // A nested node_modules is pruned through the basename fallback
        assert!(!f.should_descend("packages/app/node_modules"));
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        let f = filter(&[], &["[invalid", "*.log"], u64::MAX);
        // The malformed pattern is dropped; the valid one still applies
        assert!(f.should_include("source.rs", 1));
        assert!(!f.should_include("debug.log", 1));
    }

    #[test]
    fn test_is_binary_by_extension() {
        assert!(FileFilter::is_binary("logo.png", b""));
        assert!(FileFilter::is_binary("archive.ZIP", b""));
        assert!(!FileFilter::is_binary("main.rs", b"fn main() {}"));
    }

    #[test]
    fn test_is_binary_by_null_probe() {
        assert!(FileFilter::is_binary("blob", &[0x01, 0x00, 0x02]));
        assert!(!FileFilter::is_binary("notes", b"plain text"));
        // No sample (unreadable file) classifies as not binary
        assert!(!FileFilter::is_binary("unknown", b""));
    }
}
