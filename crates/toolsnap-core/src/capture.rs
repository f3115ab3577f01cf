//! Directory capture.
//!
//! Walks a base directory, applies the file filter, and reads eligible
//! files concurrently into [`FileEntry`] records. Only an inaccessible
//! base path aborts a capture; per-file and per-directory failures are
//! recorded in [`CaptureStats::errors`] and the walk continues.

use crate::config::SnapshotConfig;
use crate::error::{SnapshotError, SnapshotResult};
use crate::filter::FileFilter;
use crate::model::{CaptureIssue, CaptureStats, FileAction, FileEntry};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use toolsnap_util::{path as path_util, HashAlgorithm};
use tracing::{debug, warn};

/// Upper bound on concurrent file reads.
const READ_CONCURRENCY: usize = 16;

/// Options for a single capture pass.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Store file bytes in the resulting entries. `false` yields a
    /// metadata-and-checksum fingerprint, enough to detect changes
    /// without holding content.
    pub include_content: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_content: true,
        }
    }
}

/// The result of walking and reading a directory.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Captured entries keyed by portable relative path. Every entry is
    /// `Added`; classification against a parent happens during encoding.
    pub files: BTreeMap<String, FileEntry>,

    /// Totals and per-file failures.
    pub stats: CaptureStats,
}

/// A file that survived filtering, waiting to be read.
struct Candidate {
    key: String,
    path: PathBuf,
    mtime: Option<DateTime<Utc>>,
    mode: Option<u32>,
}

/// Captures the eligible files under a base directory.
pub struct FileCapture {
    filter: FileFilter,
    hash_algorithm: HashAlgorithm,
}

impl FileCapture {
    /// Build a capture pipeline from configuration.
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            filter: FileFilter::new(config),
            hash_algorithm: config.hash_algorithm,
        }
    }

    /// Capture with content included.
    pub async fn capture(&self, base_path: &Path) -> SnapshotResult<CaptureOutcome> {
        self.capture_with(base_path, &CaptureOptions::default())
            .await
    }

    /// Capture with explicit options.
    pub async fn capture_with(
        &self,
        base_path: &Path,
        options: &CaptureOptions,
    ) -> SnapshotResult<CaptureOutcome> {
        let metadata = fs::metadata(base_path).await.map_err(|e| {
            SnapshotError::capture(format!(
                "Base path {} is not accessible: {e}",
                base_path.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(SnapshotError::capture(format!(
                "Base path {} is not a directory",
                base_path.display()
            )));
        }

        let mut stats = CaptureStats::default();
        let candidates = self.walk(base_path, &mut stats).await;

        let mut reads = stream::iter(candidates.into_iter().map(|candidate| async move {
            let read = fs::read(&candidate.path).await;
            (candidate, read)
        }))
        .buffer_unordered(READ_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

        // Deterministic assembly regardless of read completion order.
        reads.sort_by(|a, b| a.0.key.cmp(&b.0.key));

        let mut files = BTreeMap::new();
        for (candidate, read) in reads {
            match read {
                Ok(bytes) => {
                    if FileFilter::is_binary(&candidate.key, &bytes) {
                        debug!(path = %candidate.key, "Capturing binary file");
                    }
                    let size = bytes.len() as u64;
                    let checksum = Some(self.hash_algorithm.digest(&bytes));
                    stats.total_files += 1;
                    stats.total_size += size;
                    let content = if options.include_content {
                        Some(bytes)
                    } else {
                        None
                    };
                    files.insert(
                        candidate.key.clone(),
                        FileEntry {
                            path: candidate.key,
                            action: FileAction::Added,
                            content,
                            size,
                            checksum,
                            mtime: candidate.mtime,
                            mode: candidate.mode,
                        },
                    );
                }
                Err(e) => {
                    warn!(path = %candidate.key, error = %e, "Failed to read file during capture");
                    stats.errors.push(CaptureIssue {
                        path: candidate.key,
                        message: format!("Read failed: {e}"),
                    });
                }
            }
        }

        debug!(
            base_path = %base_path.display(),
            total_files = stats.total_files,
            skipped_files = stats.skipped_files,
            "Capture complete"
        );

        Ok(CaptureOutcome { files, stats })
    }

    /// Walk the tree iteratively, collecting filtered read candidates.
    async fn walk(&self, base_path: &Path, stats: &mut CaptureStats) -> Vec<Candidate> {
        let mut pending = vec![base_path.to_path_buf()];
        let mut candidates = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    // Base accessibility was checked upfront, so only
                    // subdirectories can fail here.
                    warn!(path = %dir.display(), error = %e, "Failed to read directory");
                    stats.errors.push(CaptureIssue {
                        path: relative_key(base_path, &dir),
                        message: format!("Failed to read directory: {e}"),
                    });
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        stats.errors.push(CaptureIssue {
                            path: relative_key(base_path, &dir),
                            message: format!("Failed to enumerate directory: {e}"),
                        });
                        break;
                    }
                };

                let path = entry.path();
                let key = relative_key(base_path, &path);

                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        stats.errors.push(CaptureIssue {
                            path: key,
                            message: format!("Failed to stat: {e}"),
                        });
                        continue;
                    }
                };

                if file_type.is_symlink() {
                    debug!(path = %key, "Skipping symlink");
                    stats.skipped_files += 1;
                    continue;
                }

                if file_type.is_dir() {
                    if self.filter.should_descend(&key) {
                        pending.push(path);
                    } else {
                        // A pruned directory counts once toward skips;
                        // its contents are never enumerated.
                        debug!(path = %key, "Pruning excluded directory");
                        stats.skipped_files += 1;
                    }
                    continue;
                }

                if !file_type.is_file() {
                    continue;
                }

                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        stats.errors.push(CaptureIssue {
                            path: key,
                            message: format!("Failed to stat: {e}"),
                        });
                        continue;
                    }
                };

                if !self.filter.should_include(&key, metadata.len()) {
                    stats.skipped_files += 1;
                    continue;
                }

                candidates.push(Candidate {
                    key,
                    path,
                    mtime: metadata.modified().ok().map(DateTime::<Utc>::from),
                    mode: permission_mode(&metadata),
                });
            }
        }

        candidates
    }
}

/// Portable relative key of `path` under `base_path`.
fn relative_key(base_path: &Path, path: &Path) -> String {
    path_util::relative_to(path, base_path)
        .map(|rel| path_util::portable_key(&rel))
        .unwrap_or_else(|| path_util::portable_key(path))
}

#[cfg(unix)]
fn permission_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn permission_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
