use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::limits::ArchiveLimits;
use super::ArchiveError;
use crate::error::ArchiveBombError;

#[derive(Debug, Default)]
pub struct TreeSummary {
    /// Regular files and symlinks, in walk order.
    pub members: Vec<PathBuf>,
    pub file_count: usize,
    pub total_size: u64,
}

/// Re-checks an extracted tree on disk. Links are not followed, so the
/// sizes counted are the bytes that actually landed under `root`.
pub fn verify_tree(root: &Path, limits: &ArchiveLimits) -> Result<TreeSummary, ArchiveError> {
    let mut summary = TreeSummary::default();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ArchiveError::Io {
                path,
                source: e.into(),
            }
        })?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            // Depth of a directory is the number of components below root.
            if entry.depth() > limits.max_depth {
                return Err(ArchiveBombError::DepthExceeded {
                    depth: entry.depth(),
                    limit: limits.max_depth,
                }
                .into());
            }
            continue;
        }

        if file_type.is_file() {
            let size = entry
                .metadata()
                .map_err(|e| ArchiveError::Io {
                    path: entry.path().to_path_buf(),
                    source: e.into(),
                })?
                .len();

            summary.file_count += 1;
            if summary.file_count > limits.max_files {
                return Err(ArchiveBombError::TooManyFiles {
                    count: summary.file_count,
                    limit: limits.max_files,
                }
                .into());
            }
            if size > limits.max_file_size {
                return Err(ArchiveBombError::EntryTooLarge {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size,
                    limit: limits.max_file_size,
                }
                .into());
            }
            summary.total_size += size;
            if summary.total_size > limits.max_total_size {
                return Err(ArchiveBombError::TotalSizeExceeded {
                    total: summary.total_size,
                    limit: limits.max_total_size,
                }
                .into());
            }
            summary.members.push(entry.into_path());
        } else if file_type.is_symlink() {
            summary.members.push(entry.into_path());
        }
    }

    Ok(summary)
}
