use std::path::{Path, PathBuf};

use crate::processor::ExtractedMetadata;
use crate::security::SecurityScanResult;

/// Per-file state threaded through the stages.
pub struct PipelineContext {
    // Input, as submitted
    pub path: PathBuf,

    // 0 for a file from the source directory, n for a member of an archive nested n deep
    pub level: usize,

    // Set by validate_path
    pub canonical: Option<PathBuf>,

    // Set by security_scan when scanning is enabled
    pub scan: Option<SecurityScanResult>,

    // Set by classify
    pub category: Option<String>,

    // Set by ocr_extract when text was recognized
    pub metadata: Option<ExtractedMetadata>,
}

impl PipelineContext {
    pub fn new(path: &Path, level: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            level,
            canonical: None,
            scan: None,
            category: None,
            metadata: None,
        }
    }

    /// The validated path when available, else the submitted one.
    pub fn current_path(&self) -> &Path {
        self.canonical.as_deref().unwrap_or(&self.path)
    }
}
