use std::path::{Path, PathBuf};

use crate::pipeline::{Outcome, ProcessingResult};

/// One file waiting for the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source_path: PathBuf,
    /// Guessed from the extension; informational only.
    pub mime_type: Option<String>,
}

impl Job {
    pub fn new(source_path: PathBuf) -> Self {
        let mime_type = Self::detect_mime_type(&source_path);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_path,
            mime_type,
        }
    }

    /// Detects MIME type from file path using the mime_guess crate.
    /// Returns `None` for unknown extensions.
    fn detect_mime_type(path: &Path) -> Option<String> {
        mime_guess::from_path(path).first().map(|m| m.to_string())
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub source_path: PathBuf,
    pub result: ProcessingResult,
}

impl JobResult {
    pub fn new(job: &Job, result: ProcessingResult) -> Self {
        Self {
            job_id: job.id.clone(),
            source_path: job.source_path.clone(),
            result,
        }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }

    pub fn outcome(&self) -> Outcome {
        self.result.outcome
    }
}
