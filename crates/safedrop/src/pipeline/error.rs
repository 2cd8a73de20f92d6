use thiserror::Error;

use crate::archive::ArchiveError;
use crate::error::{ArchiveBombError, PathValidationError, StorageError};

/// Stage failures. Security signals are routed to quarantine by the runner;
/// everything else becomes a failed result.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    PathValidation(#[from] PathValidationError),

    #[error(transparent)]
    ArchiveBomb(#[from] ArchiveBombError),

    #[error("Archive extraction failed: {0}")]
    Archive(ArchiveError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl From<ArchiveError> for PipelineError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Bomb(bomb) => PipelineError::ArchiveBomb(bomb),
            other => PipelineError::Archive(other),
        }
    }
}
