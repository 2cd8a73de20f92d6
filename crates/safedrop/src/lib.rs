pub mod archive;
pub mod classifier;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod security;
pub mod stability;
pub mod storage;
pub mod worker;

pub use archive::{ArchiveExtractor, ArchiveLimits};
pub use classifier::{Classifier, RuleClassifier};
pub use config::{load_config, Config};
pub use error::{
    ArchiveBombError, ConfigError, PathValidationError, ProcessError, Result, SafedropError,
    StorageError, WorkerError,
};
pub use pipeline::{Collaborators, Outcome, Pipeline, PipelineConfig, ProcessingResult};
pub use processor::{ExtractedMetadata, TextExtractor};
pub use security::{ScanOutcome, ScanPolicy, Scanner, SecurityScanResult};
pub use worker::{DirectoryWatcher, Job, JobResult, WorkerPool};
