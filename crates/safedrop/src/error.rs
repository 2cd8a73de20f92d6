use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SafedropError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error(transparent)]
    Command(#[from] crate::command::CommandError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file has no usable name: {0}")]
    InvalidFileName(PathBuf),

    #[error("No free destination name left for: {0}")]
    NamesExhausted(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(String),
}

/// Rejection raised by the path validator. Quarantined whenever a file is
/// still present at the rejected path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    #[error("Path traversal detected in: {0}")]
    TraversalMarker(String),

    #[error("File does not exist: {0}")]
    Missing(String),

    #[error("Path is not a regular file: {0}")]
    NotRegularFile(String),

    #[error("File path outside allowed directories: {0}")]
    OutsideAllowedRoots(String),

    #[error("Path validation failed for '{path}': {reason}")]
    Resolve { path: String, reason: String },
}

/// Archive limit violation. The offending archive is quarantined as `ArchiveBomb`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveBombError {
    #[error("Archive file count {count} exceeds limit {limit}")]
    TooManyFiles { count: usize, limit: usize },

    #[error("Archive member '{name}' size {size} exceeds limit {limit}")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    #[error("Archive total size {total} exceeds limit {limit}")]
    TotalSizeExceeded { total: u64, limit: u64 },

    #[error("Archive depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: usize, limit: usize },

    #[error("Path traversal detected in archive member: {0}")]
    UnsafeEntryName(String),

    #[error("Nested archive level {level} exceeds limit {limit}")]
    NestingExceeded { level: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, SafedropError>;
