pub mod path_validator;
pub mod quarantine;
pub mod scanner;

pub use path_validator::{ensure_within, has_traversal_marker, PathValidator};
pub use quarantine::{QuarantineManager, QuarantineRecord};
pub use scanner::{
    parse_threat_name, ClamAvScanner, ScanOutcome, ScanPolicy, Scanner, SecurityScanResult,
    SecurityScanner,
};

/// Threat name recorded for archives rejected by the extraction limits.
pub const THREAT_ARCHIVE_BOMB: &str = "ArchiveBomb";
/// Threat name recorded for paths rejected by the path validator.
pub const THREAT_PATH_VALIDATION: &str = "PathValidationError";
