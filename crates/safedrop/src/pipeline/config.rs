use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveLimits;
use crate::config::{CategoryConfig, Config};
use crate::processor::OcrSettings;
use crate::security::ScanPolicy;
use crate::stability::StabilityConfig;

/// Runtime settings read once when a pipeline is built.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_directory: PathBuf,
    pub destination_directory: PathBuf,
    pub quarantine_directory: PathBuf,
    pub categories: BTreeMap<String, CategoryConfig>,
    pub security_scan_enabled: bool,
    pub ocr_enabled: bool,
    pub archive_extraction_enabled: bool,
    pub scan_policy: ScanPolicy,
    pub scanner_binary: String,
    pub scan_timeout: Duration,
    pub archive_limits: ArchiveLimits,
    pub stability: StabilityConfig,
    pub ocr: OcrSettings,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_directory: config.directories.source_path(),
            destination_directory: config.directories.destination_path(),
            quarantine_directory: config.directories.quarantine_path(),
            categories: config.categories.clone(),
            security_scan_enabled: config.processing.enable_security_scan,
            ocr_enabled: config.processing.enable_ocr,
            archive_extraction_enabled: config.processing.enable_archive_extraction,
            scan_policy: ScanPolicy::from_fail_closed(config.security.fail_closed),
            scanner_binary: config.security.scanner.binary.clone(),
            scan_timeout: Duration::from_secs(config.security.scanner.timeout_secs),
            archive_limits: config.security.archive_limits,
            stability: StabilityConfig::from_config(&config.atomic_move),
            ocr: OcrSettings::from_config(&config.ocr),
        }
    }
}
