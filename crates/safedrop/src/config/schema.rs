use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::archive::ArchiveLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub directories: DirectoriesConfig,
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategoryConfig>,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub atomic_move: AtomicMoveConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    pub source: String,
    pub destination: String,
    /// Defaults to `<destination>/quarantine`.
    #[serde(default)]
    pub quarantine: Option<String>,
}

impl DirectoriesConfig {
    pub fn source_path(&self) -> PathBuf {
        expand_home(&self.source)
    }

    pub fn destination_path(&self) -> PathBuf {
        expand_home(&self.destination)
    }

    pub fn quarantine_path(&self) -> PathBuf {
        match &self.quarantine {
            Some(path) if !path.trim().is_empty() => expand_home(path),
            _ => self.destination_path().join("quarantine"),
        }
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub destination: String,
}

fn default_categories() -> BTreeMap<String, CategoryConfig> {
    [
        "documents",
        "pdf",
        "spreadsheets",
        "presentations",
        "images",
        "audio",
        "video",
        "archives",
        "code",
        "executables",
        "unknown",
    ]
    .into_iter()
    .map(|key| {
        (
            key.to_string(),
            CategoryConfig {
                destination: key.to_string(),
            },
        )
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub enable_security_scan: bool,
    #[serde(default = "default_true")]
    pub enable_ocr: bool,
    #[serde(default = "default_true")]
    pub enable_archive_extraction: bool,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_true() -> bool {
    true
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_security_scan: true,
            enable_ocr: true,
            enable_archive_extraction: true,
            worker_count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Treat indeterminate scans (scanner missing, error, timeout) as infected.
    #[serde(default = "default_true")]
    pub fail_closed: bool,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub archive_limits: ArchiveLimits,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            fail_closed: true,
            scanner: ScannerConfig::default(),
            archive_limits: ArchiveLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scanner_binary")]
    pub binary: String,
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
}

fn default_scanner_binary() -> String {
    "clamscan".to_string()
}

fn default_scan_timeout() -> u64 {
    60
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: default_scanner_binary(),
            timeout_secs: default_scan_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicMoveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stability_duration")]
    pub duration_seconds: f64,
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,
    /// Upper bound on how long a file that keeps changing is waited for.
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: f64,
}

fn default_stability_duration() -> f64 {
    2.0
}

fn default_check_interval() -> f64 {
    0.5
}

fn default_max_wait() -> f64 {
    60.0
}

impl Default for AtomicMoveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_seconds: default_stability_duration(),
            check_interval: default_check_interval(),
            max_wait_seconds: default_max_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_binary")]
    pub binary: String,
    #[serde(default = "default_pdf_renderer")]
    pub pdf_renderer: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

fn default_ocr_binary() -> String {
    "tesseract".to_string()
}

fn default_pdf_renderer() -> String {
    "pdftoppm".to_string()
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

fn default_max_pages() -> u32 {
    3
}

fn default_ocr_timeout() -> u64 {
    120
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: default_ocr_binary(),
            pdf_renderer: default_pdf_renderer(),
            languages: default_languages(),
            dpi: default_dpi(),
            max_pages: default_max_pages(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
