//! Builders for test configurations and stub collaborators.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use safedrop::archive::ArchiveLimits;
use safedrop::config::{load_config_from_str, Config, ConfigFormat};
use safedrop::security::{ScanOutcome, Scanner};
use safedrop::TextExtractor;

/// Builder for creating `Config` instances.
///
/// Starts from the smallest valid document so every default comes from the
/// loader itself, then overrides what the test cares about. Stability
/// checking is off unless a test turns it back on.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(source: &Path, destination: &Path) -> Self {
        let json = serde_json::json!({
            "version": "1.0",
            "directories": {
                "source": source.display().to_string(),
                "destination": destination.display().to_string(),
            }
        });
        let mut config = load_config_from_str(&json.to_string(), ConfigFormat::Json)
            .expect("Minimal config should load");
        config.atomic_move.enabled = false;
        config.processing.enable_ocr = false;
        config.processing.worker_count = 2;
        Self { config }
    }

    pub fn quarantine(mut self, path: &Path) -> Self {
        self.config.directories.quarantine = Some(path.display().to_string());
        self
    }

    pub fn security_scan(mut self, enabled: bool) -> Self {
        self.config.processing.enable_security_scan = enabled;
        self
    }

    pub fn ocr(mut self, enabled: bool) -> Self {
        self.config.processing.enable_ocr = enabled;
        self
    }

    pub fn archive_extraction(mut self, enabled: bool) -> Self {
        self.config.processing.enable_archive_extraction = enabled;
        self
    }

    pub fn fail_closed(mut self, fail_closed: bool) -> Self {
        self.config.security.fail_closed = fail_closed;
        self
    }

    pub fn scanner_binary(mut self, binary: &str) -> Self {
        self.config.security.scanner.binary = binary.to_string();
        self
    }

    pub fn archive_limits(mut self, limits: ArchiveLimits) -> Self {
        self.config.security.archive_limits = limits;
        self
    }

    pub fn max_files(mut self, max_files: usize) -> Self {
        self.config.security.archive_limits.max_files = max_files;
        self
    }

    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.config.security.archive_limits.max_total_size = bytes;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.security.archive_limits.max_file_size = bytes;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.security.archive_limits.max_depth = depth;
        self
    }

    /// Enables stability checking with the given window, poll interval and
    /// give-up time.
    pub fn stability(mut self, duration: Duration, interval: Duration, max_wait: Duration) -> Self {
        self.config.atomic_move.enabled = true;
        self.config.atomic_move.duration_seconds = duration.as_secs_f64();
        self.config.atomic_move.check_interval = interval.as_secs_f64();
        self.config.atomic_move.max_wait_seconds = max_wait.as_secs_f64();
        self
    }

    pub fn category(mut self, key: &str, destination: &str) -> Self {
        if let Some(category) = self.config.categories.get_mut(key) {
            category.destination = destination.to_string();
        }
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.processing.worker_count = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Scanner that returns the same verdict for every file.
pub struct FixedScanner(pub ScanOutcome);

impl FixedScanner {
    pub fn clean() -> Arc<dyn Scanner> {
        Arc::new(Self(ScanOutcome::Clean {
            output: "OK".to_string(),
        }))
    }

    pub fn infected(threat: &str) -> Arc<dyn Scanner> {
        Arc::new(Self(ScanOutcome::Infected {
            threat: threat.to_string(),
            output: format!("stdin: {} FOUND", threat),
        }))
    }
}

impl Scanner for FixedScanner {
    fn name(&self) -> &str {
        "fixed"
    }

    fn scan(&self, _path: &Path, _timeout: Duration) -> ScanOutcome {
        self.0.clone()
    }
}

/// Text extractor returning canned text for every file.
pub struct CannedText(pub Option<String>);

impl CannedText {
    pub fn none() -> Arc<dyn TextExtractor> {
        Arc::new(Self(None))
    }

    pub fn with(text: &str) -> Arc<dyn TextExtractor> {
        Arc::new(Self(Some(text.to_string())))
    }
}

impl TextExtractor for CannedText {
    fn extract(&self, _path: &Path) -> Option<String> {
        self.0.clone()
    }
}

/// The standard antivirus test string.
pub const EICAR: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Scanner that reports one file name as infected with the EICAR signature
/// and everything else as clean.
pub struct NameScanner {
    infected_name: String,
}

impl NameScanner {
    pub fn flagging(name: &str) -> Arc<dyn Scanner> {
        Arc::new(Self {
            infected_name: name.to_string(),
        })
    }
}

impl Scanner for NameScanner {
    fn name(&self) -> &str {
        "by-name"
    }

    fn scan(&self, path: &Path, _timeout: Duration) -> ScanOutcome {
        let matches = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy() == self.infected_name);
        if matches {
            ScanOutcome::Infected {
                threat: "Eicar-Test-Signature".to_string(),
                output: format!("{}: Eicar-Test-Signature FOUND", path.display()),
            }
        } else {
            ScanOutcome::Clean {
                output: format!("{}: OK", path.display()),
            }
        }
    }
}
