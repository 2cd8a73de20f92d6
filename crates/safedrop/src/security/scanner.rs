use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{run_with_timeout, CommandError};
use crate::sanitize::redact_path;

pub const THREAT_AV_UNAVAILABLE: &str = "AVUnavailable";
pub const THREAT_SCAN_ERROR: &str = "ScanError";
pub const THREAT_SCAN_TIMEOUT: &str = "ScanTimeout";
pub const THREAT_SCAN_EXCEPTION: &str = "ScanException";
const UNKNOWN_THREAT: &str = "Unknown threat";

static FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m):\s*([^:\r\n]+?)\s+FOUND\s*$").unwrap());

/// Raw verdict of a scanner before the fail-open/fail-closed policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean { output: String },
    Infected { threat: String, output: String },
    /// The scanner binary could not be located or launched.
    Unavailable { reason: String },
    /// The scanner ran but exited with an unexpected status.
    Error { exit_code: Option<i32>, output: String },
    TimedOut,
    Exception { message: String },
}

/// Capability interface over an external threat scanner.
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    fn scan(&self, path: &Path, timeout: Duration) -> ScanOutcome;
}

/// How indeterminate scan outcomes are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Indeterminate is treated as infected and quarantined.
    #[default]
    FailClosed,
    /// Indeterminate is treated as clean.
    FailOpen,
}

impl ScanPolicy {
    pub fn from_fail_closed(fail_closed: bool) -> Self {
        if fail_closed {
            ScanPolicy::FailClosed
        } else {
            ScanPolicy::FailOpen
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScanResult {
    pub is_clean: bool,
    pub threat_name: Option<String>,
    pub scan_output: Option<String>,
    pub scanned_at: DateTime<Utc>,
    /// Set when the verdict came from the policy rather than a real scan.
    pub decided_by: Option<ScanPolicy>,
}

impl SecurityScanResult {
    pub fn clean(scan_output: Option<String>) -> Self {
        Self {
            is_clean: true,
            threat_name: None,
            scan_output,
            scanned_at: Utc::now(),
            decided_by: None,
        }
    }

    pub fn threat(threat_name: impl Into<String>, scan_output: Option<String>) -> Self {
        Self {
            is_clean: false,
            threat_name: Some(threat_name.into()),
            scan_output,
            scanned_at: Utc::now(),
            decided_by: None,
        }
    }

    fn by_policy(mut self, policy: ScanPolicy) -> Self {
        self.decided_by = Some(policy);
        self
    }
}

/// ClamAV command-line scanner (`clamscan --no-summary <file>`).
///
/// Exit code 0 means clean, 1 means a signature matched; anything else is
/// an error.
#[derive(Debug, Clone)]
pub struct ClamAvScanner {
    binary: String,
    resolved: Option<PathBuf>,
}

impl ClamAvScanner {
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let resolved = which::which(&binary).ok();
        Self { binary, resolved }
    }

    pub fn is_available(&self) -> bool {
        self.resolved.is_some()
    }
}

impl Default for ClamAvScanner {
    fn default() -> Self {
        Self::new("clamscan")
    }
}

impl Scanner for ClamAvScanner {
    fn name(&self) -> &str {
        &self.binary
    }

    fn scan(&self, path: &Path, timeout: Duration) -> ScanOutcome {
        let Some(program) = &self.resolved else {
            return ScanOutcome::Unavailable {
                reason: format!("{} not found on PATH", self.binary),
            };
        };

        let mut command = Command::new(program);
        command.arg("--no-summary").arg(path);

        match run_with_timeout(command, timeout) {
            Ok(output) => {
                let text = output.combined_lossy();
                match output.status.code() {
                    Some(0) => ScanOutcome::Clean { output: text },
                    Some(1) => ScanOutcome::Infected {
                        threat: parse_threat_name(&text)
                            .unwrap_or_else(|| UNKNOWN_THREAT.to_string()),
                        output: text,
                    },
                    code => ScanOutcome::Error {
                        exit_code: code,
                        output: text,
                    },
                }
            }
            Err(CommandError::Timeout(_)) => ScanOutcome::TimedOut,
            Err(CommandError::NotFound(program)) => ScanOutcome::Unavailable {
                reason: format!("{} not found", program),
            },
            Err(e) => ScanOutcome::Exception {
                message: e.to_string(),
            },
        }
    }
}

/// Extracts the signature name from scanner output such as
/// `/tmp/eicar.com: Eicar-Test-Signature FOUND`.
pub fn parse_threat_name(output: &str) -> Option<String> {
    FOUND_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Applies the scan policy on top of a [`Scanner`].
#[derive(Clone)]
pub struct SecurityScanner {
    scanner: Arc<dyn Scanner>,
    policy: ScanPolicy,
    timeout: Duration,
}

impl SecurityScanner {
    pub fn new(scanner: Arc<dyn Scanner>, policy: ScanPolicy, timeout: Duration) -> Self {
        Self {
            scanner,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> ScanPolicy {
        self.policy
    }

    pub fn scan(&self, path: &Path) -> SecurityScanResult {
        let file = redact_path(path);
        info!(file = %file, scanner = self.scanner.name(), "Security scanning file");

        match self.scanner.scan(path, self.timeout) {
            ScanOutcome::Clean { output } => {
                info!(file = %file, "Security scan clean");
                SecurityScanResult::clean(Some(output))
            }
            ScanOutcome::Infected { threat, output } => {
                warn!(file = %file, threat = %threat, "Security threat detected");
                SecurityScanResult::threat(threat, Some(output))
            }
            ScanOutcome::Unavailable { reason } => {
                warn!(file = %file, reason = %reason, "Scanner unavailable");
                self.indeterminate(
                    THREAT_AV_UNAVAILABLE,
                    "Antivirus scanner not available".to_string(),
                )
            }
            ScanOutcome::Error { exit_code, output } => {
                error!(file = %file, exit_code = ?exit_code, "Scanner reported an error");
                self.indeterminate(THREAT_SCAN_ERROR, format!("Scan error: {}", output))
            }
            ScanOutcome::TimedOut => {
                error!(file = %file, timeout = ?self.timeout, "Security scan timed out");
                self.indeterminate(THREAT_SCAN_TIMEOUT, "Security scan timed out".to_string())
            }
            ScanOutcome::Exception { message } => {
                error!(file = %file, error = %message, "Security scan failed");
                self.indeterminate(
                    THREAT_SCAN_EXCEPTION,
                    format!("Scan exception: {}", message),
                )
            }
        }
    }

    fn indeterminate(&self, synthetic_threat: &str, detail: String) -> SecurityScanResult {
        match self.policy {
            ScanPolicy::FailClosed => {
                warn!(threat = synthetic_threat, "Indeterminate scan, failing closed");
                SecurityScanResult::threat(synthetic_threat, Some(detail)).by_policy(self.policy)
            }
            ScanPolicy::FailOpen => {
                debug!(reason = synthetic_threat, "Indeterminate scan, failing open");
                SecurityScanResult::clean(Some(detail)).by_policy(self.policy)
            }
        }
    }
}
