//! Isolation of rejected files.
//!
//! Quarantined files keep their original name behind a timestamp prefix and
//! get a plain-text `<name>.log` audit record next to them.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::StorageError;
use crate::sanitize::redact_path;
use crate::security::scanner::SecurityScanResult;
use crate::storage::filesystem::{ensure_directory, file_name_of, move_file, reserve_path};

/// Where a quarantined file went and what was recorded about it.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineRecord {
    pub path: PathBuf,
    pub original_path: PathBuf,
    /// `None` when the audit file could not be written.
    pub audit_path: Option<PathBuf>,
    pub threat_name: String,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QuarantineManager {
    directory: PathBuf,
}

impl QuarantineManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the quarantine directory. On unix it is made owner-only.
    pub fn prepare(&self) -> Result<(), StorageError> {
        ensure_directory(&self.directory)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&self.directory, std::fs::Permissions::from_mode(0o700))
            {
                warn!(error = %e, "Could not restrict quarantine directory permissions");
            }
        }

        Ok(())
    }

    /// Moves `path` into quarantine and writes its audit record.
    ///
    /// Fails only if the move itself fails; a missing audit record is logged
    /// and reported through `QuarantineRecord::audit_path`.
    pub fn quarantine(
        &self,
        path: &Path,
        scan: &SecurityScanResult,
    ) -> Result<QuarantineRecord, StorageError> {
        let now = Utc::now();
        let threat_name = scan
            .threat_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        self.prepare()?;
        let original_name = file_name_of(path)?;
        let name = format!("{}_{}", now.format("%Y%m%d_%H%M%S"), original_name);

        let target = reserve_path(&self.directory, &name)?;
        if let Err(e) = move_file(path, &target) {
            let _ = std::fs::remove_file(&target);
            error!(file = %redact_path(path), error = %e, "Failed to quarantine file");
            return Err(e);
        }

        warn!(
            file = %redact_path(path),
            quarantined_as = %redact_path(&target),
            threat = %threat_name,
            "File quarantined"
        );

        let audit_path = match self.write_audit(&target, path, &threat_name, scan, now) {
            Ok(audit) => Some(audit),
            Err(e) => {
                warn!(error = %e, "Failed to write quarantine audit record");
                None
            }
        };

        Ok(QuarantineRecord {
            path: target,
            original_path: path.to_path_buf(),
            audit_path,
            threat_name,
            quarantined_at: now,
        })
    }

    fn write_audit(
        &self,
        quarantined: &Path,
        original: &Path,
        threat_name: &str,
        scan: &SecurityScanResult,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let audit_name = format!("{}.log", file_name_of(quarantined)?);
        let audit_path = reserve_path(&self.directory, &audit_name)?;

        let body = format!(
            "Quarantine Date: {}\nOriginal Path: {}\nThreat Name: {}\nScan Output:\n{}\n",
            at.to_rfc3339(),
            original.display(),
            threat_name,
            scan.scan_output.as_deref().unwrap_or(""),
        );

        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&audit_path)
            .and_then(|mut file| file.write_all(body.as_bytes()))
            .map_err(|e| StorageError::WriteFile {
                path: audit_path.clone(),
                source: e,
            })?;

        Ok(audit_path)
    }
}
