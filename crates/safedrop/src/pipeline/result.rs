use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::security::QuarantineRecord;

/// Terminal state a file reached in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Organized,
    Quarantined,
    /// Still being written; left in place for a later event.
    Deferred,
    Failed,
}

/// What happened to one file. Built once per processed file and never
/// mutated afterwards by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub outcome: Outcome,
    pub final_path: Option<PathBuf>,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingResult {
    fn new(outcome: Outcome, final_path: Option<PathBuf>, error: Option<String>) -> Self {
        Self {
            success: matches!(outcome, Outcome::Organized | Outcome::Quarantined),
            outcome,
            final_path,
            error,
            metadata: BTreeMap::new(),
            processed_at: Utc::now(),
        }
    }

    pub fn organized(final_path: PathBuf) -> Self {
        Self::new(Outcome::Organized, Some(final_path), None)
    }

    /// Quarantine counts as success: the file was dealt with as intended.
    pub fn quarantined(record: &QuarantineRecord) -> Self {
        let mut result = Self::new(Outcome::Quarantined, Some(record.path.clone()), None)
            .with_meta("quarantined", true)
            .with_meta("threat_name", record.threat_name.clone());
        if let Some(audit) = &record.audit_path {
            result = result.with_meta("audit_path", audit.display().to_string());
        }
        result
    }

    pub fn deferred(reason: impl Into<String>) -> Self {
        Self::new(Outcome::Deferred, None, Some(reason.into()))
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(Outcome::Failed, None, Some(error.into()))
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_quarantined(&self) -> bool {
        self.outcome == Outcome::Quarantined
    }
}
