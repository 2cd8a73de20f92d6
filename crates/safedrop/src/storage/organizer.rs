use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::{info, warn};

use crate::classifier;
use crate::config::CategoryConfig;
use crate::error::StorageError;
use crate::processor::ExtractedMetadata;
use crate::sanitize::{redact_path, sanitize_segment};
use crate::storage::filesystem::{ensure_directory, file_name_of, place_file};

/// Longest sender segment kept in a destination path.
const MAX_SENDER_CHARS: usize = 50;

/// Classifier labels whose config key is the plural form.
fn config_key(category: &str) -> &str {
    match category {
        classifier::DOCUMENT => "documents",
        classifier::IMAGE => "images",
        classifier::ARCHIVE => "archives",
        classifier::EXECUTABLE => "executables",
        classifier::SPREADSHEET => "spreadsheets",
        classifier::PRESENTATION => "presentations",
        other => other,
    }
}

/// Moves classified files into the destination tree.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    destination: PathBuf,
    categories: BTreeMap<String, CategoryConfig>,
}

impl FileOrganizer {
    pub fn new(destination: impl Into<PathBuf>, categories: BTreeMap<String, CategoryConfig>) -> Self {
        Self {
            destination: destination.into(),
            categories,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Creates the destination root and every configured category directory.
    pub fn prepare(&self) -> Result<(), StorageError> {
        ensure_directory(&self.destination)?;
        for category in self.categories.values() {
            ensure_directory(&self.destination.join(&category.destination))?;
        }
        Ok(())
    }

    /// Sub-directory of the destination root for a classifier label.
    pub fn category_dir(&self, category: &str) -> PathBuf {
        let key = config_key(category);
        match self.categories.get(key) {
            Some(config) => PathBuf::from(&config.destination),
            None => PathBuf::from(
                sanitize_segment(category, MAX_SENDER_CHARS)
                    .unwrap_or_else(|| classifier::UNKNOWN.to_string()),
            ),
        }
    }

    /// `category[/YYYY/MM][/context][/sender]`, relative to the destination root.
    pub fn relative_dir(&self, category: &str, metadata: Option<&ExtractedMetadata>) -> PathBuf {
        let mut dir = self.category_dir(category);
        if let Some(meta) = metadata {
            if let Some(date) = meta.date_detected {
                dir.push(format!("{:04}", date.year()));
                dir.push(format!("{:02}", date.month()));
            }
            let segment = |value: Option<&str>| {
                value.and_then(|v| sanitize_segment(v, MAX_SENDER_CHARS))
            };
            if let Some(context) = segment(meta.business_context.as_deref()) {
                dir.push(context);
            }
            if let Some(sender) = segment(meta.sender.as_deref()) {
                dir.push(sender);
            }
        }
        dir
    }

    /// Moves `source` to its enriched destination. If that fails the file
    /// is placed flat under its category directory instead; only when both
    /// fail is an error returned.
    pub fn organize(
        &self,
        source: &Path,
        category: &str,
        metadata: Option<&ExtractedMetadata>,
    ) -> Result<PathBuf, StorageError> {
        let file_name = file_name_of(source)?;
        let target_dir = self.destination.join(self.relative_dir(category, metadata));

        match place_file(source, &target_dir, &file_name) {
            Ok(final_path) => {
                info!(file = %redact_path(source), category, "File organized");
                Ok(final_path)
            }
            Err(e) => {
                warn!(
                    file = %redact_path(source),
                    error = %e,
                    "Failed to organize file, falling back to flat placement"
                );
                let flat_dir = self.destination.join(self.category_dir(category));
                place_file(source, &flat_dir, &file_name)
            }
        }
    }
}
