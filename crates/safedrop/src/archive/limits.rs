use serde::{Deserialize, Serialize};

use crate::error::ArchiveBombError;

const MIB: u64 = 1024 * 1024;

/// Resource caps applied to every archive, regardless of scan policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
    /// Deepest directory nesting allowed inside one archive. Also caps how
    /// many archives may be nested inside each other.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_files() -> usize {
    1000
}

fn default_max_total_size() -> u64 {
    100 * MIB
}

fn default_max_depth() -> usize {
    10
}

fn default_max_file_size() -> u64 {
    50 * MIB
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_total_size: default_max_total_size(),
            max_depth: default_max_depth(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// True for member names that could land outside the extraction root:
/// anything containing `..`, or starting with a separator or a drive letter.
pub fn is_unsafe_entry_name(name: &str) -> bool {
    if name.contains("..") || name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Running tally of entries checked against [`ArchiveLimits`].
///
/// Used twice per archive: once over the declared entry list before anything
/// touches the disk, and once over the bytes actually written.
#[derive(Debug, Clone)]
pub struct EntryBudget {
    limits: ArchiveLimits,
    entries: usize,
    total_size: u64,
}

impl EntryBudget {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self {
            limits,
            entries: 0,
            total_size: 0,
        }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Accounts for one declared entry. Directories count toward the entry
    /// limit but carry no size.
    pub fn admit(&mut self, name: &str, size: u64, is_file: bool) -> Result<(), ArchiveBombError> {
        self.entries += 1;
        if self.entries > self.limits.max_files {
            return Err(ArchiveBombError::TooManyFiles {
                count: self.entries,
                limit: self.limits.max_files,
            });
        }

        if is_unsafe_entry_name(name) {
            return Err(ArchiveBombError::UnsafeEntryName(name.to_string()));
        }

        if is_file {
            self.charge(name, size)?;
        }
        Ok(())
    }

    /// Adds `size` bytes for `name` to the running total.
    pub fn charge(&mut self, name: &str, size: u64) -> Result<(), ArchiveBombError> {
        if size > self.limits.max_file_size {
            return Err(ArchiveBombError::EntryTooLarge {
                name: name.to_string(),
                size,
                limit: self.limits.max_file_size,
            });
        }

        self.total_size = self.total_size.saturating_add(size);
        if self.total_size > self.limits.max_total_size {
            return Err(ArchiveBombError::TotalSizeExceeded {
                total: self.total_size,
                limit: self.limits.max_total_size,
            });
        }
        Ok(())
    }
}
