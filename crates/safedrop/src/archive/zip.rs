use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ::zip::ZipArchive;
use tracing::debug;

use super::limits::{ArchiveLimits, EntryBudget};
use super::{member_path, write_member, ArchiveError};
use crate::error::ArchiveBombError;

/// Walks the central directory and applies the declared-size limits.
/// Nothing is decompressed.
pub fn prescan<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    limits: &ArchiveLimits,
) -> Result<EntryBudget, ArchiveError> {
    if archive.len() > limits.max_files {
        return Err(ArchiveBombError::TooManyFiles {
            count: archive.len(),
            limit: limits.max_files,
        }
        .into());
    }

    let mut budget = EntryBudget::new(*limits);
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        budget.admit(entry.name(), entry.size(), !entry.is_dir())?;
    }
    Ok(budget)
}

pub fn extract(path: &Path, root: &Path, limits: &ArchiveLimits) -> Result<(), ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let declared = prescan(&mut archive, limits)?;
    debug!(
        entries = declared.entries(),
        declared_bytes = declared.total_size(),
        "Zip pre-scan passed"
    );

    let mut written = EntryBudget::new(*limits);
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let Some(dest) = member_path(root, &name)? else {
            if entry.is_dir() {
                continue;
            }
            return Err(ArchiveBombError::UnsafeEntryName(name).into());
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| ArchiveError::io(&dest, e))?;
            continue;
        }

        write_member(&mut entry, &dest, &name, &mut written, limits)?;
    }

    Ok(())
}
