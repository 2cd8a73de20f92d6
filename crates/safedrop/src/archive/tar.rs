use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use ::tar::{Archive, EntryType};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::{debug, warn};

use super::limits::{ArchiveLimits, EntryBudget};
use super::{member_path, read_up_to, write_member, ArchiveError};
use crate::error::ArchiveBombError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    fn sniff(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if magic.starts_with(b"BZh") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

/// Opens a tar stream, picking the decompressor from the leading bytes
/// rather than trusting the file extension.
fn open(path: &Path) -> Result<(Archive<Box<dyn Read>>, Compression), ArchiveError> {
    let mut file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut magic = [0u8; 3];
    let read = read_up_to(&mut file, &mut magic).map_err(|e| ArchiveError::io(path, e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ArchiveError::io(path, e))?;

    let compression = Compression::sniff(&magic[..read]);
    let reader = BufReader::new(file);
    let stream: Box<dyn Read> = match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
    };
    Ok((Archive::new(stream), compression))
}

fn entry_name<R: Read>(entry: &::tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

fn is_regular(kind: EntryType) -> bool {
    matches!(kind, EntryType::Regular | EntryType::Continuous)
}

/// Reads every header and applies the declared-size limits. Data blocks are
/// skipped, not written anywhere.
pub fn prescan(path: &Path, limits: &ArchiveLimits) -> Result<EntryBudget, ArchiveError> {
    let (mut archive, _) = open(path)?;
    let mut budget = EntryBudget::new(*limits);

    for entry in archive.entries().map_err(|e| ArchiveError::io(path, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(path, e))?;
        let kind = entry.header().entry_type();
        budget.admit(&entry_name(&entry), entry.size(), is_regular(kind))?;
    }
    Ok(budget)
}

pub fn extract(path: &Path, root: &Path, limits: &ArchiveLimits) -> Result<(), ArchiveError> {
    let declared = prescan(path, limits)?;
    debug!(
        entries = declared.entries(),
        declared_bytes = declared.total_size(),
        "Tar pre-scan passed"
    );

    let (mut archive, compression) = open(path)?;
    debug!(compression = ?compression, "Unpacking tar stream");

    let mut written = EntryBudget::new(*limits);
    for entry in archive.entries().map_err(|e| ArchiveError::io(path, e))? {
        let mut entry = entry.map_err(|e| ArchiveError::io(path, e))?;
        let name = entry_name(&entry);
        let kind = entry.header().entry_type();
        let Some(dest) = member_path(root, &name)? else {
            if kind.is_dir() {
                debug!(member = %name, "Skipping tar entry for the archive root");
                continue;
            }
            return Err(ArchiveBombError::UnsafeEntryName(name).into());
        };

        if kind.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| ArchiveError::io(&dest, e))?;
        } else if is_regular(kind) {
            write_member(&mut entry, &dest, &name, &mut written, limits)?;
        } else {
            // Links and device nodes are never materialized.
            warn!(member = %name, kind = ?kind, "Skipping non-regular tar member");
        }
    }

    Ok(())
}
