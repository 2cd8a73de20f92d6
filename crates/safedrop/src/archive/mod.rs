//! Bounded extraction of untrusted archives.
//!
//! Limits are enforced three times: over the declared entry list before
//! anything is written, over the bytes actually written, and over the
//! extracted tree afterwards.

pub mod limits;
pub mod tar;
pub mod walk;
pub mod zip;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ArchiveBombError;
use crate::sanitize::redact_path;
use crate::security::path_validator::ensure_within;

pub use limits::{ArchiveLimits, EntryBudget};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Bomb(#[from] ArchiveBombError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt zip archive: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    #[error("Unsupported archive format: {0}")]
    Unsupported(String),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Container families that can be unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    /// Plain, gzip or bzip2 compressed; the compression is sniffed on open.
    Tar,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
        }
    }

    /// Detects the format from the file name, falling back to magic bytes.
    /// Returns `None` for containers that cannot be unpacked (rar, 7z, xz)
    /// and for single compressed files (`.gz`, `.bz2` without a tar inside).
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        const ZIP_SUFFIXES: &[&str] = &[".zip", ".jar"];
        const TAR_SUFFIXES: &[&str] = &[".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tbz"];
        const OPAQUE_SUFFIXES: &[&str] = &[".rar", ".7z", ".tar.xz", ".txz", ".xz"];

        if ZIP_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            return Some(ArchiveFormat::Zip);
        }
        if TAR_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            return Some(ArchiveFormat::Tar);
        }
        if OPAQUE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            return None;
        }

        Self::sniff(path)
    }

    /// A gzip or bzip2 stream only counts as a tar when its decompressed
    /// first block carries the `ustar` magic. A lone compressed file such as
    /// `data.csv.gz` returns `None` and is organized as-is.
    fn sniff(path: &Path) -> Option<Self> {
        let mut header = [0u8; 512];
        let read = File::open(path)
            .and_then(|mut f| read_up_to(&mut f, &mut header))
            .ok()?;
        let header = &header[..read];

        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            return Some(ArchiveFormat::Zip);
        }
        if header.starts_with(&[0x1f, 0x8b]) {
            return Self::sniff_compressed(path, GzDecoder::new);
        }
        if header.starts_with(b"BZh") {
            return Self::sniff_compressed(path, BzDecoder::new);
        }
        has_ustar_magic(header).then_some(ArchiveFormat::Tar)
    }

    fn sniff_compressed<D, F>(path: &Path, decoder: F) -> Option<Self>
    where
        D: Read,
        F: FnOnce(BufReader<File>) -> D,
    {
        let file = File::open(path).ok()?;
        let mut stream = decoder(BufReader::new(file));
        let mut header = [0u8; 512];
        // A stream that fails to decode is not a tar either.
        let read = read_up_to(&mut stream, &mut header).ok()?;
        has_ustar_magic(&header[..read]).then_some(ArchiveFormat::Tar)
    }
}

fn has_ustar_magic(block: &[u8]) -> bool {
    block.len() >= 262 && &block[257..262] == b"ustar"
}

/// Fills as much of `buf` as the reader can supply.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Maps an archive member name onto a path under `root`, keeping only
/// normal components.
///
/// Returns `Ok(None)` for a name that resolves to `root` itself, such as the
/// `./` entry GNU tar writes first for `tar -C dir -cf x.tar .`. Callers
/// skip it when it is a directory and reject it otherwise.
pub(crate) fn member_path(root: &Path, name: &str) -> Result<Option<PathBuf>, ArchiveBombError> {
    if name.is_empty() {
        return Err(ArchiveBombError::UnsafeEntryName(name.to_string()));
    }

    let mut path = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(&name.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            _ => return Err(ArchiveBombError::UnsafeEntryName(name.to_string())),
        }
    }
    Ok(pushed.then_some(path))
}

/// Copies one member to `dest`, refusing to write more than the per-file
/// limit no matter what size the archive declared. Returns bytes written.
pub(crate) fn write_member<R: Read>(
    reader: &mut R,
    dest: &Path,
    name: &str,
    budget: &mut EntryBudget,
    limits: &ArchiveLimits,
) -> Result<u64, ArchiveError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }
    let mut out = File::create(dest).map_err(|e| ArchiveError::io(dest, e))?;

    let mut capped = reader.take(limits.max_file_size.saturating_add(1));
    let written = io::copy(&mut capped, &mut out).map_err(|e| ArchiveError::io(dest, e))?;

    budget.charge(name, written)?;
    Ok(written)
}

/// Unpacked archive living in its own temporary directory. The directory is
/// removed when this value is dropped.
#[derive(Debug)]
pub struct Extraction {
    dir: TempDir,
    format: ArchiveFormat,
    pending: VecDeque<PathBuf>,
    file_count: usize,
    total_size: u64,
    skipped: usize,
}

impl Extraction {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Number of regular files found in the extracted tree.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Members dropped because they failed path validation.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next member to hand back to the pipeline, in walk order.
    pub fn next_member(&mut self) -> Option<PathBuf> {
        self.pending.pop_front()
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    limits: ArchiveLimits,
}

impl ArchiveExtractor {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Extracts `archive` into a fresh temporary directory.
    ///
    /// Any limit violation surfaces as `ArchiveError::Bomb`; the temporary
    /// directory is dropped with the error so nothing is left behind.
    pub fn extract(&self, archive: &Path, format: ArchiveFormat) -> Result<Extraction, ArchiveError> {
        let file = redact_path(archive);
        info!(file = %file, format = format.as_str(), "Extracting archive with bomb protection");

        let dir = tempfile::Builder::new()
            .prefix("safedrop-extract-")
            .tempdir()
            .map_err(|e| ArchiveError::io(&std::env::temp_dir(), e))?;

        match format {
            ArchiveFormat::Zip => zip::extract(archive, dir.path(), &self.limits)?,
            ArchiveFormat::Tar => tar::extract(archive, dir.path(), &self.limits)?,
        }

        let summary = walk::verify_tree(dir.path(), &self.limits)?;

        let mut pending = VecDeque::with_capacity(summary.members.len());
        let mut skipped = 0;
        for member in summary.members {
            match validate_member(dir.path(), &member) {
                Ok(()) => pending.push_back(member),
                Err(reason) => {
                    warn!(member = %redact_path(&member), reason = %reason, "Skipping unsafe archive member");
                    skipped += 1;
                }
            }
        }

        info!(
            file = %file,
            files = summary.file_count,
            bytes = summary.total_size,
            "Archive extraction completed safely"
        );

        Ok(Extraction {
            dir,
            format,
            pending,
            file_count: summary.file_count,
            total_size: summary.total_size,
            skipped,
        })
    }
}

/// Confirms an extracted member resolves inside the extraction root.
///
/// Names were already normalized by [`member_path`], tar links are never
/// materialized and zip symlink entries land as plain files, so this only
/// guards canonical containment of what ended up on disk.
fn validate_member(root: &Path, member: &Path) -> Result<(), String> {
    ensure_within(root, member).map_err(|e| e.to_string())?;
    debug!(member = %redact_path(member), "Archive member validated");
    Ok(())
}
