use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageError;

/// Upper bound on `name_N.ext` candidates tried before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// `mkdir -p`. Safe to race with other workers creating the same tree.
pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete for cross-device moves.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Splits `report.pdf` into `("report", Some(".pdf"))`. A leading dot does
/// not start an extension, so `.env` has none.
pub fn split_file_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(0) | None => (file_name, None),
        Some(dot) => (&file_name[..dot], Some(&file_name[dot..])),
    }
}

/// Candidate name for the `attempt`-th try: the name itself first, then
/// `name_1.ext`, `name_2.ext`, …
fn candidate_name(file_name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match split_file_name(file_name) {
        (base, Some(ext)) => format!("{}_{}{}", base, attempt, ext),
        (base, None) => format!("{}_{}", base, attempt),
    }
}

/// Atomically claims a free name for `file_name` inside `directory`.
///
/// Each candidate is created with `create_new` (O_CREAT | O_EXCL), so two
/// workers can never be handed the same path. The returned path exists as an
/// empty placeholder owned by the caller.
pub fn reserve_path(directory: &Path, file_name: &str) -> Result<PathBuf, StorageError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = directory.join(candidate_name(file_name, attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::WriteFile {
                    path: candidate,
                    source: e,
                })
            }
        }
    }

    Err(StorageError::NamesExhausted(directory.join(file_name)))
}

/// Moves `src` into `directory` under `file_name`, disambiguating with a
/// numeric suffix when the name is taken. Returns the final path.
pub fn place_file(src: &Path, directory: &Path, file_name: &str) -> Result<PathBuf, StorageError> {
    ensure_directory(directory)?;
    let target = reserve_path(directory, file_name)?;

    if let Err(e) = move_file(src, &target) {
        // Give the name back so a failed move leaves no empty placeholder.
        if let Err(cleanup) = std::fs::remove_file(&target) {
            warn!(error = %cleanup, "Failed to release reserved destination name");
        }
        return Err(e);
    }

    debug!(
        name = %target.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
        "File placed"
    );
    Ok(target)
}

/// The file-name component of `path` as UTF-8, or `InvalidFileName`.
pub fn file_name_of(path: &Path) -> Result<String, StorageError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidFileName(path.to_path_buf()))
}
