use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::PathValidationError;
use crate::sanitize::redact_path;

/// Confines candidate paths to a small set of trusted roots.
///
/// The roots are canonicalized once at construction so that every check
/// compares resolved paths with resolved paths (on macOS the temp dir lives
/// behind the `/var -> /private/var` symlink).
#[derive(Debug, Clone)]
pub struct PathValidator {
    roots: Vec<PathBuf>,
}

impl PathValidator {
    /// Allows the configured source root and the system temporary directory,
    /// where archive members are extracted before they are reprocessed.
    pub fn new(source_root: impl AsRef<Path>) -> Self {
        Self::with_roots([source_root.as_ref().to_path_buf(), std::env::temp_dir()])
    }

    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| {
                let root = root.as_ref();
                root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
            })
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Validates `path` and returns its canonical form.
    ///
    /// Checks run in order: traversal markers in the raw path, existence,
    /// regular-file type, then containment in one of the allowed roots.
    pub fn validate(&self, path: &Path) -> Result<PathBuf, PathValidationError> {
        let display = path.to_string_lossy().into_owned();

        if has_traversal_marker(&display) {
            return Err(PathValidationError::TraversalMarker(display));
        }

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PathValidationError::Missing(display));
            }
            Err(e) => {
                return Err(PathValidationError::Resolve {
                    path: display,
                    reason: e.to_string(),
                });
            }
        };

        if !metadata.is_file() {
            return Err(PathValidationError::NotRegularFile(display));
        }

        let resolved = path
            .canonicalize()
            .map_err(|e| PathValidationError::Resolve {
                path: display.clone(),
                reason: e.to_string(),
            })?;

        if !self.roots.iter().any(|root| resolved.starts_with(root)) {
            return Err(PathValidationError::OutsideAllowedRoots(display));
        }

        debug!(file = %redact_path(path), "Path validated");
        Ok(resolved)
    }
}

/// True when a raw, unresolved path string carries a parent-directory marker
/// or a home-relative component.
pub fn has_traversal_marker(raw: &str) -> bool {
    if raw.contains("..") {
        return true;
    }
    Path::new(raw).components().any(|component| match component {
        Component::ParentDir => true,
        Component::Normal(part) => part.to_string_lossy().starts_with('~'),
        _ => false,
    })
}

/// Resolves `candidate` (following symlinks) and checks it stays under
/// `root`. Returns the resolved path.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<PathBuf, PathValidationError> {
    let display = candidate.to_string_lossy().into_owned();
    let root = root
        .canonicalize()
        .map_err(|e| PathValidationError::Resolve {
            path: root.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;
    let resolved = candidate
        .canonicalize()
        .map_err(|e| PathValidationError::Resolve {
            path: display.clone(),
            reason: e.to_string(),
        })?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(PathValidationError::OutsideAllowedRoots(display))
    }
}
