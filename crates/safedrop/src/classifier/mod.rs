//! File classification into a small, fixed vocabulary of category labels.
//!
//! The pipeline only relies on the returned label; the organizer maps it to
//! a destination directory.

pub mod signature;

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::LazyLock;

use tracing::{debug, warn};

use crate::archive::read_up_to;
use crate::sanitize::redact_path;

pub const PDF: &str = "pdf";
pub const DOCUMENT: &str = "document";
pub const SPREADSHEET: &str = "spreadsheet";
pub const PRESENTATION: &str = "presentation";
pub const IMAGE: &str = "image";
pub const AUDIO: &str = "audio";
pub const VIDEO: &str = "video";
pub const ARCHIVE: &str = "archive";
pub const EXECUTABLE: &str = "executable";
pub const CODE: &str = "code";
pub const UNKNOWN: &str = "unknown";

/// Anything that can put a category label on a file.
pub trait Classifier: Send + Sync {
    fn classify(&self, path: &Path) -> String;
}

static EXTENSIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let table: &[(&[&str], &str)] = &[
        (&["pdf"], PDF),
        (&["doc", "docx", "txt", "rtf", "odt", "pages", "md"], DOCUMENT),
        (&["xls", "xlsx", "csv", "ods", "numbers"], SPREADSHEET),
        (&["ppt", "pptx", "odp", "key"], PRESENTATION),
        (
            &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "svg", "webp", "ico", "heic", "raw"],
            IMAGE,
        ),
        (&["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a"], AUDIO),
        (&["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp"], VIDEO),
        (
            &[
                "zip", "jar", "rar", "7z", "tar", "gz", "bz2", "xz", "tgz", "tbz2", "txz", "tar.gz",
                "tar.bz2", "tar.xz",
            ],
            ARCHIVE,
        ),
        (&["exe", "msi", "dmg", "pkg", "deb", "rpm", "appimage"], EXECUTABLE),
        (
            &[
                "py", "js", "ts", "html", "css", "java", "cpp", "c", "h", "php", "rb", "go", "rs",
                "swift", "kt", "json", "xml", "yaml", "yml", "sh",
            ],
            CODE,
        ),
    ];

    table
        .iter()
        .flat_map(|(exts, category)| exts.iter().map(move |ext| (*ext, *category)))
        .collect()
});

/// Lowercased extension, preferring a compound `tar.*` suffix when present.
fn extension_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    for compound in ["tar.gz", "tar.bz2", "tar.xz"] {
        if name.len() > compound.len() + 1 && name.ends_with(&format!(".{}", compound)) {
            return Some(compound.to_string());
        }
    }
    match name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(name[dot + 1..].to_string()),
    }
}

fn category_for_mime(mime: &mime_guess::Mime) -> Option<&'static str> {
    let essence = mime.essence_str();
    match (mime.type_().as_str(), essence) {
        (_, "application/pdf") => Some(PDF),
        ("image", _) => Some(IMAGE),
        ("audio", _) => Some(AUDIO),
        ("video", _) => Some(VIDEO),
        (_, "application/zip")
        | (_, "application/gzip")
        | (_, "application/x-tar")
        | (_, "application/x-bzip2")
        | (_, "application/x-7z-compressed")
        | (_, "application/vnd.rar") => Some(ARCHIVE),
        (_, "application/x-msdownload") | (_, "application/x-msi") => Some(EXECUTABLE),
        (_, "text/csv") => Some(SPREADSHEET),
        (_, "text/plain") | (_, "application/rtf") | (_, "application/msword") => Some(DOCUMENT),
        (_, "text/html") | (_, "text/css") | (_, "application/javascript") | (_, "application/json") => {
            Some(CODE)
        }
        _ => None,
    }
}

/// Extension table first, then `mime_guess`, then leading-byte signatures.
///
/// A native executable header always wins over the name, so an `.pdf` that
/// is really a PE image is filed as `executable`.
#[derive(Debug, Default, Clone)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn read_header(path: &Path) -> Vec<u8> {
        let mut buf = vec![0u8; signature::SNIFF_LEN];
        match File::open(path).and_then(|mut f| read_up_to(&mut f, &mut buf)) {
            Ok(read) => {
                buf.truncate(read);
                buf
            }
            Err(e) => {
                warn!(file = %redact_path(path), error = %e, "Could not read file header");
                Vec::new()
            }
        }
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, path: &Path) -> String {
        if !path.is_file() {
            warn!(file = %redact_path(path), "Cannot classify non-existent file");
            return UNKNOWN.to_string();
        }

        let header = Self::read_header(path);
        let extension = extension_of(path);

        let category = if signature::is_executable(&header) {
            EXECUTABLE
        } else if let Some(category) = extension.as_deref().and_then(|e| EXTENSIONS.get(e).copied()) {
            category
        } else if let Some(category) = mime_guess::from_path(path)
            .first()
            .as_ref()
            .and_then(category_for_mime)
        {
            category
        } else {
            signature::sniff(&header).unwrap_or(UNKNOWN)
        };

        debug!(
            file = %redact_path(path),
            extension = extension.as_deref().unwrap_or(""),
            category,
            "File classified"
        );
        category.to_string()
    }
}
