pub mod metadata;
pub mod ocr;
pub mod pdf;

use std::path::Path;

use tracing::warn;

use crate::error::ProcessError;
use crate::sanitize::redact_path;

pub use metadata::{ExtractedMetadata, MetadataExtractor};
pub use ocr::{OcrSettings, TesseractEngine};
pub use pdf::PdfTextSource;

/// Capability interface over text recognition. `None` means no text could
/// be produced, for whatever reason.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Option<String>;
}

/// Images go straight to tesseract; PDFs use their text layer first and
/// are rendered page by page only when that layer is unusable.
#[derive(Clone)]
pub struct OcrTextExtractor {
    engine: TesseractEngine,
    pdf: PdfTextSource,
}

impl OcrTextExtractor {
    pub fn new(settings: &OcrSettings) -> Self {
        let engine = TesseractEngine::new(settings);
        let pdf = PdfTextSource::new(engine.clone(), settings);
        Self { engine, pdf }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    fn run(&self, path: &Path) -> Result<String, ProcessError> {
        if is_pdf(path) {
            self.pdf.text(path)
        } else {
            self.engine.recognize(path)
        }
    }
}

impl TextExtractor for OcrTextExtractor {
    fn extract(&self, path: &Path) -> Option<String> {
        match self.run(path) {
            Ok(text) => Some(text),
            Err(ProcessError::OcrUnavailable(tool)) => {
                tracing::debug!(tool = %tool, "Text recognition unavailable");
                None
            }
            Err(e) => {
                warn!(file = %redact_path(path), error = %e, "Text extraction failed");
                None
            }
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    {
        return true;
    }
    let mut magic = [0u8; 5];
    std::fs::File::open(path)
        .and_then(|mut f| crate::archive::read_up_to(&mut f, &mut magic))
        .map(|n| n == magic.len() && &magic == b"%PDF-")
        .unwrap_or(false)
}
