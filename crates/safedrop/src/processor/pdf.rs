use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::command::run_with_timeout;
use crate::error::ProcessError;
use crate::processor::ocr::{OcrSettings, TesseractEngine};

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is accepted regardless of character composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this share of alphanumeric characters the text layer is treated as garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Reads the embedded text layer of a PDF and falls back to rendering
/// pages with `pdftoppm` and running OCR when that layer is unusable.
#[derive(Clone)]
pub struct PdfTextSource {
    engine: TesseractEngine,
    renderer: Option<PathBuf>,
    renderer_name: String,
    dpi: u32,
    max_pages: u32,
    timeout: Duration,
}

impl PdfTextSource {
    pub fn new(engine: TesseractEngine, settings: &OcrSettings) -> Self {
        Self {
            engine,
            renderer: which::which(&settings.pdf_renderer).ok(),
            renderer_name: settings.pdf_renderer.clone(),
            dpi: settings.dpi,
            max_pages: settings.max_pages,
            timeout: settings.timeout,
        }
    }

    pub fn text(&self, path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        match lopdf::Document::load(path) {
            Ok(doc) => {
                let text = text_layer(&doc, self.max_pages);
                if !should_use_ocr(&text) {
                    return Ok(text);
                }
                let _ocr_span =
                    tracing::info_span!("processor.ocr_fallback", reason = "text_quality").entered();
                self.ocr_pages(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "lopdf failed to parse PDF, falling back to OCR");
                let _ocr_span =
                    tracing::info_span!("processor.ocr_fallback", reason = "lopdf_parse_failed")
                        .entered();
                self.ocr_pages(path)
            }
        }
    }

    fn ocr_pages(&self, path: &Path) -> Result<String, ProcessError> {
        if !self.engine.is_available() {
            return Err(ProcessError::OcrUnavailable("tesseract".to_string()));
        }
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| ProcessError::OcrUnavailable(self.renderer_name.clone()))?;

        let scratch = tempfile::Builder::new()
            .prefix("safedrop-pages-")
            .tempdir()
            .map_err(|e| ProcessError::PdfProcessing(format!("Failed to create temp dir: {}", e)))?;

        let mut all_text = String::new();
        for page in self.render_pages(renderer, path, scratch.path())? {
            match self.engine.recognize(&page) {
                Ok(text) if !text.trim().is_empty() => {
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "OCR failed for rendered page"),
            }
        }
        Ok(all_text)
    }

    /// Renders pages `1..=max_pages` to PNG files under `out_dir`, returned
    /// in page order.
    fn render_pages(
        &self,
        renderer: &Path,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessError> {
        let prefix = out_dir.join("page");
        let mut command = Command::new(renderer);
        command
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(self.max_pages.to_string())
            .arg(pdf)
            .arg(&prefix);

        let output = run_with_timeout(command, self.timeout)?;
        if !output.status.success() {
            return Err(ProcessError::PdfProcessing(format!(
                "{} failed: {}",
                self.renderer_name,
                output.stderr_lossy().trim()
            )));
        }

        let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)
            .map_err(|e| ProcessError::ReadDocument {
                path: out_dir.to_path_buf(),
                source: e,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        // pdftoppm zero-pads page numbers to a common width, so names sort in page order.
        pages.sort();
        Ok(pages)
    }
}

/// Concatenated text of the first `max_pages` pages.
fn text_layer(doc: &lopdf::Document, max_pages: u32) -> String {
    let mut text = String::new();
    for page_num in doc.get_pages().keys().take(max_pages as usize) {
        if let Ok(page_text) = doc.extract_text(&[*page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }
    text
}

/// True when the extracted text layer is empty, only font-encoding error
/// markers, or mostly non-alphanumeric noise.
pub fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a one-page PDF whose text layer contains `line`.
    pub(crate) fn pdf_with_text(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", line);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_should_use_ocr_empty_text() {
        assert!(should_use_ocr(""));
        assert!(should_use_ocr("   \n  "));
    }

    #[test]
    fn test_should_use_ocr_identity_h_only() {
        assert!(should_use_ocr("?Identity-H Unimplemented?\n?Identity-H Unimplemented?"));
    }

    #[test]
    fn test_should_use_ocr_garbled_text() {
        let garbled = "~!@#$%^&*()_+{}|:<>?~!@#$%^&*()_+{}|:<>?~!@#$%^&*()_+{}|";
        assert!(should_use_ocr(garbled));
    }

    #[test]
    fn test_should_not_use_ocr_for_real_text() {
        assert!(!should_use_ocr("Invoice 2024-03-15 from billing@acme.com"));
    }

    #[test]
    fn test_text_layer_is_used_without_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, pdf_with_text("Invoice from billing@acme.com")).unwrap();

        let settings = OcrSettings {
            binary: "safedrop-no-tesseract-here".into(),
            ..OcrSettings::default()
        };
        let source = PdfTextSource::new(TesseractEngine::new(&settings), &settings);
        let text = source.text(&path).unwrap();
        assert!(text.contains("Invoice from billing@acme.com"));
    }

    #[test]
    fn test_unparseable_pdf_without_ocr_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 this is not really a pdf").unwrap();

        let settings = OcrSettings {
            binary: "safedrop-no-tesseract-here".into(),
            ..OcrSettings::default()
        };
        let source = PdfTextSource::new(TesseractEngine::new(&settings), &settings);
        assert!(matches!(
            source.text(&path),
            Err(ProcessError::OcrUnavailable(_))
        ));
    }
}
