use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{run_with_timeout, CommandError};
use crate::config::OcrConfig;
use crate::error::ProcessError;

/// Settings shared by the OCR engine and the PDF page renderer.
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub binary: String,
    pub pdf_renderer: String,
    pub languages: Vec<String>,
    pub dpi: u32,
    pub max_pages: u32,
    pub timeout: Duration,
}

impl OcrSettings {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            pdf_renderer: config.pdf_renderer.clone(),
            languages: config.languages.clone(),
            dpi: config.dpi,
            max_pages: config.max_pages.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self::from_config(&OcrConfig::default())
    }
}

/// Tesseract driven through its command-line interface.
#[derive(Clone)]
pub struct TesseractEngine {
    inner: Arc<TesseractInner>,
}

struct TesseractInner {
    program: Option<PathBuf>,
    binary: String,
    languages: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(settings: &OcrSettings) -> Self {
        let languages = if settings.languages.is_empty() {
            "eng".to_string()
        } else {
            settings.languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractInner {
                program: which::which(&settings.binary).ok(),
                binary: settings.binary.clone(),
                languages,
                timeout: settings.timeout,
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.program.is_some()
    }

    /// Runs `tesseract <image> stdout -l <langs>` and returns the recognized text.
    pub fn recognize(&self, image_path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.ocr").entered();

        let program = self
            .inner
            .program
            .as_ref()
            .ok_or_else(|| ProcessError::OcrUnavailable(self.inner.binary.clone()))?;

        let mut command = Command::new(program);
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.inner.languages);

        let output = match run_with_timeout(command, self.inner.timeout) {
            Ok(output) => output,
            Err(CommandError::NotFound(program)) => {
                return Err(ProcessError::OcrUnavailable(program))
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            return Err(ProcessError::OcrFailed(format!(
                "{} exited with {}: {}",
                self.inner.binary,
                output.status,
                output.stderr_lossy().trim()
            )));
        }

        let text = output.stdout_lossy();
        tracing::debug!(chars = text.len(), "OCR text recognized");
        Ok(text)
    }
}
