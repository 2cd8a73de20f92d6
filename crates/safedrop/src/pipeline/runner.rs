use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::archive::{ArchiveExtractor, ArchiveFormat, Extraction};
use crate::classifier::{self, Classifier, RuleClassifier};
use crate::error::{ArchiveBombError, PathValidationError};
use crate::processor::{MetadataExtractor, OcrTextExtractor, TextExtractor};
use crate::sanitize::redact_path;
use crate::security::{
    ClamAvScanner, PathValidator, QuarantineManager, Scanner, SecurityScanResult,
    SecurityScanner, THREAT_ARCHIVE_BOMB, THREAT_PATH_VALIDATION,
};
use crate::stability::{StabilityDetector, StabilityVerdict};
use crate::storage::FileOrganizer;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::result::{Outcome, ProcessingResult};

/// The pluggable parts of a pipeline.
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub scanner: Arc<dyn Scanner>,
    pub text_extractor: Arc<dyn TextExtractor>,
}

impl Collaborators {
    /// Rule-based classifier, ClamAV and tesseract. Missing binaries are
    /// reported once here; the scan policy still decides what that means.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let scanner = ClamAvScanner::new(config.scanner_binary.clone());
        if config.security_scan_enabled && !scanner.is_available() {
            warn!(
                binary = %config.scanner_binary,
                policy = ?config.scan_policy,
                "Security scanner not found on PATH"
            );
        }

        let ocr = OcrTextExtractor::new(&config.ocr);
        if config.ocr_enabled && !ocr.is_available() {
            warn!(
                binary = %config.ocr.binary,
                "OCR engine not found on PATH, files will be organized without metadata"
            );
        }

        Self {
            classifier: Arc::new(RuleClassifier::new()),
            scanner: Arc::new(scanner),
            text_extractor: Arc::new(ocr),
        }
    }
}

enum Step {
    Finished(ProcessingResult),
    /// An archive was unpacked; its members run next.
    Expand(ArchiveFrame),
}

/// An unpacked archive whose members are still being processed.
struct ArchiveFrame {
    archive: PathBuf,
    category: String,
    level: usize,
    extraction: Extraction,
    extracted_files: Vec<String>,
    quarantined_files: Vec<String>,
    failures: Vec<String>,
}

impl ArchiveFrame {
    fn new(archive: PathBuf, category: String, level: usize, extraction: Extraction) -> Self {
        Self {
            archive,
            category,
            level,
            extraction,
            extracted_files: Vec::new(),
            quarantined_files: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn next_member(&mut self) -> Option<(PathBuf, usize)> {
        let level = self.level + 1;
        self.extraction.next_member().map(|member| (member, level))
    }

    fn record_child(&mut self, result: ProcessingResult) {
        match (result.outcome, result.final_path) {
            (Outcome::Organized, Some(path)) => {
                self.extracted_files.push(path.display().to_string())
            }
            (Outcome::Quarantined, Some(path)) => {
                self.quarantined_files.push(path.display().to_string())
            }
            _ => self
                .failures
                .push(result.error.unwrap_or_else(|| "unknown error".to_string())),
        }
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    validator: PathValidator,
    stability: StabilityDetector,
    scanner: SecurityScanner,
    quarantine: QuarantineManager,
    classifier: Arc<dyn Classifier>,
    extractor: ArchiveExtractor,
    metadata: MetadataExtractor,
    organizer: FileOrganizer,
}

impl Pipeline {
    /// Production constructor: real classifier, scanner and OCR engine.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::new(config, collaborators)
    }

    /// Builds a pipeline around the given collaborators and creates the
    /// quarantine and category directories.
    pub fn new(config: Arc<PipelineConfig>, collaborators: Collaborators) -> Self {
        let pipeline = Self {
            validator: PathValidator::new(&config.source_directory),
            stability: StabilityDetector::new(config.stability.clone()),
            scanner: SecurityScanner::new(
                collaborators.scanner,
                config.scan_policy,
                config.scan_timeout,
            ),
            quarantine: QuarantineManager::new(&config.quarantine_directory),
            classifier: collaborators.classifier,
            extractor: ArchiveExtractor::new(config.archive_limits),
            metadata: MetadataExtractor::new(collaborators.text_extractor),
            organizer: FileOrganizer::new(&config.destination_directory, config.categories.clone()),
            config,
        };
        pipeline.prepare_directories();
        pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn prepare_directories(&self) {
        if let Err(e) = self.quarantine.prepare() {
            warn!(error = %e, "Could not prepare quarantine directory");
        }
        if let Err(e) = self.organizer.prepare() {
            warn!(error = %e, "Could not prepare destination directories");
        }
    }

    /// Runs one file through the pipeline. Never panics and never returns
    /// an error: every outcome, including rejections, is a result.
    pub fn process(&self, path: &Path) -> ProcessingResult {
        let _pipeline_span = info_span!("pipeline", file = %redact_path(path)).entered();

        match catch_unwind(AssertUnwindSafe(|| self.drive(path))) {
            Ok(result) => result,
            Err(_panic) => {
                error!(file = %redact_path(path), "Pipeline panicked while processing file");
                ProcessingResult::failed("Unexpected internal error while processing file")
            }
        }
    }

    /// Archive members are processed depth-first off an explicit stack, so
    /// nesting never grows the call stack.
    fn drive(&self, path: &Path) -> ProcessingResult {
        let mut stack: Vec<ArchiveFrame> = Vec::new();
        let mut step = self.run_file(path, 0);

        loop {
            match step {
                Step::Expand(frame) => stack.push(frame),
                Step::Finished(result) => match stack.last_mut() {
                    Some(parent) => parent.record_child(result),
                    None => return result,
                },
            }
            step = self.advance(&mut stack);
        }
    }

    /// Runs the next member of the innermost archive, or closes that archive
    /// out once it has none left.
    fn advance(&self, stack: &mut Vec<ArchiveFrame>) -> Step {
        match stack.last_mut().and_then(ArchiveFrame::next_member) {
            Some((member, level)) => self.run_file(&member, level),
            None => match stack.pop() {
                Some(frame) => Step::Finished(self.finish_archive(frame)),
                None => Step::Finished(ProcessingResult::failed("Archive work stack is empty")),
            },
        }
    }

    fn run_file(&self, path: &Path, level: usize) -> Step {
        let _file_span = info_span!("file", file = %redact_path(path), nesting = level).entered();
        let mut ctx = PipelineContext::new(path, level);

        match self.run_stages(&mut ctx) {
            Ok(step) => step,
            Err(PipelineError::PathValidation(e)) => {
                Step::Finished(self.reject_path(ctx.current_path(), e))
            }
            Err(PipelineError::ArchiveBomb(e)) => {
                warn!(error = %e, "Archive bomb detected");
                Step::Finished(self.quarantine_as(ctx.current_path(), THREAT_ARCHIVE_BOMB, e.to_string()))
            }
            Err(e) => {
                error!(error = %e, "File processing failed");
                Step::Finished(ProcessingResult::failed(e.to_string()))
            }
        }
    }

    fn run_stages(&self, ctx: &mut PipelineContext) -> Result<Step, PipelineError> {
        // Step 1: Validate path
        {
            let _step = info_span!("validate_path").entered();
            ctx.canonical = Some(self.validator.validate(&ctx.path)?);
        }
        let path = ctx.current_path().to_path_buf();

        // Step 2: Wait for the file to settle. Extracted members are ours.
        if ctx.level == 0 {
            let _step = info_span!("stable_check").entered();
            let verdict = self.stability.check(&path);
            if verdict != StabilityVerdict::Stable {
                info!(verdict = ?verdict, "File not stable, deferring");
                return Ok(Step::Finished(
                    ProcessingResult::deferred("File is not stable yet")
                        .with_meta("stability", format!("{:?}", verdict)),
                ));
            }
        }

        // Step 3: Security scan
        if self.config.security_scan_enabled {
            let _step = info_span!("security_scan").entered();
            let scan = self.scanner.scan(&path);
            if !scan.is_clean {
                return Ok(Step::Finished(self.quarantine_scanned(&path, &scan)));
            }
            ctx.scan = Some(scan);
        }

        // Step 4: Classify
        let category = {
            let _step = info_span!("classify").entered();
            self.classifier.classify(&path)
        };
        debug!(category = %category, "File classified");
        ctx.category = Some(category.clone());

        // Step 5: Unpack archives
        if category == classifier::ARCHIVE && self.config.archive_extraction_enabled {
            match ArchiveFormat::detect(&path) {
                Some(format) => {
                    let _step = info_span!("extract_archive", format = format.as_str()).entered();
                    let limit = self.extractor.limits().max_depth;
                    if ctx.level >= limit {
                        return Err(ArchiveBombError::NestingExceeded {
                            level: ctx.level + 1,
                            limit,
                        }
                        .into());
                    }
                    let extraction = self.extractor.extract(&path, format)?;
                    return Ok(Step::Expand(ArchiveFrame::new(path, category, ctx.level, extraction)));
                }
                None => debug!("Archive format cannot be unpacked, organizing as-is"),
            }
        }

        // Step 6: OCR metadata
        if self.config.ocr_enabled && (category == classifier::IMAGE || category == classifier::PDF) {
            let _step = info_span!("ocr_extract").entered();
            ctx.metadata = self.metadata.extract(&path);
        }

        // Step 7: Organize
        let final_path = {
            let _step = info_span!("organize").entered();
            self.organizer.organize(&path, &category, ctx.metadata.as_ref())?
        };

        Ok(Step::Finished(organized_result(final_path, ctx)))
    }

    fn finish_archive(&self, frame: ArchiveFrame) -> ProcessingResult {
        let _archive_span = info_span!("archive", file = %redact_path(&frame.archive)).entered();
        let ArchiveFrame {
            archive,
            category,
            extraction,
            extracted_files,
            quarantined_files,
            failures,
            ..
        } = frame;

        let file_count = extraction.file_count();
        let total_size = extraction.total_size();
        let skipped = extraction.skipped();
        let format = extraction.format().as_str();
        // Removes the temporary extraction directory and anything left in it.
        drop(extraction);

        let summary = |result: ProcessingResult| {
            result
                .with_meta("archive_format", format)
                .with_meta("file_count", file_count)
                .with_meta("total_extracted_size", total_size)
                .with_meta("skipped_members", skipped)
                .with_meta("extracted_files", extracted_files.clone())
                .with_meta("quarantined_files", quarantined_files.clone())
                .with_meta("failed_members", failures.clone())
        };

        match self.organizer.organize(&archive, &category, None) {
            Ok(final_path) => {
                info!(
                    files = file_count,
                    bytes = total_size,
                    quarantined = quarantined_files.len(),
                    failed = failures.len(),
                    "Archive processed"
                );
                summary(ProcessingResult::organized(final_path).with_meta("category", category.clone()))
            }
            Err(e) => {
                error!(error = %e, "Failed to organize archive after extraction");
                summary(ProcessingResult::failed(format!("Failed to organize archive: {}", e)))
            }
        }
    }

    /// Path rejections are security events. Whatever still exists at the
    /// path is quarantined; a vanished path or a directory is reported.
    fn reject_path(&self, path: &Path, err: PathValidationError) -> ProcessingResult {
        warn!(error = %err, "Path validation failed");
        match path.symlink_metadata() {
            Ok(metadata) if !metadata.is_dir() => {
                self.quarantine_as(path, THREAT_PATH_VALIDATION, err.to_string())
            }
            _ => ProcessingResult::failed(err.to_string())
                .with_meta("threat_name", THREAT_PATH_VALIDATION),
        }
    }

    fn quarantine_as(&self, path: &Path, threat: &str, detail: String) -> ProcessingResult {
        self.quarantine_scanned(path, &SecurityScanResult::threat(threat, Some(detail)))
    }

    fn quarantine_scanned(&self, path: &Path, scan: &SecurityScanResult) -> ProcessingResult {
        let _step = info_span!("quarantine").entered();
        match self.quarantine.quarantine(path, scan) {
            Ok(record) => ProcessingResult::quarantined(&record),
            Err(e) => {
                error!(error = %e, "Quarantine failed");
                ProcessingResult::failed(format!("Quarantine failed: {}", e))
                    .with_meta("threat_name", scan.threat_name.clone().unwrap_or_default())
            }
        }
    }
}

fn organized_result(final_path: PathBuf, ctx: &PipelineContext) -> ProcessingResult {
    let mut result = ProcessingResult::organized(final_path);
    if let Some(category) = &ctx.category {
        result = result.with_meta("category", category.clone());
    }
    if let Some(policy) = ctx.scan.as_ref().and_then(|scan| scan.decided_by) {
        result = result.with_meta("scan_decided_by", format!("{:?}", policy));
    }
    if let Some(meta) = &ctx.metadata {
        result = result.with_meta("ocr_confidence", meta.confidence);
        if let Some(date) = meta.date_detected {
            result = result.with_meta("ocr_date", date.to_string());
        }
        if let Some(sender) = &meta.sender {
            result = result.with_meta("ocr_sender", sender.clone());
        }
        if let Some(context) = &meta.business_context {
            result = result.with_meta("ocr_business_context", context.clone());
        }
    }
    result
}
