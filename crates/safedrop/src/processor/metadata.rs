use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::processor::TextExtractor;
use crate::sanitize::redact_path;

const DATE_WEIGHT: f64 = 0.3;
const SENDER_WEIGHT: f64 = 0.4;
const CONTEXT_WEIGHT: f64 = 0.3;

/// Checked in order; the first keyword found in the text wins.
pub const BUSINESS_KEYWORDS: &[&str] = &[
    "invoice",
    "receipt",
    "contract",
    "agreement",
    "proposal",
    "statement",
    "bill",
    "purchase",
    "order",
    "delivery",
    "payment",
    "quote",
    "estimate",
];

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b",
        r"\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},?\s+\d{4}\b",
        r"\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+\d{4}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y-%m-%d", "%m-%d-%Y", "%d-%m-%Y", "%m/%d/%y", "%d/%m/%y",
    "%m-%d-%y", "%d-%m-%y", "%B %d, %Y", "%B %d %Y", "%d %b %Y",
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,})\b").unwrap()
});

static SENDER_LABEL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\bfrom[:\s]+([a-z][a-z .'-]*)", r"\bsender[:\s]+([a-z][a-z .'-]*)"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Structured hints derived from a document's recognized text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedMetadata {
    pub text: String,
    pub date_detected: Option<NaiveDate>,
    pub sender: Option<String>,
    pub business_context: Option<String>,
    pub confidence: f64,
}

impl ExtractedMetadata {
    /// Derives date, sender and business context from raw text.
    pub fn analyze(text: &str) -> Self {
        let lowered = text.to_lowercase();

        let date_detected = detect_date(&lowered);
        let sender = detect_sender(&lowered);
        let business_context = BUSINESS_KEYWORDS
            .iter()
            .find(|keyword| lowered.contains(*keyword))
            .map(|keyword| keyword.to_string());

        let mut confidence = 0.0;
        if date_detected.is_some() {
            confidence += DATE_WEIGHT;
        }
        if sender.is_some() {
            confidence += SENDER_WEIGHT;
        }
        if business_context.is_some() {
            confidence += CONTEXT_WEIGHT;
        }

        Self {
            text: text.to_string(),
            date_detected,
            sender,
            business_context,
            confidence,
        }
    }
}

fn detect_date(text: &str) -> Option<NaiveDate> {
    DATE_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.find(text))
        .find_map(|m| parse_date(m.as_str()))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .find(|date| (1900..=2100).contains(&date.year()))
}

fn detect_sender(text: &str) -> Option<String> {
    if let Some(caps) = EMAIL_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    SENDER_LABEL_RES
        .iter()
        .filter_map(|re| re.captures(text))
        .map(|caps| caps[1].trim().to_string())
        .find(|name| !name.is_empty())
}

/// Runs a [`TextExtractor`] and analyzes whatever text comes back.
#[derive(Clone)]
pub struct MetadataExtractor {
    extractor: Arc<dyn TextExtractor>,
}

impl MetadataExtractor {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    /// `None` when no text could be recognized; never an error.
    pub fn extract(&self, path: &Path) -> Option<ExtractedMetadata> {
        let file = redact_path(path);
        info!(file = %file, "Extracting OCR metadata");

        let text = self.extractor.extract(path)?;
        if text.trim().is_empty() {
            debug!(file = %file, "No text recognized");
            return None;
        }

        let metadata = ExtractedMetadata::analyze(&text);
        info!(
            file = %file,
            date = ?metadata.date_detected,
            has_sender = metadata.sender.is_some(),
            context = metadata.business_context.as_deref().unwrap_or(""),
            confidence = metadata.confidence,
            "OCR metadata extraction complete"
        );
        Some(metadata)
    }
}
