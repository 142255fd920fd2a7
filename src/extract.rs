//! Text extraction for the source PDF.
//!
//! Ingestion hands the raw bytes of the reference book to [`extract_pdf_text`]
//! and gets back normalized UTF-8 text ready for the chunker. Malformed input
//! is reported as an error, never a panic, so a bad document fails startup
//! cleanly instead of crashing mid-build.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read document {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document contains no extractable text")]
    Empty,
}

/// Reads a PDF from disk and returns its normalized text.
pub fn extract_pdf_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Read {
        path: path.display().to_string(),
        source,
    })?;
    extract_pdf_text(&bytes)
}

/// Extracts and normalizes text from in-memory PDF bytes.
///
/// Returns [`ExtractError::Empty`] when the document parses but yields only
/// whitespace (for example a scanned book without a text layer).
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let raw =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

/// Normalizes extracted text: unify line endings, turn page breaks into
/// paragraph breaks, squeeze horizontal whitespace, and cap blank-line runs
/// at one empty line.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n\n");

    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in unified.lines() {
        let squeezed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if squeezed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(squeezed);
    }

    lines.join("\n").trim().to_string()
}
