//! Per-file text extraction for the query context.
//!
//! Extraction is total: every uploaded file yields an [`ExtractionResult`].
//! Unsupported types are skipped (`content: None`), and any failure inside
//! a parser becomes the placeholder `[Error extracting content from NAME]`.
//! PDF parsing runs on the blocking pool so a panic in the parser is
//! contained to that one file.

use futures::future::join_all;

use crate::error::ExtractError;
use crate::models::{ExtractionResult, UploadedFile, MIME_PDF, MIME_TEXT};

/// How a file is treated by the extractor, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Pdf,
    Text,
    Image,
    Unsupported,
}

pub fn classify(file: &UploadedFile) -> FileClass {
    if file.mime == MIME_PDF || file.name.ends_with(".pdf") {
        FileClass::Pdf
    } else if file.mime == MIME_TEXT || file.name.ends_with(".txt") {
        FileClass::Text
    } else if file.is_image_candidate() {
        FileClass::Image
    } else {
        FileClass::Unsupported
    }
}

/// Extracts one file. Never fails; see the module docs for the fallbacks.
pub async fn extract(file: &UploadedFile) -> ExtractionResult {
    let outcome = match classify(file) {
        FileClass::Pdf => extract_pdf_blocking(file).await,
        FileClass::Text => extract_plain_text(file.bytes()),
        FileClass::Image => return ExtractionResult::text(file, format!("[Image: {}]", file.name)),
        FileClass::Unsupported => {
            tracing::warn!(file = %file.name, mime = %file.mime, "unsupported file type, skipping");
            return ExtractionResult::skipped(file);
        }
    };

    match outcome {
        Ok(text) => ExtractionResult::text(file, text),
        Err(e) => {
            tracing::warn!(file = %file.name, error = %e, "error extracting content");
            ExtractionResult::failed(file)
        }
    }
}

/// Extracts every file concurrently and returns results in input order.
///
/// One file failing does not cancel or delay the others beyond the join.
pub async fn extract_all(files: &[UploadedFile]) -> Vec<ExtractionResult> {
    join_all(files.iter().map(extract)).await
}

async fn extract_pdf_blocking(file: &UploadedFile) -> Result<String, ExtractError> {
    let bytes = file.shared_bytes();
    tokio::task::spawn_blocking(move || extract_pdf(&bytes))
        .await
        .map_err(|e| ExtractError::Aborted(e.to_string()))?
}

/// Page text has its runs joined by single spaces; pages are separated by a
/// blank line and the whole result is trimmed.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let text = pages
        .iter()
        .map(|page| page.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(text.trim().to_string())
}

fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractError> {
    Ok(String::from_utf8(bytes.to_vec())?)
}
