//! Core data models used throughout genterm.
//!
//! These types represent the uploaded files, per-query extraction results,
//! and terminal lines that flow through the query pipeline.

use std::sync::Arc;

/// MIME marker shared by every image type.
pub const IMAGE_MARKER: &str = "image/";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// A file accepted by the upload surface.
///
/// Immutable once stored. The byte buffer is shared, so cloning a file (for
/// example when a query snapshots the upload list) does not copy content.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    /// Declared MIME type, or the best guess from the file extension.
    pub mime: String,
    bytes: Arc<[u8]>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime: mime.into(),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the content, for moving into blocking tasks.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Declared type carries the image marker.
    pub fn declares_image(&self) -> bool {
        self.mime.contains(IMAGE_MARKER)
    }

    /// Image by declared type or by a `.jpg`/`.jpeg`/`.png` name (any case).
    pub fn is_image_candidate(&self) -> bool {
        if self.declares_image() {
            return true;
        }
        let lower = self.name.to_ascii_lowercase();
        [".jpg", ".jpeg", ".png"]
            .iter()
            .any(|ext| lower.ends_with(ext))
    }
}

/// Outcome of extracting one file for one query.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub file: UploadedFile,
    /// `None` means the file is skipped silently.
    pub content: Option<String>,
    /// Content is an error placeholder.
    pub failed: bool,
}

impl ExtractionResult {
    pub fn text(file: &UploadedFile, content: String) -> Self {
        Self {
            file: file.clone(),
            content: Some(content),
            failed: false,
        }
    }

    pub fn skipped(file: &UploadedFile) -> Self {
        Self {
            file: file.clone(),
            content: None,
            failed: false,
        }
    }

    pub fn failed(file: &UploadedFile) -> Self {
        Self {
            file: file.clone(),
            content: Some(format!("[Error extracting content from {}]", file.name)),
            failed: true,
        }
    }
}

/// A conversation session issued by the session gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
}

/// Who produced a terminal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    System,
    User,
    Assistant,
    Error,
}

/// One entry of the visible transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalLine {
    pub text: String,
    pub kind: LineKind,
}

impl TerminalLine {
    pub fn new(text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::System)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::Assistant)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, LineKind::Error)
    }
}

/// Human-readable size: bytes below 1 KiB, then one decimal of KB or MB.
pub fn format_file_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}
