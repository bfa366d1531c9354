//! Error taxonomy for the query pipeline.
//!
//! Each stage has its own error type. Only [`ExtractError`] is recovered
//! locally (it becomes placeholder text); everything else is folded into
//! [`ConsoleError`] and rendered as an `error` line by the console.

use std::time::Duration;
use thiserror::Error;

/// Session creation or lookup failed. Blocks all querying until resolved.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session service unreachable: {0}")]
    Unreachable(String),

    #[error("session service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid session response: {0}")]
    InvalidResponse(String),

    #[error("No active session. Restart genterm to retry.")]
    NoActiveSession,
}

/// Per-file extraction failure. Never leaves the extractor.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("text is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

/// Turning the selected image into a base64 payload failed.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    #[error("Invalid image file: {name}")]
    NotAnImage { name: String },
}

/// The AI Gateway call failed.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Failed to get AI response: {0}")]
    Transport(String),

    #[error("Failed to get AI response: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to get AI response: invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to get AI response: no reply within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Any failure that reaches the command interpreter boundary.
#[derive(Debug, Clone, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Query cancelled.")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_seconds() {
        let err = QueryError::Timeout(Duration::from_secs(30));
        assert_eq!(
            err.to_string(),
            "Failed to get AI response: no reply within 30s"
        );
    }

    #[test]
    fn console_error_is_transparent() {
        let err: ConsoleError = ConversionError::NotAnImage {
            name: "notes.txt".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid image file: notes.txt");
    }
}
