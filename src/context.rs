//! Assembles extraction results into the single context blob sent with a query.

use crate::models::ExtractionResult;

const BLOCK_SEPARATOR: &str = "\n\n";

/// Joins every non-skipped result as `[File: NAME]\nCONTENT`, in the order
/// given, separated by a blank line. Empty when nothing has content.
pub fn assemble(results: &[ExtractionResult]) -> String {
    results
        .iter()
        .filter_map(|r| {
            r.content
                .as_ref()
                .map(|content| format!("[File: {}]\n{}", r.file.name, content))
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// The `context` list of a gateway request: empty when there is no context,
/// otherwise exactly one entry holding the whole blob.
pub fn context_list(assembled: &str) -> Vec<String> {
    if assembled.is_empty() {
        Vec::new()
    } else {
        vec![assembled.to_string()]
    }
}
