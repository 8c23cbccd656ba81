//! Text extraction for uploaded documents.
//!
//! Uploads arrive as raw bytes plus a MIME type; this module returns plain
//! UTF-8 text for the chunker. PDF is the primary format; plain text and
//! markdown pass through unchanged.

/// Supported MIME types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

use crate::error::PipelineError;

/// Extract plain text from raw document bytes.
///
/// Does not panic on malformed input; a corrupt file surfaces as
/// [`PipelineError::ExtractionFailure`]. Emptiness of the result is judged
/// by the caller, which owns the empty-document policy.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Result<String, PipelineError> {
    match mime_type {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| PipelineError::ExtractionFailure(e.to_string())),
        MIME_TEXT | MIME_MARKDOWN => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(PipelineError::ExtractionFailure(format!(
            "unsupported content-type: {}",
            other
        ))),
    }
}

/// Detect a MIME type from a file extension (CLI convenience; web callers
/// pass the upload's declared type).
pub fn detect_mime_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("pdf") => MIME_PDF,
        Some("md") => MIME_MARKDOWN,
        _ => MIME_TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailure(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailure(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("des notes de cours".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(text, "des notes de cours");
    }

    #[test]
    fn detects_mime_from_extension() {
        assert_eq!(detect_mime_type("Chapitre 2 - Gestion.pdf"), MIME_PDF);
        assert_eq!(detect_mime_type("notes.md"), MIME_MARKDOWN);
        assert_eq!(detect_mime_type("notes.txt"), MIME_TEXT);
    }
}
