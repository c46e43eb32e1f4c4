//! PDF text extraction using the `pdf-extract` crate.

use super::TextExtractor;
use crate::error::ExtractError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts the text layer of a PDF.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, data: &[u8]) -> Result<String, ExtractError> {
        if !data.starts_with(PDF_MAGIC) {
            return Err(ExtractError::Corrupted("missing PDF header".into()));
        }

        pdf_extract::extract_text_from_mem(data).map_err(|e| classify(&e.to_string()))
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}

/// Map an extractor error message onto the typed failures callers handle.
fn classify(message: &str) -> ExtractError {
    let lower = message.to_lowercase();

    if lower.contains("password") {
        ExtractError::PasswordProtected
    } else if lower.contains("encrypt") || lower.contains("decrypt") {
        ExtractError::Encrypted
    } else if ["parse", "xref", "trailer", "header", "invalid", "unexpected", "eof"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        ExtractError::Corrupted(message.to_string())
    } else {
        ExtractError::Other(message.to_string())
    }
}
