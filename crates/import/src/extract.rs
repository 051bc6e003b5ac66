use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractError {
    #[error("Document decode error: {0}")]
    Decode(String),
    #[error("Extraction engine error: {0}")]
    Engine(String),
    #[error("Document contains no text")]
    Empty,
}

/// Abstraction over a statement text extractor.
/// Implementations accept the raw uploaded document bytes and return its text.
#[allow(async_fn_in_trait)]
pub trait TextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

// ── Static extractor (always available, used for tests) ───────────────────────

/// Returns a pre-set string regardless of input. Also serves callers that
/// already hold extracted text.
pub struct StaticTextExtractor {
    pub text: String,
}

impl StaticTextExtractor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl TextExtractor for StaticTextExtractor {
    async fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
        Ok(self.text.clone())
    }
}

/// Treats the document bytes as UTF-8 text, as produced by an external
/// `pdftotext` step.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8TextExtractor;

impl TextExtractor for Utf8TextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Decode(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(text.to_string())
    }
}

// ── PDF backend (optional, gated behind `pdf` feature) ────────────────────────

#[cfg(feature = "pdf")]
pub mod pdf_backend {
    use super::{ExtractError, TextExtractor};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct PdfTextExtractor;

    impl TextExtractor for PdfTextExtractor {
        async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Engine(e.to_string()))?;
            if text.trim().is_empty() {
                return Err(ExtractError::Empty);
            }
            Ok(text)
        }
    }
}
