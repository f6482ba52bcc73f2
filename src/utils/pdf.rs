//! PDF helpers: artifact validation and text extraction.
//!
//! Text extraction uses the pure-Rust `pdf-extract` crate and runs on the
//! blocking pool when called from async code.

use std::path::Path;
use thiserror::Error;

/// Leading bytes every PDF file starts with
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Errors that can occur during PDF extraction
#[derive(Debug, Error)]
pub enum PdfExtractError {
    #[error("Failed to extract text from PDF: {0}")]
    ExtractionFailed(String),

    #[error("File not found or not a valid PDF: {0}")]
    InvalidFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether `path` holds a plausible PDF: at least `min_size` bytes and the
/// `%PDF-` signature at the start
pub async fn validate_pdf(path: &Path, min_size: u64) -> bool {
    use tokio::io::AsyncReadExt;

    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !meta.is_file() || meta.len() < min_size {
        return false;
    }

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut header = [0u8; 5];
    match file.read_exact(&mut header).await {
        Ok(_) => header == PDF_SIGNATURE,
        Err(_) => false,
    }
}

/// Extract text from a PDF file.
pub fn extract_text(path: &Path) -> Result<String, PdfExtractError> {
    if !path.is_file() {
        return Err(PdfExtractError::InvalidFile(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let text = pdf_extract::extract_text(path)
        .map_err(|e| PdfExtractError::ExtractionFailed(e.to_string()))?;

    if text.trim().is_empty() {
        // Scanned or image-only documents
        tracing::debug!("Extracted empty text from PDF: {}", path.display());
    }
    Ok(text)
}

/// [`extract_text`] on the blocking thread pool
pub async fn extract_text_async(path: &Path) -> Result<String, PdfExtractError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_text(&path))
        .await
        .map_err(|e| PdfExtractError::ExtractionFailed(e.to_string()))?
}
