//! Text extraction for uploaded source files.
//!
//! Ingestion works on plain UTF-8; this module turns an uploaded file's
//! bytes into that text. PDF extraction failures and unsupported formats
//! are reported as unreadable sources, not panics.

use crate::error::{Error, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Extract plain text from uploaded bytes by content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_TEXT => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(Error::EmptyOrUnreadableSource(format!(
            "unsupported content type: {other}"
        ))),
    }
}

/// Content type for a file name, by extension.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit('.').next()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" | "md" => Some(MIME_TEXT),
        _ => None,
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::EmptyOrUnreadableSource(format!("PDF extraction failed: {e}")))
}
