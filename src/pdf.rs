//! Page text for the extractor, read from a grade report PDF or from
//! plain text with form feeds between pages.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use thiserror::Error;

/// Page separator written by `pdftotext`.
pub const PAGE_BREAK: char = '\x0c';

#[derive(Error, Debug)]
pub enum PageError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// One string per page. `pdf_extract` can panic on malformed input, so the
/// call runs behind `catch_unwind`.
pub fn pages_from_pdf_bytes(data: &[u8]) -> Result<Vec<String>, PageError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(data)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(PageError::Pdf(e.to_string())),
        Err(_) => Err(PageError::Pdf("malformed document".to_string())),
    }
}

pub fn pages_from_text(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK).map(str::to_string).collect()
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, PageError> {
    std::fs::read(path).map_err(|source| PageError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn read_pdf_pages(path: &Path) -> Result<Vec<String>, PageError> {
    let pages = pages_from_pdf_bytes(&read_bytes(path)?)?;
    tracing::debug!(path = %path.display(), pages = pages.len(), "Read PDF");
    Ok(pages)
}

pub fn read_text_pages(path: &Path) -> Result<Vec<String>, PageError> {
    let text = std::fs::read_to_string(path).map_err(|source| PageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(pages_from_text(&text))
}
