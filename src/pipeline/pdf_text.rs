//! Embedded-text extraction for PDF menus via pdfium.
//!
//! No OCR is involved: only the text layer is read. A scanned PDF without a
//! text layer therefore yields an empty string, which is a valid result.
//!
//! pdfium is not async-safe, so the whole document walk runs inside
//! `spawn_blocking`.

use crate::error::StageError;
use crate::progress::ProgressCallback;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Text layer of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfText {
    pub text: String,
    pub pages: usize,
    pub pages_with_text: usize,
}

/// Read the text layer of every page, in page order.
pub async fn extract_pdf_text(
    bytes: Vec<u8>,
    password: Option<String>,
    library_path: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<PdfText, StageError> {
    tokio::task::spawn_blocking(move || {
        extract_blocking(
            &bytes,
            password.as_deref(),
            library_path.as_deref(),
            progress,
        )
    })
    .await
    .map_err(|e| StageError::Extraction {
        detail: format!("PDF text task panicked: {e}"),
    })?
}

fn bind(library_path: Option<&Path>) -> Result<Pdfium, StageError> {
    let bound = match library_path {
        Some(path) => pdfium_auto::bind_pdfium_from_path(path),
        None => pdfium_auto::bind_pdfium_silent(),
    };
    bound.map_err(|e| StageError::Extraction {
        detail: format!("pdfium unavailable: {e}"),
    })
}

fn extract_blocking(
    bytes: &[u8],
    password: Option<&str>,
    library_path: Option<&Path>,
    progress: Option<ProgressCallback>,
) -> Result<PdfText, StageError> {
    let pdfium = bind(library_path)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            let detail = if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    "wrong PDF password".to_string()
                } else {
                    "PDF is password-protected".to_string()
                }
            } else {
                format!("PDF could not be opened: {err_str}")
            };
            StageError::Extraction { detail }
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let mut page_texts = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("Page {}: no readable text layer ({:?})", idx + 1, e);
                String::new()
            }
        };
        debug!("Page {} → {} chars", idx + 1, text.len());
        if let Some(cb) = &progress {
            cb.on_page_extracted(idx + 1, total, text.len());
        }
        page_texts.push(text);
    }

    let pages_with_text = page_texts.iter().filter(|t| !t.trim().is_empty()).count();
    Ok(PdfText {
        text: join_page_texts(&page_texts),
        pages: total,
        pages_with_text,
    })
}

/// Join page texts in order, separating pages by a blank line. Whitespace-only
/// pages do not contribute separators. Page text is kept as extracted; only
/// the ends of the joined text are trimmed.
pub fn join_page_texts(pages: &[String]) -> String {
    pages
        .iter()
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}
