//! Text extraction dispatch: images go to OCR, PDFs to their text layer.

use crate::config::MenuConfig;
use crate::error::StageError;
use crate::pipeline::input::{DocumentKind, RawDocument};
use crate::pipeline::ocr::{self, OcrBackend};
use crate::pipeline::pdf_text;
use crate::progress::{NoopProgress, PipelineProgress};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Plain text pulled out of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    /// Pages seen (OCR pages or PDF pages).
    pub pages: usize,
    /// OCR status polls; 0 for PDFs.
    pub ocr_polls: u32,
    pub duration_ms: u64,
}

/// Extract the text of `document`.
///
/// An image needs an OCR backend; without one the stage fails. Empty text
/// (blank image, failed OCR operation, PDF without a text layer) is a
/// successful result.
pub async fn extract_text(
    document: &RawDocument,
    ocr_backend: Option<&dyn OcrBackend>,
    config: &MenuConfig,
) -> Result<ExtractedText, StageError> {
    let start = Instant::now();
    let noop = NoopProgress;
    let progress: &dyn PipelineProgress = match config.progress {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };

    let mut extracted = match document.kind {
        DocumentKind::Image(_) => {
            let backend = ocr_backend.ok_or_else(|| StageError::Extraction {
                detail: format!("no OCR backend configured for image '{}'", document.name),
            })?;
            let out = ocr::read_image_text(backend, &document.bytes, config, progress).await?;
            ExtractedText {
                text: out.text,
                pages: out.pages,
                ocr_polls: out.polls,
                duration_ms: 0,
            }
        }
        DocumentKind::Pdf => {
            let out = pdf_text::extract_pdf_text(
                document.bytes.clone(),
                config.pdf_password.clone(),
                config.pdfium_lib_path.as_ref().map(PathBuf::from),
                config.progress.clone(),
            )
            .await?;
            ExtractedText {
                text: out.text,
                pages: out.pages,
                ocr_polls: 0,
                duration_ms: 0,
            }
        }
    };

    extracted.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} chars from '{}' in {}ms",
        extracted.text.len(),
        document.name,
        extracted.duration_ms
    );
    Ok(extracted)
}
