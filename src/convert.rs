//! One-shot conversion entry points.
//!
//! These drive a fresh [`SessionState`] through extract → structure → parse
//! for callers that don't need the interactive loop. Stage failures are not
//! fatal here either: they end up in [`MenuOutput::errors`] next to whatever
//! the other stages produced. Only loading, configuration and file writing
//! return `Err`.

use crate::config::MenuConfig;
use crate::error::MenuError;
use crate::output::MenuOutput;
use crate::pipeline::export::{self, ExportedSpreadsheet};
use crate::pipeline::input::{self, RawDocument};
use crate::session::{Pipeline, SessionState};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Convert a menu image or PDF (local path or HTTP/HTTPS URL) into a table.
///
/// # Errors
/// Returns `Err(MenuError)` only for fatal errors:
/// - File not found / permission denied / download failure
/// - Not a JPEG, PNG or PDF
/// - No model backend, or an image with no OCR backend
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &MenuConfig,
) -> Result<MenuOutput, MenuError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let document = input::load_document(input_str, config.download_timeout_secs).await?;
    convert_document(&document, config).await
}

/// Convert an in-memory upload.
///
/// `mime` is the declared upload type, if known; it must be one of the
/// accepted menu types.
///
/// # Example
/// ```rust,no_run
/// use edgequake_menu2xlsx::{convert_from_bytes, MenuConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("menu.jpg")?;
/// let config = MenuConfig::default();
/// let output = convert_from_bytes(bytes, Some("image/jpeg"), "menu.jpg", &config).await?;
/// println!("{}", output.structured_text);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: Vec<u8>,
    mime: Option<&str>,
    name: &str,
    config: &MenuConfig,
) -> Result<MenuOutput, MenuError> {
    let document = RawDocument::from_bytes(name, bytes, mime)?;
    convert_document(&document, config).await
}

/// Run the full pipeline on an already loaded document.
pub async fn convert_document(
    document: &RawDocument,
    config: &MenuConfig,
) -> Result<MenuOutput, MenuError> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config)?;
    if document.kind.is_image() && !pipeline.has_ocr() {
        return Err(MenuError::OcrNotConfigured);
    }

    let mut state = SessionState::new();
    pipeline.ingest(&mut state, document).await;
    pipeline.generate_structure(&mut state).await;

    info!(
        "Conversion complete: {} rows, {} stage errors, {}ms",
        state.table.row_count(),
        state.errors.len(),
        start.elapsed().as_millis()
    );
    Ok(state.into_output())
}

/// Convert a menu and write the spreadsheet to `output_path`.
///
/// The file is written atomically (temp file + rename). An export failure is
/// returned as `Err`, since there is nothing to write.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &MenuConfig,
) -> Result<MenuOutput, MenuError> {
    let output = convert(input_str, config).await?;
    let sheet = export::export_table(&output.table, &config.sheet_name)?;
    save_spreadsheet(&sheet, output_path).await?;
    Ok(output)
}

/// Write an exported spreadsheet to disk atomically.
pub async fn save_spreadsheet(
    sheet: &ExportedSpreadsheet,
    output_path: impl AsRef<Path>,
) -> Result<(), MenuError> {
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| MenuError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp_path, &sheet.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} ({} bytes)", path.display(), sheet.bytes.len());
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &MenuConfig,
) -> Result<MenuOutput, MenuError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MenuError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

