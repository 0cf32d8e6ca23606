//! Error types for the edgequake-menu2xlsx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MenuError`] — **Fatal**: nothing can be attempted at all (input file
//!   missing, unsupported upload type, backend not configured, output file
//!   not writable). Returned as `Err(MenuError)` from loader, config and
//!   file-writing entry points.
//!
//! * [`StageError`] — **Non-fatal**: one pipeline stage failed (OCR fault,
//!   model fault, spreadsheet serialisation fault). The session driver
//!   records it, reports it to the user and leaves a neutral result behind
//!   (empty text, unchanged table) so the user can retry that stage.
//!
//! There is no parse error: the table parser is total, and an empty model
//! response simply parses to an empty table.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-menu2xlsx library.
#[derive(Debug, Error)]
pub enum MenuError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Menu file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload is neither a JPEG/PNG image nor a PDF.
    #[error("Unsupported document '{name}' ({detail})\nAccepted types: image/jpeg, image/png, image/jpg, application/pdf")]
    UnsupportedDocument { name: String, detail: String },

    // ── Backend configuration errors ──────────────────────────────────────
    /// The configured language-model provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// An image was uploaded but no OCR backend is available.
    #[error("OCR backend is not configured.\nSet azure_cv_endpoint and azure_cv_api_key in the config file.")]
    OcrNotConfigured,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The JSON config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON config file is not valid.
    #[error("Invalid config file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output spreadsheet file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage failed while the caller asked for a hard result
    /// (e.g. [`crate::convert::convert_to_file`] could not export).
    #[error(transparent)]
    Stage(#[from] StageError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single pipeline stage.
///
/// Stored in [`crate::session::SessionState::errors`] and
/// [`crate::output::MenuOutput::errors`]. The session continues; the user
/// may retry the stage.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// OCR or PDF text-layer backend fault.
    #[error("Text extraction failed: {detail}")]
    Extraction { detail: String },

    /// The OCR read operation never reached a terminal state.
    #[error("OCR operation did not finish within {secs}s")]
    OcrTimeout { secs: u64 },

    /// Language-model backend fault.
    #[error("Model call failed after {retries} retries: {detail}")]
    Model { retries: u32, detail: String },

    /// The language-model call timed out.
    #[error("Model call timed out after {secs}s")]
    ModelTimeout { secs: u64 },

    /// Spreadsheet serialisation fault.
    #[error("Spreadsheet export failed: {detail}")]
    Export { detail: String },
}

impl StageError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> crate::progress::Stage {
        use crate::progress::Stage;
        match self {
            StageError::Extraction { .. } | StageError::OcrTimeout { .. } => Stage::Extract,
            StageError::Model { .. } | StageError::ModelTimeout { .. } => Stage::Structure,
            StageError::Export { .. } => Stage::Export,
        }
    }
}

/// A fault reported by an external backend (OCR service, model API).
///
/// Backends only describe what went wrong; the pipeline decides which
/// [`StageError`] it becomes.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
