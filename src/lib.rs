//! # edgequake-menu2xlsx
//!
//! Turn a photographed or scanned restaurant menu into an editable `.xlsx`
//! spreadsheet.
//!
//! Menus come in every layout imaginable, so no fixed parser can read them.
//! Instead this crate extracts the raw text (OCR for photos, the text layer
//! for PDFs), asks a language model to rewrite it as pipe-delimited rows,
//! and parses that output with a parser that accepts whatever shape comes
//! back. The resulting table can be edited before export.
//!
//! ## Pipeline Overview
//!
//! ```text
//! JPEG / PNG / PDF
//!  │
//!  ├─ 1. Input     local file, URL or in-memory upload; kind from magic bytes
//!  ├─ 2. Extract   image → OCR (submit + poll) | PDF → pdfium text layer
//!  ├─ 3. Structure one model call: instructions + two examples + text
//!  ├─ 4. Parse     `|`-split, pad to the widest line, line 0 = header
//!  ├─ 5. Edit      add / insert / remove rows, set cells (caller-driven)
//!  └─ 6. Export    single-sheet restaurant_menu.xlsx, byte-deterministic
//! ```
//!
//! No stage is fatal. A failed stage is recorded in
//! [`SessionState::errors`] and leaves an empty or unchanged result behind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_menu2xlsx::{convert, AzureSettings, MenuConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MenuConfig::builder()
//!         .azure(AzureSettings::from_json_file("config.json")?)
//!         .build()?;
//!     let output = convert("menu.jpg", &config).await?;
//!     for row in output.table.rows() {
//!         println!("{}", row.join(" | "));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Interactive Use
//!
//! ```rust,no_run
//! use edgequake_menu2xlsx::{load_document, MenuConfig, Pipeline, SessionState};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MenuConfig::default();
//! let pipeline = Pipeline::new(&config)?;
//! let mut state = SessionState::new();
//!
//! let doc = load_document("menu.pdf", config.download_timeout_secs).await?;
//! pipeline.ingest(&mut state, &doc).await;
//! pipeline.generate_structure(&mut state).await;
//!
//! state.table.set_cell(0, 2, "$5.50")?;
//! if let Some(sheet) = pipeline.export(&mut state) {
//!     std::fs::write(sheet.file_name, &sheet.bytes)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-menu2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AzureSettings, MenuConfig, MenuConfigBuilder, DEFAULT_SHEET_NAME};
pub use convert::{
    convert, convert_document, convert_from_bytes, convert_sync, convert_to_file,
    save_spreadsheet,
};
pub use error::{BackendError, MenuError, StageError};
pub use output::{MenuOutput, PipelineStats};
pub use pipeline::export::{export_table, ExportedSpreadsheet, EXPORT_FILE_NAME, XLSX_MIME};
pub use pipeline::input::{load_document, DocumentKind, ImageKind, RawDocument};
pub use pipeline::llm::{
    AzureChatClient, Completion, CompletionBackend, CompletionParams, EdgequakeBackend,
    PromptMessage, Role,
};
pub use pipeline::ocr::{AzureReadClient, OcrBackend, OcrOperation, ReadResult, ReadStatus};
pub use pipeline::parse::parse_structured_text;
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback, Stage};
pub use session::{Pipeline, SessionState};
pub use table::{Table, TableError};
