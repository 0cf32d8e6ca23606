//! Interactive session driver.
//!
//! A UI (or the CLI) owns one [`SessionState`] and calls [`Pipeline`]
//! methods on it as the user uploads, generates and exports. Stage failures
//! never escape these methods: each one is reported through
//! [`PipelineProgress::on_stage_error`], logged, appended to
//! [`SessionState::errors`], and the state keeps its previous (neutral)
//! value. Any step can then be retried on the same state.
//!
//! The table is edited directly through [`SessionState::table`].

use crate::config::MenuConfig;
use crate::error::{MenuError, StageError};
use crate::output::{MenuOutput, PipelineStats};
use crate::pipeline::export::{self, ExportedSpreadsheet};
use crate::pipeline::extract;
use crate::pipeline::input::RawDocument;
use crate::pipeline::llm::{self, CompletionBackend};
use crate::pipeline::ocr::{AzureReadClient, OcrBackend};
use crate::pipeline::parse;
use crate::progress::{NoopProgress, PipelineProgress, ProgressCallback, Stage};
use crate::table::Table;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one user session holds between interactions.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub extracted_text: String,
    pub structured_text: String,
    pub table: Table,
    pub errors: Vec<StageError>,
    pub stats: PipelineStats,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors recorded since the last call, leaving the log empty.
    pub fn take_errors(&mut self) -> Vec<StageError> {
        std::mem::take(&mut self.errors)
    }

    pub fn into_output(self) -> MenuOutput {
        MenuOutput {
            extracted_text: self.extracted_text,
            structured_text: self.structured_text,
            table: self.table,
            errors: self.errors,
            stats: self.stats,
        }
    }
}

/// Resolved backends plus configuration.
pub struct Pipeline {
    config: MenuConfig,
    model: Option<Arc<dyn CompletionBackend>>,
    ocr: Option<Arc<dyn OcrBackend>>,
    progress: ProgressCallback,
}

impl Pipeline {
    /// Resolve the model backend (required) and the OCR backend (optional;
    /// PDFs do not need one).
    pub fn new(config: &MenuConfig) -> Result<Self, MenuError> {
        let model = llm::resolve_backend(config)?;
        let mut pipeline = Self::offline(config)?;
        pipeline.model = Some(model);
        Ok(pipeline)
    }

    /// A pipeline without a model backend, for re-parsing and exporting
    /// text that is already structured. [`Pipeline::generate_structure`]
    /// records a [`StageError::Model`] on such a pipeline.
    pub fn offline(config: &MenuConfig) -> Result<Self, MenuError> {
        let ocr = resolve_ocr_backend(config)?;
        let progress = config
            .progress
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgress));
        Ok(Self {
            config: config.clone(),
            model: None,
            ocr,
            progress,
        })
    }

    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Extract text from an uploaded document. `extracted_text` is only
    /// replaced when the new text is non-empty.
    pub async fn ingest(&self, state: &mut SessionState, document: &RawDocument) {
        self.progress.on_stage_start(Stage::Extract);
        info!("Ingesting '{}' ({})", document.name, document.kind.mime());

        match extract::extract_text(document, self.ocr.as_deref(), &self.config).await {
            Ok(extracted) => {
                state.stats.pages = extracted.pages;
                state.stats.ocr_polls = extracted.ocr_polls;
                state.stats.extract_duration_ms = extracted.duration_ms;
                state.stats.extracted_chars = extracted.text.len();
                if extracted.text.is_empty() {
                    debug!("No text extracted; keeping previous text");
                } else {
                    state.extracted_text = extracted.text;
                }
                self.progress
                    .on_stage_complete(Stage::Extract, state.stats.extracted_chars);
            }
            Err(e) => self.record(state, e),
        }
    }

    /// Ask the model to structure `extracted_text`, then parse the result
    /// into the table. A no-op when there is no extracted text.
    pub async fn generate_structure(&self, state: &mut SessionState) {
        if state.extracted_text.trim().is_empty() {
            debug!("Nothing extracted yet; skipping structuring");
            return;
        }

        self.progress.on_stage_start(Stage::Structure);
        let Some(model) = self.model.as_deref() else {
            self.record(
                state,
                StageError::Model {
                    retries: 0,
                    detail: "no model backend configured".to_string(),
                },
            );
            return;
        };

        match llm::structure_text(model, &state.extracted_text, &self.config).await {
            Ok(out) => {
                state.stats.model_duration_ms = out.duration_ms;
                state.stats.prompt_tokens += out.prompt_tokens;
                state.stats.completion_tokens += out.completion_tokens;
                state.stats.model_retries += out.retries;
                self.progress
                    .on_stage_complete(Stage::Structure, out.text.len());
                if out.text.is_empty() {
                    warn!("Model returned an empty response; table unchanged");
                } else {
                    self.load_structured_text(state, out.text);
                }
            }
            Err(e) => self.record(state, e),
        }
    }

    /// Replace `structured_text` and rebuild the table from it.
    pub fn load_structured_text(&self, state: &mut SessionState, text: impl Into<String>) {
        self.progress.on_stage_start(Stage::Parse);
        state.structured_text = text.into();
        state.table = parse::parse_structured_text(&state.structured_text);
        state.stats.table_rows = state.table.row_count();
        state.stats.table_columns = state.table.column_count();
        info!(
            "Parsed table: {} columns, {} rows",
            state.stats.table_columns, state.stats.table_rows
        );
        self.progress
            .on_stage_complete(Stage::Parse, state.table.row_count());
    }

    /// Serialise the current table. `None` when the table is empty or the
    /// export failed.
    pub fn export(&self, state: &mut SessionState) -> Option<ExportedSpreadsheet> {
        if state.table.is_empty() {
            debug!("Empty table; nothing to export");
            return None;
        }
        self.progress.on_stage_start(Stage::Export);
        match export::export_table(&state.table, &self.config.sheet_name) {
            Ok(sheet) => {
                self.progress
                    .on_stage_complete(Stage::Export, sheet.bytes.len());
                Some(sheet)
            }
            Err(e) => {
                self.record(state, e);
                None
            }
        }
    }

    fn record(&self, state: &mut SessionState, error: StageError) {
        let stage = error.stage();
        warn!("{} stage failed: {}", stage, error);
        self.progress.on_stage_error(stage, &error.to_string());
        state.errors.push(error);
    }
}

/// Injected backend first, then Azure Read settings; otherwise none.
fn resolve_ocr_backend(config: &MenuConfig) -> Result<Option<Arc<dyn OcrBackend>>, MenuError> {
    if let Some(ref backend) = config.ocr_backend {
        return Ok(Some(Arc::clone(backend)));
    }
    if config.azure.has_ocr() {
        return Ok(Some(Arc::new(AzureReadClient::new(&config.azure)?)));
    }
    Ok(None)
}
