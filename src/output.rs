//! Conversion results.

use crate::error::StageError;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Everything one menu produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuOutput {
    /// OCR or PDF text; empty when nothing was extracted.
    pub extracted_text: String,
    /// Model output after cleanup; empty when the model was not called or
    /// failed.
    pub structured_text: String,
    /// Parsed table; empty when `structured_text` is empty.
    pub table: Table,
    /// Non-fatal stage errors, in the order they happened.
    pub errors: Vec<StageError>,
    pub stats: PipelineStats,
}

impl MenuOutput {
    /// True when every stage that ran finished without error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Counters and timings for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages read (PDF pages, or OCR result pages).
    pub pages: usize,
    pub ocr_polls: u32,
    pub extracted_chars: usize,
    pub extract_duration_ms: u64,
    pub model_duration_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model_retries: u32,
    pub table_rows: usize,
    pub table_columns: usize,
}
