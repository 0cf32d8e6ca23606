//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::MenuConfigBuilder::progress`] to receive events as the
//! pipeline extracts pages, polls the OCR service, calls the model and
//! exports. Events are informational only: nothing a callback does can change
//! the pipeline's control flow.
//!
//! Stage errors are delivered through [`PipelineProgress::on_stage_error`];
//! an interactive front end shows them to the user as a visible message.
//!
//! # Example
//!
//! ```rust
//! use edgequake_menu2xlsx::{MenuConfig, PipelineProgress, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgress for Printer {
//!     fn on_stage_error(&self, stage: Stage, error: &str) {
//!         eprintln!("{stage}: {error}");
//!     }
//! }
//!
//! let config = MenuConfig::builder()
//!     .progress(Arc::new(Printer) as Arc<dyn PipelineProgress>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The pipeline stages, in data-flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// OCR or PDF text-layer extraction.
    Extract,
    /// Language-model structuring.
    Structure,
    /// Delimited text → table.
    Parse,
    /// Table → spreadsheet.
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Structure => "structure",
            Stage::Parse => "parse",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgress: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each PDF page's text layer has been read.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages in the document
    /// * `chars`       — characters extracted from this page (0 = no text layer)
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// Called after every OCR status poll.
    fn on_ocr_poll(&self, attempt: u32, status: &str) {
        let _ = (attempt, status);
    }

    /// Called when a stage finishes without error.
    ///
    /// `output_len` is the size of what the stage produced: characters of
    /// text, rows of the table, or bytes of the spreadsheet.
    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let _ = (stage, output_len);
    }

    /// Called when a stage fails. The pipeline continues with a neutral
    /// result.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::MenuConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgress>;
