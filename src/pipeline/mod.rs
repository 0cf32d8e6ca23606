//! Pipeline stages for menu-to-spreadsheet conversion.
//!
//! Each submodule implements exactly one transformation step, so every stage
//! can be tested on its own and backends can be swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ parse ──▶ export
//! (upload)  (OCR/pdf)   (model)  (table)   (xlsx)
//! ```
//!
//! 1. [`input`]   — load a path, URL or in-memory upload and detect its kind
//! 2. [`extract`] — route images to [`ocr`] and PDFs to [`pdf_text`]
//! 3. [`llm`]     — one structuring request; output cleaned by [`postprocess`]
//! 4. [`parse`]   — pipe-delimited text to a rectangular table; never fails
//! 5. [`export`]  — table to a single-sheet xlsx in memory

pub mod export;
pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod pdf_text;
pub mod postprocess;
