//! The editable menu table.
//!
//! A [`Table`] is rectangular: the header and every row always have the same
//! number of cells. The parser builds it, the user edits it in place, and the
//! exporter reads it. Column names are not required to be unique and may be
//! empty.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected table edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("Row {index} is out of range (table has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Column {index} is out of range (table has {width} columns)")]
    ColumnOutOfRange { index: usize, width: usize },
}

/// Header plus data rows, all of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// An empty table: zero columns, zero rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, right-padding the header and every row with empty
    /// cells up to the widest of them.
    pub fn from_parts(mut header: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        header.resize(width, String::new());
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when there is nothing to show: no columns and no rows.
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Append a blank row and return its index.
    pub fn add_row(&mut self) -> usize {
        self.rows.push(vec![String::new(); self.column_count()]);
        self.rows.len() - 1
    }

    /// Insert `cells` at `index` (`index == row_count()` appends). The row
    /// is padded or truncated to the table width.
    pub fn insert_row(&mut self, index: usize, mut cells: Vec<String>) -> Result<(), TableError> {
        if index > self.rows.len() {
            return Err(TableError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        cells.resize(self.column_count(), String::new());
        self.rows.insert(index, cells);
        Ok(())
    }

    /// Remove and return the row at `index`.
    pub fn remove_row(&mut self, index: usize) -> Result<Vec<String>, TableError> {
        if index >= self.rows.len() {
            return Err(TableError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(self.rows.remove(index))
    }

    /// Overwrite one cell.
    pub fn set_cell(
        &mut self,
        row: usize,
        col: usize,
        value: impl Into<String>,
    ) -> Result<(), TableError> {
        let width = self.column_count();
        let len = self.rows.len();
        let r = self
            .rows
            .get_mut(row)
            .ok_or(TableError::RowOutOfRange { index: row, len })?;
        let cell = r
            .get_mut(col)
            .ok_or(TableError::ColumnOutOfRange { index: col, width })?;
        *cell = value.into();
        Ok(())
    }

    /// Rename a column.
    pub fn rename_column(&mut self, col: usize, name: impl Into<String>) -> Result<(), TableError> {
        let width = self.column_count();
        let slot = self
            .header
            .get_mut(col)
            .ok_or(TableError::ColumnOutOfRange { index: col, width })?;
        *slot = name.into();
        Ok(())
    }

    /// Drop every data row, keeping the header.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
    }
}
