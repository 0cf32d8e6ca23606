//! Tolerant parser: pipe-delimited model output → rectangular [`Table`].
//!
//! Model output is not guaranteed to be well formed. Rows may be missing
//! trailing fields, the header may be shorter than the data rows, and empty
//! fields may appear anywhere. The parser never fails: it pads every line to
//! the widest one and treats line 0 as the header.
//!
//! The split on `|` is naive. There is no escaping convention, so a literal
//! `|` inside a value ends up as two fields.

use crate::table::Table;

/// Field delimiter used by the structuring prompt.
pub const DELIMITER: char = '|';

/// Parse delimited text into a table.
///
/// * empty (or whitespace-only) input → empty table
/// * one line → header only, zero rows
/// * otherwise `line_count - 1` rows, all `max_fields` wide; a short header
///   gains empty-named trailing columns
pub fn parse_structured_text(text: &str) -> Table {
    let text = text.trim();
    if text.is_empty() {
        return Table::new();
    }

    let mut lines = text
        .lines()
        .map(|line| line.split(DELIMITER).map(str::to_string).collect::<Vec<_>>());

    let header = lines.next().unwrap_or_default();
    let rows: Vec<Vec<String>> = lines.collect();

    Table::from_parts(header, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn empty_input_is_empty_table() {
        let t = parse_structured_text("");
        assert_eq!(t.column_count(), 0);
        assert_eq!(t.row_count(), 0);
        assert!(parse_structured_text(" \n\t ").is_empty());
    }

    #[test]
    fn single_line_is_header_only() {
        let t = parse_structured_text("Category|Item|Price");
        assert_eq!(t.header(), s(&["Category", "Item", "Price"]).as_slice());
        assert_eq!(t.row_count(), 0);
    }

    #[test]
    fn missing_trailing_field_is_padded() {
        let t = parse_structured_text("Category|Item|Price\nMAIN|Burger|$5\nDRINKS|Cola|");
        assert_eq!(t.header(), s(&["Category", "Item", "Price"]).as_slice());
        assert_eq!(t.rows()[0], s(&["MAIN", "Burger", "$5"]));
        assert_eq!(t.rows()[1], s(&["DRINKS", "Cola", ""]));
    }

    #[test]
    fn short_header_gains_empty_columns() {
        let t = parse_structured_text("A|B\nX|Y|Z");
        assert_eq!(t.header(), s(&["A", "B", ""]).as_slice());
        assert_eq!(t.rows(), &[s(&["X", "Y", "Z"])]);
    }

    #[test]
    fn truncated_row_is_padded() {
        let t = parse_structured_text("Category|Item|Description|Price\nDessert|Cake");
        assert_eq!(t.rows()[0], s(&["Dessert", "Cake", "", ""]));
    }

    #[test]
    fn consecutive_delimiters_are_empty_fields() {
        let t = parse_structured_text("Category|Item|Description|Price\nAppetizer|Garlic Bread||6.99");
        assert_eq!(t.rows()[0], s(&["Appetizer", "Garlic Bread", "", "6.99"]));
    }

    #[test]
    fn duplicate_column_names_are_kept() {
        let t = parse_structured_text("Item|Price|Price\nTea|2|3");
        assert_eq!(t.header(), s(&["Item", "Price", "Price"]).as_slice());
    }

    #[test]
    fn pipe_inside_value_splits_it() {
        let t = parse_structured_text("Item|Price\nIce | Hot Tea|6.99");
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.rows()[0], s(&["Ice ", " Hot Tea", "6.99"]));
    }

    #[test]
    fn line_without_delimiter_is_one_field() {
        let t = parse_structured_text("Category|Item\nSorry, no menu found");
        assert_eq!(t.rows()[0], s(&["Sorry, no menu found", ""]));
    }

    #[test]
    fn interior_blank_line_is_a_row() {
        let t = parse_structured_text("A|B\n\nC|D");
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.rows()[0], s(&["", ""]));
    }

    #[test]
    fn crlf_lines() {
        let t = parse_structured_text("A|B\r\n1|2\r\n");
        assert_eq!(t.rows(), &[s(&["1", "2"])]);
    }

    #[test]
    fn every_row_has_max_fields_and_rows_equal_lines_minus_one() {
        let inputs = [
            "a",
            "a|b|c\n1\n1|2\n1|2|3|4",
            "||\n|\n",
            "x|y\nz",
            "h\n1|2|3|4|5|6\n\n7",
        ];
        for input in inputs {
            let lines: Vec<&str> = input.trim().lines().collect();
            let max_fields = lines.iter().map(|l| l.split('|').count()).max().unwrap();
            let t = parse_structured_text(input);
            assert_eq!(t.row_count(), lines.len() - 1, "input {input:?}");
            assert_eq!(t.header().len(), max_fields, "input {input:?}");
            assert!(t.rows().iter().all(|r| r.len() == max_fields), "input {input:?}");
        }
    }
}
