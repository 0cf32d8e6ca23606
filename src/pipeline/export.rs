//! Spreadsheet export: [`Table`] → single-sheet `.xlsx`.
//!
//! The workbook is assembled directly as SpreadsheetML parts inside a zip
//! archive. Every cell is an inline string, so prices stay exactly as the
//! model wrote them (`$5`, `6.99`) and no shared-string table is needed.
//!
//! Output is deterministic: parts are always written in the same order and
//! every zip entry carries the fixed DOS epoch timestamp, so exporting the
//! same table twice yields byte-identical files.

use crate::error::StageError;
use crate::table::Table;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// File name offered for download.
pub const EXPORT_FILE_NAME: &str = "restaurant_menu.xlsx";

/// MIME type of an `.xlsx` workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Excel's per-cell character limit.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Excel's worksheet limits (header row included).
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLUMNS: usize = 16_384;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// An exported workbook ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSpreadsheet {
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub mime: &'static str,
}

/// Serialise `table` into a single-sheet workbook named `sheet_name`.
///
/// The header is row 1; data rows follow in order. Empty cells are written
/// as empty inline strings so blank columns and rows keep their place.
pub fn export_table(table: &Table, sheet_name: &str) -> Result<ExportedSpreadsheet, StageError> {
    check_limits(table)?;

    let workbook = workbook_xml(sheet_name)?;
    let sheet = sheet_xml(table)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let parts: [(&str, &[u8]); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", workbook.as_slice()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ("xl/worksheets/sheet1.xml", sheet.as_slice()),
    ];
    for (name, data) in parts {
        zip.start_file(name, options).map_err(export_err)?;
        zip.write_all(data).map_err(export_err)?;
    }
    let bytes = zip.finish().map_err(export_err)?.into_inner();

    debug!(
        "Exported {} rows × {} columns → {} bytes",
        table.row_count(),
        table.column_count(),
        bytes.len()
    );

    Ok(ExportedSpreadsheet {
        bytes,
        file_name: EXPORT_FILE_NAME,
        mime: XLSX_MIME,
    })
}

fn export_err(e: impl Display) -> StageError {
    StageError::Export {
        detail: e.to_string(),
    }
}

fn check_limits(table: &Table) -> Result<(), StageError> {
    if table.row_count() + 1 > MAX_ROWS {
        return Err(StageError::Export {
            detail: format!("{} rows exceed the sheet limit of {}", table.row_count(), MAX_ROWS - 1),
        });
    }
    if table.column_count() > MAX_COLUMNS {
        return Err(StageError::Export {
            detail: format!(
                "{} columns exceed the sheet limit of {}",
                table.column_count(),
                MAX_COLUMNS
            ),
        });
    }
    let all_cells = std::iter::once(table.header()).chain(table.rows().iter().map(Vec::as_slice));
    for (r, row) in all_cells.enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.chars().count() > MAX_CELL_CHARS {
                return Err(StageError::Export {
                    detail: format!(
                        "cell {} holds more than {} characters",
                        cell_reference(r, c),
                        MAX_CELL_CHARS
                    ),
                });
            }
        }
    }
    Ok(())
}

fn workbook_xml(sheet_name: &str) -> Result<Vec<u8>, StageError> {
    let mut w = Writer::new(Vec::new());
    write_decl(&mut w)?;

    let mut root = BytesStart::new("workbook");
    root.push_attribute(("xmlns", NS_MAIN));
    root.push_attribute(("xmlns:r", NS_REL));
    w.write_event(Event::Start(root)).map_err(export_err)?;
    w.write_event(Event::Start(BytesStart::new("sheets")))
        .map_err(export_err)?;

    let mut sheet = BytesStart::new("sheet");
    sheet.push_attribute(("name", sheet_name));
    sheet.push_attribute(("sheetId", "1"));
    sheet.push_attribute(("r:id", "rId1"));
    w.write_event(Event::Empty(sheet)).map_err(export_err)?;

    w.write_event(Event::End(BytesEnd::new("sheets")))
        .map_err(export_err)?;
    w.write_event(Event::End(BytesEnd::new("workbook")))
        .map_err(export_err)?;
    Ok(w.into_inner())
}

fn sheet_xml(table: &Table) -> Result<Vec<u8>, StageError> {
    let mut w = Writer::new(Vec::new());
    write_decl(&mut w)?;

    let mut root = BytesStart::new("worksheet");
    root.push_attribute(("xmlns", NS_MAIN));
    w.write_event(Event::Start(root)).map_err(export_err)?;

    if table.column_count() > 0 {
        let last = cell_reference(table.row_count(), table.column_count() - 1);
        let range = format!("A1:{last}");
        let mut dimension = BytesStart::new("dimension");
        dimension.push_attribute(("ref", range.as_str()));
        w.write_event(Event::Empty(dimension)).map_err(export_err)?;
    }

    if table.column_count() == 0 && table.row_count() == 0 {
        w.write_event(Event::Empty(BytesStart::new("sheetData")))
            .map_err(export_err)?;
    } else {
        w.write_event(Event::Start(BytesStart::new("sheetData")))
            .map_err(export_err)?;
        write_row(&mut w, 0, table.header())?;
        for (i, row) in table.rows().iter().enumerate() {
            write_row(&mut w, i + 1, row)?;
        }
        w.write_event(Event::End(BytesEnd::new("sheetData")))
            .map_err(export_err)?;
    }

    w.write_event(Event::End(BytesEnd::new("worksheet")))
        .map_err(export_err)?;
    Ok(w.into_inner())
}

fn write_decl(w: &mut Writer<Vec<u8>>) -> Result<(), StageError> {
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(export_err)
}

fn write_row(w: &mut Writer<Vec<u8>>, row_idx: usize, cells: &[String]) -> Result<(), StageError> {
    let row_number = (row_idx + 1).to_string();
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", row_number.as_str()));
    w.write_event(Event::Start(row)).map_err(export_err)?;

    for (col_idx, value) in cells.iter().enumerate() {
        let value = xml_safe(value);
        let reference = cell_reference(row_idx, col_idx);
        let mut cell = BytesStart::new("c");
        cell.push_attribute(("r", reference.as_str()));
        cell.push_attribute(("t", "inlineStr"));
        w.write_event(Event::Start(cell)).map_err(export_err)?;
        w.write_event(Event::Start(BytesStart::new("is")))
            .map_err(export_err)?;
        let mut t = BytesStart::new("t");
        t.push_attribute(("xml:space", "preserve"));
        w.write_event(Event::Start(t)).map_err(export_err)?;
        w.write_event(Event::Text(BytesText::new(&value)))
            .map_err(export_err)?;
        w.write_event(Event::End(BytesEnd::new("t")))
            .map_err(export_err)?;
        w.write_event(Event::End(BytesEnd::new("is")))
            .map_err(export_err)?;
        w.write_event(Event::End(BytesEnd::new("c")))
            .map_err(export_err)?;
    }

    w.write_event(Event::End(BytesEnd::new("row")))
        .map_err(export_err)
}

/// XML 1.0 forbids most C0 control characters; OCR output occasionally
/// contains them.
fn xml_safe(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Zero-based (row, column) → A1 reference.
pub fn cell_reference(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// Zero-based column index → `A`, `B`, …, `Z`, `AA`, ….
pub fn column_letters(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::parse_structured_text;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
        assert_eq!(cell_reference(0, 2), "C1");
    }

    #[test]
    fn sheet_xml_contains_inline_strings() {
        let t = parse_structured_text("Category|Item|Price\nMAIN|Fish & Chips|$5");
        let xml = String::from_utf8(sheet_xml(&t).unwrap()).unwrap();
        assert!(xml.contains(r#"<c r="A1" t="inlineStr">"#));
        assert!(xml.contains("Fish &amp; Chips"));
        assert!(xml.contains(r#"<row r="2">"#));
    }

    #[test]
    fn empty_cells_keep_their_place() {
        let t = parse_structured_text("A|B|\nx||z");
        let xml = String::from_utf8(sheet_xml(&t).unwrap()).unwrap();
        assert!(xml.contains(r#"<dimension ref="A1:C2"/>"#));
        assert!(xml.contains(r#"<c r="C1" t="inlineStr"><is><t xml:space="preserve"></t></is></c>"#));
        assert!(xml.contains(r#"r="B2""#));
    }

    #[test]
    fn blank_row_is_written_with_cells() {
        let mut t = parse_structured_text("Item|Price\nTea|2");
        t.add_row();
        let xml = String::from_utf8(sheet_xml(&t).unwrap()).unwrap();
        assert!(xml.contains(r#"<dimension ref="A1:B3"/>"#));
        assert!(xml.contains(r#"r="A3""#));
        assert!(xml.contains(r#"r="B3""#));
    }

    #[test]
    fn workbook_names_the_sheet() {
        let xml = String::from_utf8(workbook_xml("Restaurant_menu").unwrap()).unwrap();
        assert!(xml.contains(r#"name="Restaurant_menu""#));
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(xml_safe("Tea\u{0007} 2"), "Tea 2");
        assert_eq!(xml_safe("a\tb"), "a\tb");
    }

    #[test]
    fn oversized_cell_is_an_export_error() {
        let t = Table::from_parts(vec!["A".into()], vec![vec!["x".repeat(MAX_CELL_CHARS + 1)]]);
        let err = export_table(&t, "menu").unwrap_err();
        assert!(matches!(err, StageError::Export { .. }));
        assert!(err.to_string().contains("A2"));
    }

    #[test]
    fn export_is_deterministic() {
        let t = parse_structured_text("Category|Item|Price\nMAIN|Burger|$5\nDRINKS|Cola|");
        let a = export_table(&t, "Restaurant_menu").unwrap();
        let b = export_table(&t, "Restaurant_menu").unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.file_name, "restaurant_menu.xlsx");
        assert!(a.bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_table_still_exports() {
        let out = export_table(&Table::new(), "menu").unwrap();
        assert!(!out.bytes.is_empty());
    }
}
