// ==============================================================================
// workbook.rs - Worksheet Table Helpers
// ==============================================================================
// Description: Header + rows access to .xlsx worksheets
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use umya_spreadsheet::{Spreadsheet, Worksheet, XlsxError};

/// Errors raised while reading or writing a workbook
#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Sheet '{name}' already exists")]
    DuplicateSheet { name: String },

    #[error("Cannot add sheet '{name}': {reason}")]
    SheetRejected { name: String, reason: &'static str },
}

/// A worksheet read as text: first row is the header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetTable {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// No data rows below the header
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Read every worksheet of a workbook, in workbook order
pub fn read_tables(path: &Path) -> Result<Vec<SheetTable>, WorkbookError> {
    let book = read_book(path)?;
    Ok(book.get_sheet_collection().iter().map(sheet_table).collect())
}

pub fn read_book(path: &Path) -> Result<Spreadsheet, WorkbookError> {
    Ok(umya_spreadsheet::reader::xlsx::read(path)?)
}

/// Whether `book` already has a sheet called `name`.
/// Spreadsheet applications compare sheet names case-insensitively.
pub fn has_sheet(book: &Spreadsheet, name: &str) -> bool {
    let name = name.to_lowercase();
    book.get_sheet_collection()
        .iter()
        .any(|sheet| sheet.get_name().to_lowercase() == name)
}

pub fn sheet_table(sheet: &Worksheet) -> SheetTable {
    let (max_col, max_row) = sheet.get_highest_column_and_row();

    let read_row = |row: u32| -> Vec<String> {
        (1..=max_col)
            .map(|col| sheet.get_value((col, row)).trim().to_string())
            .collect()
    };

    let header = if max_row >= 1 { read_row(1) } else { Vec::new() };

    let rows = (2..=max_row)
        .map(read_row)
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    SheetTable {
        name: sheet.get_name().to_string(),
        header,
        rows,
    }
}

/// Append a sheet holding `header` and `rows`.
///
/// Cells of columns listed in `numeric_columns` are stored as numbers when
/// they parse as one; everything else is stored as a string cell.
pub fn append_table(
    book: &mut Spreadsheet,
    name: &str,
    header: &[String],
    rows: &[Vec<String>],
    numeric_columns: &[usize],
) -> Result<(), WorkbookError> {
    if has_sheet(book, name) {
        return Err(WorkbookError::DuplicateSheet {
            name: name.to_string(),
        });
    }

    let sheet = book.new_sheet(name).map_err(|reason| WorkbookError::SheetRejected {
        name: name.to_string(),
        reason,
    })?;

    for (col, title) in header.iter().enumerate() {
        sheet
            .get_cell_mut((col as u32 + 1, 1))
            .set_value_string(title.as_str());
    }

    for (row_idx, cells) in rows.iter().enumerate() {
        let row = row_idx as u32 + 2;
        for (col_idx, value) in cells.iter().enumerate() {
            if value.is_empty() {
                continue;
            }

            let cell = sheet.get_cell_mut((col_idx as u32 + 1, row));
            match value.parse::<f64>() {
                Ok(number) if numeric_columns.contains(&col_idx) => {
                    cell.set_value_number(number);
                }
                _ => {
                    cell.set_value_string(value.as_str());
                }
            }
        }
    }

    Ok(())
}

/// New workbook without the library's default worksheet
pub fn new_book() -> Spreadsheet {
    umya_spreadsheet::new_file_empty_worksheet()
}

/// Add an empty sheet; the caller checks for collisions first
pub fn add_empty_sheet(book: &mut Spreadsheet, name: &str) -> Result<(), WorkbookError> {
    book.new_sheet(name)
        .map(|_| ())
        .map_err(|reason| WorkbookError::SheetRejected {
            name: name.to_string(),
            reason,
        })
}

/// Write `book` to `path` through a sibling temp file renamed into place,
/// so a failed write leaves any existing workbook intact
pub fn write_book(book: &Spreadsheet, path: &Path) -> Result<(), WorkbookError> {
    let tmp = temp_path(path);

    if let Err(e) = umya_spreadsheet::writer::xlsx::write(book, &tmp) {
        if tmp.exists() {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                warn!("Failed to remove partial workbook {:?}: {}", tmp, cleanup);
            }
        }
        return Err(e.into());
    }

    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// `<dir>/.<name>.tmp`: never matches the `.xlsx` workbook scan
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_write_then_read_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut book = new_book();
        book.new_sheet("Sheet").unwrap();
        append_table(
            &mut book,
            "T1_S01",
            &strings(&["LOCUS", "CHROMOSOME_COPY", "QC_PASSED"]),
            &[strings(&["A", "1", "True"]), strings(&["DQB1", "2", "False"])],
            &[1],
        )
        .unwrap();
        write_book(&book, &path).unwrap();

        let tables = read_tables(&path).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "Sheet");
        assert!(tables[0].is_empty());

        let table = &tables[1];
        assert_eq!(table.name, "T1_S01");
        assert_eq!(table.header, strings(&["LOCUS", "CHROMOSOME_COPY", "QC_PASSED"]));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, 1), "1");
        assert_eq!(table.cell(1, 2), "False");
        assert_eq!(table.cell(5, 5), "");
    }

    #[test]
    fn test_duplicate_sheet_name_is_rejected() {
        let mut book = new_book();
        append_table(&mut book, "T1_S01", &strings(&["A"]), &[], &[]).unwrap();
        assert!(matches!(
            append_table(&mut book, "T1_S01", &strings(&["A"]), &[], &[]),
            Err(WorkbookError::DuplicateSheet { .. })
        ));
        assert!(matches!(
            append_table(&mut book, "t1_s01", &strings(&["A"]), &[], &[]),
            Err(WorkbookError::DuplicateSheet { .. })
        ));
        assert_eq!(book.get_sheet_collection().len(), 1);
    }

    #[test]
    fn test_has_sheet_ignores_case() {
        let mut book = new_book();
        add_empty_sheet(&mut book, "Sheet").unwrap();
        assert!(has_sheet(&book, "Sheet"));
        assert!(has_sheet(&book, "SHEET"));
        assert!(!has_sheet(&book, "Sheet1"));
    }

    #[test]
    fn test_write_book_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut book = new_book();
        append_table(&mut book, "T1_S01", &strings(&["LOCUS"]), &[strings(&["A"])], &[]).unwrap();
        write_book(&book, &path).unwrap();

        append_table(&mut book, "T1_S02", &strings(&["LOCUS"]), &[strings(&["B"])], &[]).unwrap();
        write_book(&book, &path).unwrap();

        let tables = read_tables(&path).unwrap();
        assert_eq!(tables.len(), 2);

        // Only the workbook itself remains, no temp file
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_read_missing_workbook_is_typed_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_tables(&dir.path().join("missing.xlsx")).is_err());
    }
}
