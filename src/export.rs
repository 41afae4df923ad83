// ==============================================================================
// export.rs - Per-Patient Workbook Export
// ==============================================================================
// Description: Appends a patient report as a new sheet of the shared
//              <trial>_hla_typing_report.xlsx workbook
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Concurrency: the workbook is read, modified and rewritten without a lock.
// Two exports into the same trial workbook at once race and one sheet can be
// lost. Single-user operation is assumed.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{report_columns, PatientReportRow, SampleId, DEFAULT_SHEET_NAME};
use crate::validator::{validate_sheet_name, SheetNameError};
use crate::workbook::{self, WorkbookError};

/// Errors that can occur while exporting a report sheet
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(#[from] SheetNameError),

    #[error("Sheet '{sheet}' already exists in {path:?}")]
    DuplicateSheet { sheet: String, path: PathBuf },

    #[error("Workbook error in {path:?}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },

    #[error("Report is empty, nothing to export")]
    EmptyReport,
}

/// Alert colors understood by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertColor {
    Success,
    Warning,
}

impl AlertColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertColor::Success => "success",
            AlertColor::Warning => "warning",
        }
    }
}

/// Human-readable outcome of a download request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAlert {
    pub message: String,
    pub color: AlertColor,
}

impl StatusAlert {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            color: AlertColor::Success,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            color: AlertColor::Warning,
        }
    }

    /// Map an export result to the alert shown to the user
    pub fn from_export(result: &Result<PathBuf, ExportError>, sample_id: &str) -> Self {
        match result {
            Ok(path) => Self::success(format!(
                "Success! The sheet '{}' was added to the file: {}",
                sample_id,
                path.display()
            )),
            Err(e) => Self::warning(format!("An error occurred: {}", e)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.color == AlertColor::Success
    }
}

/// Writes patient reports into per-trial workbooks
#[derive(Debug, Clone)]
pub struct ReportExporter {
    output_dir: PathBuf,
}

impl ReportExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn workbook_path(&self, sample: &SampleId) -> PathBuf {
        self.output_dir.join(sample.workbook_name())
    }

    /// Append `report` as sheet `sample.sample_id`
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path of the workbook that received the sheet
    /// * `Err(ExportError)` - The workbook on disk is left as it was
    ///
    /// A missing workbook is created with an empty default sheet first.
    /// An existing sheet whose name matches ignoring case is never
    /// overwritten. The workbook is rewritten through a temp file renamed
    /// into place.
    pub fn export(&self, report: &[PatientReportRow], sample: &SampleId) -> Result<PathBuf, ExportError> {
        if report.is_empty() {
            return Err(ExportError::EmptyReport);
        }

        validate_sheet_name(&sample.sample_id)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.workbook_path(sample);

        let mut book = if path.exists() {
            debug!("Opening existing workbook: {:?}", path);
            workbook::read_book(&path).map_err(|source| ExportError::Workbook {
                path: path.clone(),
                source,
            })?
        } else {
            info!("Creating workbook: {:?}", path);
            let mut book = workbook::new_book();
            workbook::add_empty_sheet(&mut book, DEFAULT_SHEET_NAME).map_err(|source| {
                ExportError::Workbook {
                    path: path.clone(),
                    source,
                }
            })?;
            book
        };

        if workbook::has_sheet(&book, &sample.sample_id) {
            return Err(ExportError::DuplicateSheet {
                sheet: sample.sample_id.clone(),
                path,
            });
        }

        let header: Vec<String> = report_columns::ORDER.iter().map(|c| c.to_string()).collect();
        let rows: Vec<Vec<String>> = report.iter().map(|r| r.cells().to_vec()).collect();
        let numeric = [
            column_position(report_columns::CLASS),
            column_position(report_columns::CHROMOSOME_COPY),
        ];

        workbook::append_table(&mut book, &sample.sample_id, &header, &rows, &numeric)
            .and_then(|_| workbook::write_book(&book, &path))
            .map_err(|source| ExportError::Workbook {
                path: path.clone(),
                source,
            })?;

        info!(
            "Exported {} report rows for {} to {:?}",
            report.len(),
            sample.sample_id,
            path
        );

        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn column_position(name: &str) -> usize {
    report_columns::ORDER
        .iter()
        .position(|c| *c == name)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::read_tables;
    use tempfile::TempDir;

    fn report(sample_id: &str) -> Vec<PatientReportRow> {
        vec![
            PatientReportRow {
                patient_id: sample_id.to_string(),
                locus: "A".to_string(),
                class: 1,
                allele: "A*02:01:01G".to_string(),
                chromosome_copy: 1,
                qc_passed: "True".to_string(),
            },
            PatientReportRow {
                patient_id: sample_id.to_string(),
                locus: "DQB1".to_string(),
                class: 2,
                allele: "DQB1*06:02:01G".to_string(),
                chromosome_copy: 2,
                qc_passed: "False".to_string(),
            },
        ]
    }

    #[test]
    fn test_export_creates_workbook_with_default_sheet() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let sample = SampleId::from_filename("T1_S01_R1_bestGuess_G.txt");

        let path = exporter.export(&report("T1_S01"), &sample).unwrap();
        assert_eq!(path, dir.path().join("T1_hla_typing_report.xlsx"));

        let tables = read_tables(&path).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Sheet", "T1_S01"]);

        let sheet = &tables[1];
        assert_eq!(sheet.header, report_columns::ORDER.map(String::from).to_vec());
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.cell(1, 1), "DQB1");
        assert_eq!(sheet.cell(1, 2), "2");
        assert_eq!(sheet.cell(1, 4), "2");
        assert_eq!(sheet.cell(1, 5), "False");
    }

    #[test]
    fn test_export_appends_to_existing_workbook() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());

        let first = SampleId::from_filename("T1_S01_R1_bestGuess_G.txt");
        let second = SampleId::from_filename("T1_S02_R1_bestGuess_G.txt");
        exporter.export(&report("T1_S01"), &first).unwrap();
        let path = exporter.export(&report("T1_S02"), &second).unwrap();

        let tables = read_tables(&path).unwrap();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[2].name, "T1_S02");
    }

    #[test]
    fn test_export_duplicate_sheet_fails() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let sample = SampleId::from_filename("T1_S01_R1_bestGuess_G.txt");

        exporter.export(&report("T1_S01"), &sample).unwrap();
        let err = exporter.export(&report("T1_S01"), &sample).unwrap_err();
        assert!(matches!(err, ExportError::DuplicateSheet { .. }));

        // The original sheet is untouched
        let tables = read_tables(&exporter.workbook_path(&sample)).unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn test_export_sheet_name_collision_ignores_case() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let upper = SampleId {
            sample_id: "T1_S01".to_string(),
            trial_id: "T1".to_string(),
        };
        let lower = SampleId {
            sample_id: "T1_s01".to_string(),
            trial_id: "T1".to_string(),
        };

        exporter.export(&report("T1_S01"), &upper).unwrap();
        let err = exporter.export(&report("T1_s01"), &lower).unwrap_err();
        assert!(matches!(err, ExportError::DuplicateSheet { ref sheet, .. } if sheet == "T1_s01"));

        let tables = read_tables(&exporter.workbook_path(&upper)).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Sheet", "T1_S01"]);
    }

    #[test]
    fn test_export_unreadable_workbook_is_left_in_place() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let sample = SampleId::from_filename("T1_S01_R1_bestGuess_G.txt");
        let path = exporter.workbook_path(&sample);
        std::fs::write(&path, b"not a workbook").unwrap();

        let err = exporter.export(&report("T1_S01"), &sample).unwrap_err();
        assert!(matches!(err, ExportError::Workbook { .. }));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(std::fs::read(&path).unwrap(), b"not a workbook");
    }

    #[test]
    fn test_export_rejects_invalid_sheet_name() {
        let dir = TempDir::new().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let sample = SampleId {
            sample_id: "T1/S01".to_string(),
            trial_id: "T1".to_string(),
        };

        let err = exporter.export(&report("T1/S01"), &sample).unwrap_err();
        assert!(matches!(
            err,
            ExportError::InvalidSheetName(SheetNameError::ForbiddenChar { ch: '/', .. })
        ));
        assert!(!exporter.workbook_path(&sample).exists());
    }

    #[test]
    fn test_status_alert_from_export() {
        let ok: Result<PathBuf, ExportError> = Ok(PathBuf::from("/out/T1_hla_typing_report.xlsx"));
        let alert = StatusAlert::from_export(&ok, "T1_S01");
        assert!(alert.is_success());
        assert_eq!(
            alert.message,
            "Success! The sheet 'T1_S01' was added to the file: /out/T1_hla_typing_report.xlsx"
        );

        let err: Result<PathBuf, ExportError> = Err(ExportError::EmptyReport);
        let alert = StatusAlert::from_export(&err, "T1_S01");
        assert_eq!(alert.color, AlertColor::Warning);
        assert!(alert.message.starts_with("An error occurred: "));
    }
}
