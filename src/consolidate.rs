// ==============================================================================
// consolidate.rs - Cross-Patient HLA Type Consolidation
// ==============================================================================
// Description: Scans every exported report workbook and merges the patient
//              sheets into one wide table (one row per patient, one column
//              pair per tracked locus), cached as <subfolder>/<subfolder>.xlsx
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::audit::{self, AuditEventType};
use crate::config::ReportConfig;
use crate::models::{
    report_columns, ConsolidatedPatientRow, AllelePair, TRACKED_LOCI, DEFAULT_SHEET_NAME,
};
use crate::workbook::{self, SheetTable, WorkbookError};

const WORKBOOK_EXTENSION: &str = ".xlsx";
const LOCK_FILE_PREFIX: &str = "~$";
const CACHE_SHEET_NAME: &str = "Sheet1";

/// A single workbook that could not be consolidated
#[derive(Error, Debug)]
pub enum ConsolidationFileError {
    #[error("Failed to read workbook {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },

    #[error("Sheet '{sheet}' in {path:?} is missing column {column}")]
    MissingColumn {
        path: PathBuf,
        sheet: String,
        column: &'static str,
    },
}

impl ConsolidationFileError {
    pub fn path(&self) -> &Path {
        match self {
            ConsolidationFileError::Unreadable { path, .. }
            | ConsolidationFileError::MissingColumn { path, .. } => path,
        }
    }
}

/// Wide per-patient table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidatedTable {
    pub rows: Vec<ConsolidatedPatientRow>,
}

impl ConsolidatedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn patient(&self, patient_id: &str) -> Option<&ConsolidatedPatientRow> {
        self.rows.iter().find(|r| r.patient_id == patient_id)
    }
}

/// Result of one consolidation run
#[derive(Debug, Default, Serialize)]
pub struct ConsolidationOutcome {
    pub table: ConsolidatedTable,
    /// Workbooks skipped because they could not be read
    #[serde(skip)]
    pub skipped: Vec<ConsolidationFileError>,
    /// Cache file written, if any rows survived
    pub cache_path: Option<PathBuf>,
}

/// Re-reads all exported workbooks of an output directory
#[derive(Debug, Clone)]
pub struct Consolidator {
    config: ReportConfig,
}

impl Consolidator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Consolidate every workbook in the output directory
    ///
    /// Unreadable workbooks are logged and skipped; the remaining files are
    /// still consolidated. When no patient rows survive nothing is written.
    pub fn consolidate(&self) -> Result<ConsolidationOutcome> {
        let output_dir = self.config.output_dir();
        info!("Consolidating HLA reports in {:?}", output_dir);

        let workbooks = self.locate_workbooks();
        debug!("Found {} workbooks", workbooks.len());

        let mut outcome = ConsolidationOutcome::default();

        for path in &workbooks {
            match read_workbook(path) {
                Ok(rows) => {
                    debug!("{:?}: {} patients", path, rows.len());
                    outcome.table.rows.extend(rows);
                }
                Err(e) => {
                    error!("Error processing file {:?}: {}", path, e);
                    audit::log_event(
                        AuditEventType::ConsolidationFileSkipped,
                        None,
                        Some(path.display().to_string()),
                        serde_json::json!({ "error": e.to_string() }),
                    );
                    outcome.skipped.push(e);
                }
            }
        }

        if outcome.table.is_empty() {
            info!("No patient sheets found, cache not written");
            return Ok(outcome);
        }

        let cache_path = self.config.cache_path();
        write_cache(&outcome.table, &cache_path)?;
        audit::log_event(
            AuditEventType::CacheWritten,
            None,
            Some(cache_path.display().to_string()),
            serde_json::json!({ "patients": outcome.table.len() }),
        );
        outcome.cache_path = Some(cache_path);

        info!(
            "Consolidated {} patients from {} workbooks ({} skipped)",
            outcome.table.len(),
            workbooks.len(),
            outcome.skipped.len()
        );
        audit::log_event(
            AuditEventType::ConsolidationCompleted,
            None,
            Some(output_dir.display().to_string()),
            serde_json::json!({
                "workbooks": workbooks.len(),
                "patients": outcome.table.len(),
                "skipped": outcome.skipped.len(),
            }),
        );

        Ok(outcome)
    }

    /// Top-level `.xlsx` files of the output directory, in name order
    fn locate_workbooks(&self) -> Vec<PathBuf> {
        let dir = self.config.output_dir();

        if !dir.exists() {
            warn!("Output directory {:?} does not exist", dir);
            return Vec::new();
        }

        let mut workbooks = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Skipping unreadable entry in {:?}: {}", dir, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if file_name.ends_with(WORKBOOK_EXTENSION) && !file_name.starts_with(LOCK_FILE_PREFIX) {
                workbooks.push(entry.into_path());
            }
        }

        workbooks
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }
}

/// Flatten every patient sheet of one exported workbook
pub fn read_workbook(path: &Path) -> Result<Vec<ConsolidatedPatientRow>, ConsolidationFileError> {
    let tables = workbook::read_tables(path).map_err(|source| ConsolidationFileError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for table in &tables {
        if table.is_empty() || table.name == DEFAULT_SHEET_NAME {
            continue;
        }
        rows.push(flatten_sheet(path, table)?);
    }

    Ok(rows)
}

/// One report sheet → one wide row named after the sheet
fn flatten_sheet(path: &Path, table: &SheetTable) -> Result<ConsolidatedPatientRow, ConsolidationFileError> {
    let column = |name: &'static str| {
        table
            .column_index(name)
            .ok_or_else(|| ConsolidationFileError::MissingColumn {
                path: path.to_path_buf(),
                sheet: table.name.clone(),
                column: name,
            })
    };

    let locus_col = column(report_columns::LOCUS)?;
    let copy_col = column(report_columns::CHROMOSOME_COPY)?;
    let allele_col = column(report_columns::ALLELE)?;

    let mut patient = ConsolidatedPatientRow::new(table.name.clone());

    for idx in 0..table.rows.len() {
        let locus = table.cell(idx, locus_col);
        let Some(pair) = patient.pair_mut(locus) else {
            continue;
        };

        let allele = table.cell(idx, allele_col);
        if allele.is_empty() {
            continue;
        }

        match parse_copy(table.cell(idx, copy_col)) {
            Some(1) => set_once(&mut pair.copy_1, allele),
            Some(2) => set_once(&mut pair.copy_2, allele),
            _ => debug!(
                "Sheet '{}' row {}: unrecognised chromosome copy '{}'",
                table.name,
                idx + 2,
                table.cell(idx, copy_col)
            ),
        }
    }

    Ok(patient)
}

/// Chromosome copies may come back as "1" or "1.0"
fn parse_copy(value: &str) -> Option<u8> {
    let number = value.parse::<f64>().ok()?;
    if number == 1.0 {
        Some(1)
    } else if number == 2.0 {
        Some(2)
    } else {
        None
    }
}

fn set_once(slot: &mut Option<String>, allele: &str) {
    if slot.is_none() {
        *slot = Some(allele.to_string());
    }
}

/// Write the consolidated table to `path`, replacing any previous cache
pub fn write_cache(table: &ConsolidatedTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
    }

    let header = ConsolidatedPatientRow::column_names();
    let rows: Vec<Vec<String>> = table.rows.iter().map(ConsolidatedPatientRow::cells).collect();

    let mut book = workbook::new_book();
    workbook::append_table(&mut book, CACHE_SHEET_NAME, &header, &rows, &[])
        .and_then(|_| workbook::write_book(&book, path))
        .with_context(|| format!("Failed to write consolidation cache {:?}", path))?;

    info!("Wrote consolidation cache: {:?} ({} patients)", path, table.len());
    Ok(())
}

/// Re-read a consolidation cache file
///
/// Every sheet is read; empty sheets are skipped and rows whose patient id is
/// the default sheet name are dropped.
pub fn load_cache(path: &Path) -> Result<ConsolidatedTable> {
    let tables = workbook::read_tables(path)
        .with_context(|| format!("Failed to read consolidation cache {:?}", path))?;

    let mut table = ConsolidatedTable::default();

    for sheet in tables.iter().filter(|t| !t.is_empty()) {
        let patient_col = sheet.column_index(report_columns::PATIENT_ID).with_context(|| {
            format!("Cache sheet '{}' has no {} column", sheet.name, report_columns::PATIENT_ID)
        })?;

        let locus_cols: Vec<(Option<usize>, Option<usize>)> = TRACKED_LOCI
            .iter()
            .map(|locus| {
                (
                    sheet.column_index(&format!("{}_1", locus)),
                    sheet.column_index(&format!("{}_2", locus)),
                )
            })
            .collect();

        for idx in 0..sheet.rows.len() {
            let patient_id = sheet.cell(idx, patient_col);
            if patient_id == DEFAULT_SHEET_NAME {
                continue;
            }

            let value = |col: Option<usize>| {
                col.map(|c| sheet.cell(idx, c))
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };

            table.rows.push(ConsolidatedPatientRow {
                patient_id: patient_id.to_string(),
                loci: locus_cols
                    .iter()
                    .map(|(c1, c2)| AllelePair {
                        copy_1: value(*c1),
                        copy_2: value(*c2),
                    })
                    .collect(),
            });
        }
    }

    debug!("Loaded {} patients from cache {:?}", table.len(), path);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ReportExporter;
    use crate::models::{PatientReportRow, SampleId};
    use crate::parsers::HlaLaParser;
    use crate::{qc, report};
    use tempfile::TempDir;

    const UPLOAD: &str = "\
Locus\tChromosome\tAllele\tQ1\tQ2\tAverageCoverage\tproportionkMersCovered
A\t1\tA*02:01:01G\t1\t1\t45.2\t1
A\t2\tA*03:01:01G\t1\t1\t44.8\t1
DQB1\t1\tDQB1*06:02:01G\t1\t1\t30.1\t1
DQB1\t2\tDQB1*03:01:01G\t0.7\t1\t1.2\t0.9
DRB4\t1\tDRB4*01:01:01G\t1\t1\t12.0\t1
";

    fn report_rows(sample_id: &str, alleles: &[(&str, u8, &str)]) -> Vec<PatientReportRow> {
        alleles
            .iter()
            .map(|(locus, copy, allele)| PatientReportRow {
                patient_id: sample_id.to_string(),
                locus: locus.to_string(),
                class: crate::models::locus_class(locus),
                allele: allele.to_string(),
                chromosome_copy: *copy,
                qc_passed: "True".to_string(),
            })
            .collect()
    }

    fn export(dir: &Path, filename: &str, alleles: &[(&str, u8, &str)]) {
        let sample = SampleId::from_filename(filename);
        ReportExporter::new(dir)
            .export(&report_rows(&sample.sample_id, alleles), &sample)
            .unwrap();
    }

    #[test]
    fn test_round_trip_upload_export_consolidate() {
        let dir = TempDir::new().unwrap();
        let config = ReportConfig::new(dir.path(), "per_patient");

        let filename = "T1_S01_R1_bestGuess_G.txt";
        let dataset = HlaLaParser::new().parse(UPLOAD.as_bytes(), filename).unwrap();
        let rows = qc::normalize(&dataset).unwrap();
        let built = report::build_report(&rows, &dataset.sample.sample_id, &qc::failed_qc(&rows));
        ReportExporter::new(dir.path()).export(&built, &dataset.sample).unwrap();

        let outcome = Consolidator::new(config.clone()).consolidate().unwrap();
        assert_eq!(outcome.table.len(), 1);
        assert!(outcome.skipped.is_empty());

        let patient = outcome.table.patient("T1_S01").unwrap();
        let a = patient.pair("A").unwrap();
        assert_eq!(a.copy_1.as_deref(), Some("A*02:01:01G"));
        assert_eq!(a.copy_2.as_deref(), Some("A*03:01:01G"));

        let dqb1 = patient.pair("DQB1").unwrap();
        assert_eq!(dqb1.copy_1.as_deref(), Some("DQB1*06:02:01G"));
        assert_eq!(dqb1.copy_2.as_deref(), Some("DQB1*03:01:01G"));

        // Each locus reads its own rows
        let drb4 = patient.pair("DRB4").unwrap();
        assert_eq!(drb4.copy_1.as_deref(), Some("DRB4*01:01:01G"));
        assert_eq!(drb4.copy_2, None);
        assert_eq!(patient.pair("DQA1").unwrap(), &AllelePair::default());

        // Cache written and readable
        let cache_path = outcome.cache_path.unwrap();
        assert_eq!(cache_path, dir.path().join("per_patient").join("per_patient.xlsx"));
        let cached = load_cache(&cache_path).unwrap();
        assert_eq!(cached, outcome.table);
    }

    #[test]
    fn test_default_sheet_excluded_and_empty_workbook() {
        let dir = TempDir::new().unwrap();

        // Workbook holding only the default empty sheet
        let mut book = workbook::new_book();
        book.new_sheet(DEFAULT_SHEET_NAME).unwrap();
        workbook::write_book(&book, &dir.path().join("T9_hla_typing_report.xlsx")).unwrap();

        let config = ReportConfig::new(dir.path(), "per_patient");
        let outcome = Consolidator::new(config.clone()).consolidate().unwrap();

        assert!(outcome.table.is_empty());
        assert!(outcome.cache_path.is_none());
        assert!(!config.cache_path().exists());
    }

    #[test]
    fn test_sheet_named_sheet_with_data_is_excluded() {
        let dir = TempDir::new().unwrap();
        let header: Vec<String> = report_columns::ORDER.iter().map(|c| c.to_string()).collect();
        let row: Vec<String> = ["Sheet", "A", "1", "A*01:01:01G", "1", "True"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let mut book = workbook::new_book();
        workbook::append_table(&mut book, DEFAULT_SHEET_NAME, &header, &[row], &[4]).unwrap();
        workbook::write_book(&book, &dir.path().join("T9_hla_typing_report.xlsx")).unwrap();

        let rows = read_workbook(&dir.path().join("T9_hla_typing_report.xlsx")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_partial_failure_tolerance() {
        let dir = TempDir::new().unwrap();

        export(dir.path(), "T1_S01_R1_bestGuess_G.txt", &[("A", 1, "A*01:01:01G"), ("A", 2, "A*02:01:01G")]);
        export(dir.path(), "T2_S01_R1_bestGuess_G.txt", &[("B", 1, "B*07:02:01G")]);
        export(dir.path(), "T3_S07_R1_bestGuess_G.txt", &[("C", 2, "C*07:01:01G")]);

        // Not a zip archive
        std::fs::write(dir.path().join("T0_hla_typing_report.xlsx"), b"not a workbook").unwrap();
        // Ignored entirely
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        std::fs::write(dir.path().join("~$T1_hla_typing_report.xlsx"), b"lock").unwrap();

        let config = ReportConfig::new(dir.path(), "per_patient");
        let outcome = Consolidator::new(config).consolidate().unwrap();

        assert_eq!(outcome.table.len(), 3);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            outcome.skipped[0].path(),
            dir.path().join("T0_hla_typing_report.xlsx").as_path()
        );

        let ids: Vec<&str> = outcome.table.rows.iter().map(|r| r.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["T1_S01", "T2_S01", "T3_S07"]);
        assert_eq!(
            outcome.table.patient("T3_S07").unwrap().pair("C").unwrap().copy_2.as_deref(),
            Some("C*07:01:01G")
        );
    }

    #[test]
    fn test_cache_is_not_rescanned() {
        let dir = TempDir::new().unwrap();
        export(dir.path(), "T1_S01_R1_bestGuess_G.txt", &[("A", 1, "A*01:01:01G")]);

        let consolidator = Consolidator::new(ReportConfig::new(dir.path(), "per_patient"));
        assert_eq!(consolidator.consolidate().unwrap().table.len(), 1);
        // Second call sees the same single workbook, not the cache file
        assert_eq!(consolidator.consolidate().unwrap().table.len(), 1);
    }

    #[test]
    fn test_missing_report_columns_skip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("T5_hla_typing_report.xlsx");

        let mut book = workbook::new_book();
        let header = vec!["LOCUS".to_string(), "ALLELE".to_string()];
        workbook::append_table(&mut book, "T5_S01", &header, &[header.clone()], &[]).unwrap();
        workbook::write_book(&book, &path).unwrap();

        let err = read_workbook(&path).unwrap_err();
        assert!(matches!(
            err,
            ConsolidationFileError::MissingColumn { column: "CHROMOSOME_COPY", .. }
        ));
    }

    #[test]
    fn test_missing_output_dir_yields_empty_table() {
        let dir = TempDir::new().unwrap();
        let config = ReportConfig::new(dir.path().join("missing"), "per_patient");
        let outcome = Consolidator::new(config).consolidate().unwrap();
        assert!(outcome.table.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_output_dir_does_not_abort() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("locked");
        std::fs::create_dir(&output).unwrap();
        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o000)).unwrap();

        let config = ReportConfig::new(&output, "per_patient");
        let result = Consolidator::new(config).consolidate();

        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o755)).unwrap();

        let outcome = result.unwrap();
        assert!(outcome.table.is_empty());
        assert!(outcome.cache_path.is_none());
    }

    #[test]
    fn test_parse_copy() {
        assert_eq!(parse_copy("1"), Some(1));
        assert_eq!(parse_copy("2.0"), Some(2));
        assert_eq!(parse_copy("3"), None);
        assert_eq!(parse_copy("x"), None);
    }
}
