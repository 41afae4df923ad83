// ==============================================================================
// qc.rs - HLA Typing Quality Control
// ==============================================================================
// Description: Type normalization, pass/fail rules and QC report series for
//              one uploaded sample
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{upload_columns, FailedQcRow, GenotypeRow};
use crate::parsers::UploadedDataset;

/// Average coverage a call must exceed to pass QC.
/// Ambiguous upstream; kept fixed.
pub const MIN_AVERAGE_COVERAGE: f64 = 2.0;

/// Errors raised while coercing upload cells to their QC types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Type conversion error at row {row}, column {column}: cannot convert '{value}' to {expected}")]
    TypeConversion {
        row: usize,
        column: String,
        value: String,
        expected: &'static str,
    },
}

/// `qc_passed = (q1 == 1.0) AND (average_coverage > MIN_AVERAGE_COVERAGE)`
pub fn qc_passed(row: &GenotypeRow) -> bool {
    row.q1 == 1.0 && row.average_coverage > MIN_AVERAGE_COVERAGE
}

/// Coerce every upload row to a `GenotypeRow`
pub fn normalize(dataset: &UploadedDataset) -> Result<Vec<GenotypeRow>, QcError> {
    let columns = ColumnIndex::resolve(dataset)?;

    let rows = dataset
        .rows
        .iter()
        .enumerate()
        .map(|(idx, cells)| columns.row(idx + 1, cells))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Normalized {} genotype rows", rows.len());
    Ok(rows)
}

/// Rows that are not perfect calls and fail QC
///
/// A row is kept when `q1 != 1.0 || proportion_kmers_covered != 1.0` and
/// `qc_passed` is false.
pub fn failed_qc(rows: &[GenotypeRow]) -> Vec<FailedQcRow> {
    let failed: Vec<FailedQcRow> = rows
        .iter()
        .filter(|r| r.q1 != 1.0 || r.proportion_kmers_covered != 1.0)
        .map(|r| FailedQcRow {
            row: r.clone(),
            qc_passed: qc_passed(r),
        })
        .filter(|r| !r.qc_passed)
        .collect();

    info!("{} of {} genotype calls failed QC", failed.len(), rows.len());
    failed
}

/// One plotted point of the QC report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcPoint {
    pub locus: String,
    pub allele: String,
    pub average_coverage: f64,
    /// Bar label, rounded to two decimals
    pub coverage_label: String,
    pub q1: f64,
    pub proportion_kmers_covered: f64,
}

/// Data series behind the coverage / quality score report of one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcReport {
    pub title: String,
    pub chromosome_copy_1: Vec<QcPoint>,
    pub chromosome_copy_2: Vec<QcPoint>,
}

impl QcReport {
    pub fn build(sample_id: &str, rows: &[GenotypeRow]) -> Self {
        let series = |copy: u8| -> Vec<QcPoint> {
            rows.iter()
                .filter(|r| r.chromosome_copy == copy)
                .map(|r| QcPoint {
                    locus: r.locus.clone(),
                    allele: r.allele.clone(),
                    average_coverage: r.average_coverage,
                    coverage_label: format!("{:.2}", r.average_coverage),
                    q1: r.q1,
                    proportion_kmers_covered: r.proportion_kmers_covered,
                })
                .collect()
        };

        Self {
            title: format!("Quality Control Report of {}", sample_id),
            chromosome_copy_1: series(1),
            chromosome_copy_2: series(2),
        }
    }
}

struct ColumnIndex {
    locus: usize,
    chromosome: usize,
    allele: usize,
    average_coverage: usize,
    q1: usize,
    q2: usize,
    proportion_kmers_covered: usize,
}

impl ColumnIndex {
    fn resolve(dataset: &UploadedDataset) -> Result<Self, QcError> {
        let find = |name: &str| {
            dataset
                .column_index(name)
                .ok_or_else(|| QcError::MissingColumn(name.to_string()))
        };

        Ok(Self {
            locus: find(upload_columns::LOCUS)?,
            chromosome: find(upload_columns::CHROMOSOME)?,
            allele: find(upload_columns::ALLELE)?,
            average_coverage: find(upload_columns::AVERAGE_COVERAGE)?,
            q1: find(upload_columns::Q1)?,
            q2: find(upload_columns::Q2)?,
            proportion_kmers_covered: find(upload_columns::PROPORTION_KMERS_COVERED)?,
        })
    }

    fn row(&self, row: usize, cells: &[String]) -> Result<GenotypeRow, QcError> {
        Ok(GenotypeRow {
            locus: cell(cells, self.locus).to_string(),
            chromosome_copy: coerce(row, upload_columns::CHROMOSOME, cell(cells, self.chromosome), "integer")?,
            allele: cell(cells, self.allele).to_string(),
            average_coverage: coerce(row, upload_columns::AVERAGE_COVERAGE, cell(cells, self.average_coverage), "float")?,
            q1: coerce(row, upload_columns::Q1, cell(cells, self.q1), "float")?,
            q2: coerce(row, upload_columns::Q2, cell(cells, self.q2), "float")?,
            proportion_kmers_covered: coerce(
                row,
                upload_columns::PROPORTION_KMERS_COVERED,
                cell(cells, self.proportion_kmers_covered),
                "float",
            )?,
        })
    }
}

fn cell(cells: &[String], idx: usize) -> &str {
    cells.get(idx).map(String::as_str).unwrap_or("")
}

fn coerce<T: FromStr>(row: usize, column: &str, value: &str, expected: &'static str) -> Result<T, QcError> {
    value.trim().parse::<T>().map_err(|_| QcError::TypeConversion {
        row,
        column: column.to_string(),
        value: value.to_string(),
        expected,
    })
}
