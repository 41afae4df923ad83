// ==============================================================================
// report.rs - Per-Patient Report Builder
// ==============================================================================
// Description: Reshapes a classified sample into the canonical report rows
//              that are exported one sheet per patient
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::HashSet;
use tracing::debug;

use crate::models::{locus_class, FailedQcRow, GenotypeRow, PatientReportRow};

/// Build the report for one sample
///
/// # Arguments
/// * `rows` - Every normalized genotype row of the upload, in upload order
/// * `sample_id` - Patient identifier taken from the filename
/// * `failed` - The failed-QC view of the same rows
///
/// # QC attribution
/// QC failure is attributed per locus: if any copy of a locus failed, every
/// report row for that locus is marked "False".
pub fn build_report(rows: &[GenotypeRow], sample_id: &str, failed: &[FailedQcRow]) -> Vec<PatientReportRow> {
    let failed_loci: HashSet<&str> = failed.iter().map(|f| f.row.locus.as_str()).collect();

    let report: Vec<PatientReportRow> = rows
        .iter()
        .map(|row| PatientReportRow {
            patient_id: sample_id.to_string(),
            locus: row.locus.clone(),
            class: locus_class(&row.locus),
            allele: row.allele.clone(),
            chromosome_copy: row.chromosome_copy,
            qc_passed: qc_label(!failed_loci.contains(row.locus.as_str())).to_string(),
        })
        .collect();

    debug!(
        "Built report for {}: {} rows, {} failed loci",
        sample_id,
        report.len(),
        failed_loci.len()
    );

    report
}

fn qc_label(passed: bool) -> &'static str {
    if passed {
        "True"
    } else {
        "False"
    }
}
