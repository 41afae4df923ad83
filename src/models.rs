// ==============================================================================
// models.rs - HLA Typing Data Models
// ==============================================================================
// Description: Data structures for per-sample HLA typing reports and the
//              cross-patient consolidated views
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Column names of the HLA-LA `bestGuess_G.txt` output (case-sensitive)
pub mod upload_columns {
    pub const LOCUS: &str = "Locus";
    pub const CHROMOSOME: &str = "Chromosome";
    pub const ALLELE: &str = "Allele";
    pub const AVERAGE_COVERAGE: &str = "AverageCoverage";
    pub const Q1: &str = "Q1";
    pub const Q2: &str = "Q2";
    pub const PROPORTION_KMERS_COVERED: &str = "proportionkMersCovered";
}

/// Column names of an exported per-patient report sheet
pub mod report_columns {
    pub const PATIENT_ID: &str = "PATIENT_ID";
    pub const LOCUS: &str = "LOCUS";
    pub const CLASS: &str = "CLASS";
    pub const ALLELE: &str = "ALLELE";
    pub const CHROMOSOME_COPY: &str = "CHROMOSOME_COPY";
    pub const QC_PASSED: &str = "QC_PASSED";

    /// Fixed column order of a report sheet
    pub const ORDER: [&str; 6] = [PATIENT_ID, LOCUS, CLASS, ALLELE, CHROMOSOME_COPY, QC_PASSED];
}

/// Loci carried into the consolidated per-patient tables, in column order
pub const TRACKED_LOCI: [&str; 13] = [
    "A", "B", "C", "DQA1", "DQB1", "DRB1", "DPA1", "DPB1", "DRB3", "DRB4", "E", "F", "G",
];

/// Name of the empty first sheet of a newly created workbook.
/// Never a patient.
pub const DEFAULT_SHEET_NAME: &str = "Sheet";

/// Sample and trial identifiers derived from an upload filename
///
/// `T1_S01_R1_bestGuess_G.txt` → sample `T1_S01`, trial `T1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleId {
    pub sample_id: String,
    pub trial_id: String,
}

impl SampleId {
    pub fn from_filename(filename: &str) -> Self {
        // Text before the first "_R1"; the whole name when the marker is absent
        let sample_id = filename
            .split("_R1")
            .next()
            .unwrap_or(filename)
            .to_string();

        let trial_id = sample_id
            .split('_')
            .next()
            .unwrap_or(&sample_id)
            .to_string();

        Self { sample_id, trial_id }
    }

    /// Whether the filename actually carried the `_R1` read marker
    pub fn has_read_marker(filename: &str) -> bool {
        filename.contains("_R1")
    }

    /// Name of the shared workbook for this sample's trial
    pub fn workbook_name(&self) -> String {
        format!("{}_hla_typing_report.xlsx", self.trial_id)
    }
}

/// One typed allele call from an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenotypeRow {
    pub locus: String,
    pub chromosome_copy: u8,
    pub allele: String,
    pub average_coverage: f64,
    pub q1: f64,
    pub q2: f64,
    pub proportion_kmers_covered: f64,
}

/// A genotype row shown in the failed-QC view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedQcRow {
    #[serde(flatten)]
    pub row: GenotypeRow,
    pub qc_passed: bool,
}

/// One row of the canonical per-patient report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PatientReportRow {
    pub patient_id: String,
    pub locus: String,
    pub class: u8,
    pub allele: String,
    pub chromosome_copy: u8,
    /// "True"/"False" as text so spreadsheet locales leave it alone
    pub qc_passed: String,
}

impl PatientReportRow {
    /// Cell values in `report_columns::ORDER`
    pub fn cells(&self) -> [String; 6] {
        [
            self.patient_id.clone(),
            self.locus.clone(),
            self.class.to_string(),
            self.allele.clone(),
            self.chromosome_copy.to_string(),
            self.qc_passed.clone(),
        ]
    }
}

/// Allele calls for both chromosome copies of one locus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllelePair {
    pub copy_1: Option<String>,
    pub copy_2: Option<String>,
}

/// One patient in the wide consolidated table.
/// `loci` is aligned with `TRACKED_LOCI`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedPatientRow {
    pub patient_id: String,
    pub loci: Vec<AllelePair>,
}

impl ConsolidatedPatientRow {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            loci: vec![AllelePair::default(); TRACKED_LOCI.len()],
        }
    }

    pub fn pair(&self, locus: &str) -> Option<&AllelePair> {
        locus_index(locus).and_then(|idx| self.loci.get(idx))
    }

    pub fn pair_mut(&mut self, locus: &str) -> Option<&mut AllelePair> {
        locus_index(locus).and_then(move |idx| self.loci.get_mut(idx))
    }

    /// Column headers: PATIENT_ID, A_1, A_2, B_1, ...
    pub fn column_names() -> Vec<String> {
        let mut columns = vec![report_columns::PATIENT_ID.to_string()];
        for locus in TRACKED_LOCI {
            columns.push(format!("{}_1", locus));
            columns.push(format!("{}_2", locus));
        }
        columns
    }

    /// Cell values aligned with `column_names`; absent alleles are empty
    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.patient_id.clone()];
        for pair in &self.loci {
            cells.push(pair.copy_1.clone().unwrap_or_default());
            cells.push(pair.copy_2.clone().unwrap_or_default());
        }
        cells
    }
}

/// One patient with each locus pair merged into `"<allele_1>_<allele_2>"`.
/// `loci` is aligned with `TRACKED_LOCI`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatenatedPatientRow {
    pub patient_id: String,
    pub loci: Vec<Option<String>>,
}

impl ConcatenatedPatientRow {
    pub fn get(&self, locus: &str) -> Option<&str> {
        locus_index(locus)
            .and_then(|idx| self.loci.get(idx))
            .and_then(|value| value.as_deref())
    }

    pub fn column_names() -> Vec<String> {
        std::iter::once(report_columns::PATIENT_ID)
            .chain(TRACKED_LOCI)
            .map(str::to_string)
            .collect()
    }

    pub fn cells(&self) -> Vec<String> {
        std::iter::once(self.patient_id.clone())
            .chain(self.loci.iter().map(|v| v.clone().unwrap_or_default()))
            .collect()
    }
}

/// Position of a locus in `TRACKED_LOCI`
pub fn locus_index(locus: &str) -> Option<usize> {
    TRACKED_LOCI.iter().position(|l| *l == locus)
}

/// Report class heuristic: one-character locus codes are class 1, the rest class 2
pub fn locus_class(locus: &str) -> u8 {
    if locus.chars().count() > 1 {
        2
    } else {
        1
    }
}
