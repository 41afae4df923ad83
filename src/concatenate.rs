// ==============================================================================
// concatenate.rs - Allele Concatenation
// ==============================================================================
// Description: Merges each locus's two chromosome-copy columns of the
//              consolidated table into one "<allele_1>_<allele_2>" column
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ReportConfig;
use crate::consolidate::{load_cache, ConsolidatedTable};
use crate::models::{AllelePair, ConcatenatedPatientRow, DEFAULT_SHEET_NAME};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConcatenatedTable {
    pub rows: Vec<ConcatenatedPatientRow>,
}

impl ConcatenatedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn patient(&self, patient_id: &str) -> Option<&ConcatenatedPatientRow> {
        self.rows.iter().find(|r| r.patient_id == patient_id)
    }
}

/// Join both copies; absent when either copy is absent
pub fn join_alleles(pair: &AllelePair) -> Option<String> {
    match (&pair.copy_1, &pair.copy_2) {
        (Some(first), Some(second)) => Some(format!("{}_{}", first, second)),
        _ => None,
    }
}

/// Concatenate a consolidated table, dropping default-sheet rows
pub fn concatenate(table: &ConsolidatedTable) -> ConcatenatedTable {
    let rows: Vec<ConcatenatedPatientRow> = table
        .rows
        .iter()
        .filter(|r| r.patient_id != DEFAULT_SHEET_NAME)
        .map(|r| ConcatenatedPatientRow {
            patient_id: r.patient_id.clone(),
            loci: r.loci.iter().map(join_alleles).collect(),
        })
        .collect();

    debug!("Concatenated alleles for {} patients", rows.len());
    ConcatenatedTable { rows }
}

/// Concatenate from the consolidation cache on disk
///
/// A missing cache (nothing consolidated yet) gives an empty table.
pub fn concatenate_cached(config: &ReportConfig) -> Result<ConcatenatedTable> {
    let path = config.cache_path();

    if !path.exists() {
        info!("No consolidation cache at {:?}", path);
        return Ok(ConcatenatedTable::default());
    }

    let table = load_cache(&path)?;
    Ok(concatenate(&table))
}
