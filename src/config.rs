// ==============================================================================
// config.rs - Report Output Configuration
// ==============================================================================
// Description: Output directory and consolidation cache settings passed
//              explicitly to the exporter and consolidator
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR_ENV: &str = "HLA_OUTPUT_DIR";
pub const CACHE_SUBFOLDER_ENV: &str = "HLA_CACHE_SUBFOLDER";

pub const DEFAULT_OUTPUT_DIR: &str = "./output";
pub const DEFAULT_CACHE_SUBFOLDER: &str = "hla_types_per_patient";

/// Where exported workbooks live and where the consolidated cache is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory holding the `<trial>_hla_typing_report.xlsx` workbooks
    pub output_dir: PathBuf,

    /// Subfolder of `output_dir` receiving `<subfolder>.xlsx`
    pub cache_subfolder: String,
}

impl ReportConfig {
    pub fn new(output_dir: impl Into<PathBuf>, cache_subfolder: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cache_subfolder: cache_subfolder.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }

        if self.cache_subfolder.trim().is_empty() {
            anyhow::bail!("Cache subfolder must not be empty");
        }

        if self.cache_subfolder.contains(['/', '\\'])
            || self.cache_subfolder == "."
            || self.cache_subfolder == ".."
        {
            anyhow::bail!(
                "Cache subfolder must be a single directory name: {}",
                self.cache_subfolder
            );
        }

        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<subfolder>/<subfolder>.xlsx`
    pub fn cache_path(&self) -> PathBuf {
        self.output_dir
            .join(&self.cache_subfolder)
            .join(format!("{}.xlsx", self.cache_subfolder))
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR, DEFAULT_CACHE_SUBFOLDER)
    }
}
