// ==============================================================================
// session.rs - Report Session Pipeline
// ==============================================================================
// Description: Upload → parse → QC → report pipeline with the four result
//              panels held as an explicit view, plus the download and
//              consolidation handlers
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditEventType};
use crate::concatenate::{self, ConcatenatedTable};
use crate::config::ReportConfig;
use crate::consolidate::{ConsolidationOutcome, Consolidator};
use crate::export::{ReportExporter, StatusAlert};
use crate::models::{FailedQcRow, PatientReportRow, SampleId};
use crate::parsers::{HlaLaParser, UploadedDataset};
use crate::qc::{self, QcReport};
use crate::report::build_report;
use crate::validator::UploadValidator;

/// Content of one result panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "content", rename_all = "lowercase")]
pub enum Panel<T> {
    Ready(T),
    /// Rendered error message in place of the content
    Message(String),
}

impl<T> Panel<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(value) => Some(value),
            Panel::Message(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Panel::Ready(_) => None,
            Panel::Message(message) => Some(message),
        }
    }
}

/// Everything shown for one upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub filename: String,
    pub loaded_data: Panel<UploadedDataset>,
    pub qc_report: Panel<QcReport>,
    pub filtered_data: Panel<Vec<FailedQcRow>>,
    pub final_report: Panel<Vec<PatientReportRow>>,
}

/// Single-user report session: one active upload at a time
pub struct ReportSession {
    id: Uuid,
    validator: UploadValidator,
    parser: HlaLaParser,
    view: Option<SessionView>,
    sample: Option<SampleId>,
}

impl ReportSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            validator: UploadValidator::new(),
            parser: HlaLaParser::new(),
            view: None,
            sample: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn view(&self) -> Option<&SessionView> {
        self.view.as_ref()
    }

    /// Run the upload pipeline and replace the current view
    pub fn upload(&mut self, bytes: &[u8], filename: &str) -> &SessionView {
        info!("Session {}: upload {}", self.id, filename);
        self.sample = None;

        let dataset = self
            .validator
            .validate_upload(bytes, filename)
            .and_then(|upload| self.parser.parse_validated(bytes, &upload));

        let dataset = match dataset {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!("Session {}: rejected {}: {}", self.id, filename, e);
                audit::log_event(
                    AuditEventType::FileRejected,
                    Some(self.id),
                    Some(filename.to_string()),
                    serde_json::json!({ "error": e.to_string() }),
                );

                let message = format!("An error occurred while processing the file: {}", e);
                return self.view.insert(SessionView {
                    filename: filename.to_string(),
                    loaded_data: Panel::Message(message.clone()),
                    qc_report: Panel::Message(message.clone()),
                    filtered_data: Panel::Message(message.clone()),
                    final_report: Panel::Message(message),
                });
            }
        };

        audit::log_event(
            AuditEventType::FileUploaded,
            Some(self.id),
            Some(filename.to_string()),
            serde_json::json!({
                "size": bytes.len(),
                "hash": dataset.sha256,
                "rows": dataset.len(),
            }),
        );

        let view = match qc::normalize(&dataset) {
            Ok(rows) => {
                let sample_id = dataset.sample.sample_id.clone();
                let failed = qc::failed_qc(&rows);
                let report = build_report(&rows, &sample_id, &failed);

                audit::log_event(
                    AuditEventType::ReportBuilt,
                    Some(self.id),
                    Some(sample_id.clone()),
                    serde_json::json!({
                        "rows": report.len(),
                        "failed_qc": failed.len(),
                    }),
                );

                self.sample = Some(dataset.sample.clone());
                SessionView {
                    filename: filename.to_string(),
                    qc_report: Panel::Ready(QcReport::build(&sample_id, &rows)),
                    filtered_data: Panel::Ready(failed),
                    final_report: Panel::Ready(report),
                    loaded_data: Panel::Ready(dataset),
                }
            }
            Err(e) => {
                warn!("Session {}: QC failed for {}: {}", self.id, filename, e);
                audit::log_event(
                    AuditEventType::ReportFailed,
                    Some(self.id),
                    Some(filename.to_string()),
                    serde_json::json!({ "error": e.to_string() }),
                );

                let message = format!("An error occurred while processing the file: {}", e);
                SessionView {
                    filename: filename.to_string(),
                    loaded_data: Panel::Ready(dataset),
                    qc_report: Panel::Message(message.clone()),
                    filtered_data: Panel::Message(message.clone()),
                    final_report: Panel::Message(message),
                }
            }
        };

        self.view.insert(view)
    }

    /// Export the current final report into its trial workbook
    pub fn download(&self, config: &ReportConfig) -> StatusAlert {
        let (Some(view), Some(sample)) = (self.view.as_ref(), self.sample.as_ref()) else {
            return StatusAlert::warning("An error occurred: no report available, upload a file first");
        };

        let Some(report) = view.final_report.ready() else {
            return StatusAlert::warning("An error occurred: no report available, upload a file first");
        };

        let result = ReportExporter::new(config.output_dir()).export(report, sample);

        match &result {
            Ok(path) => audit::log_event(
                AuditEventType::SheetExported,
                Some(self.id),
                Some(path.display().to_string()),
                serde_json::json!({ "sheet": sample.sample_id, "rows": report.len() }),
            ),
            Err(e) => {
                warn!("Session {}: export failed: {}", self.id, e);
                audit::log_event(
                    AuditEventType::ExportFailed,
                    Some(self.id),
                    Some(sample.sample_id.clone()),
                    serde_json::json!({ "error": e.to_string() }),
                );
            }
        }

        StatusAlert::from_export(&result, &sample.sample_id)
    }

    /// Wide per-patient table across every exported workbook
    pub fn consolidate(&self, config: &ReportConfig) -> Result<ConsolidationOutcome> {
        Consolidator::new(config.clone()).consolidate()
    }

    /// Concatenated per-patient table, re-read from the consolidation cache
    pub fn concatenate(&self, config: &ReportConfig) -> Result<ConcatenatedTable> {
        concatenate::concatenate_cached(config)
    }
}

impl Default for ReportSession {
    fn default() -> Self {
        Self::new()
    }
}
