// ==============================================================================
// audit.rs - Audit Logging for Report Operations
// ==============================================================================
// Description: Audit trail for uploads, exports and consolidation runs,
//              emitted as structured events on the `audit` tracing target
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // File operations
    FileUploaded,
    FileRejected,

    // Report events
    ReportBuilt,
    ReportFailed,
    SheetExported,
    ExportFailed,

    // Consolidation events
    ConsolidationCompleted,
    ConsolidationFileSkipped,
    CacheWritten,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub session_id: Option<Uuid>,
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        session_id: Option<Uuid>,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::FileRejected
            | AuditEventType::ExportFailed
            | AuditEventType::ConsolidationFileSkipped => LogSeverity::Warning,

            AuditEventType::ReportFailed => LogSeverity::Error,

            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            session_id,
            resource,
            details,
            severity,
        }
    }

    pub fn log(&self) {
        let payload = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(target: "audit", "Failed to serialize audit event {}: {}", self.id, e);
                return;
            }
        };

        match self.severity {
            LogSeverity::Info => tracing::info!(target: "audit", "{}", payload),
            LogSeverity::Warning => tracing::warn!(target: "audit", "{}", payload),
            LogSeverity::Error => tracing::error!(target: "audit", "{}", payload),
        }
    }
}

/// Convenience function to log an audit event
pub fn log_event(
    event_type: AuditEventType,
    session_id: Option<Uuid>,
    resource: Option<String>,
    details: serde_json::Value,
) {
    AuditEvent::new(event_type, session_id, resource, details).log();
}
