use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::domain::AuditTrailEntry;
use super::registry::StepRegistry;

#[derive(Debug)]
pub enum AuditExportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for AuditExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditExportError::Io(err) => write!(f, "failed to write audit export: {}", err),
            AuditExportError::Csv(err) => write!(f, "could not encode audit trail as CSV: {}", err),
        }
    }
}

impl std::error::Error for AuditExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuditExportError::Io(err) => Some(err),
            AuditExportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for AuditExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for AuditExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

const HEADER: [&str; 14] = [
    "application_id",
    "timestamp",
    "step_key",
    "step_name",
    "status",
    "previous_status",
    "changed_by",
    "verification_result",
    "confidence_score",
    "processing_duration_ms",
    "risk_flags",
    "error_code",
    "error_message",
    "notes",
];

// Field order must match HEADER.
#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    application_id: u64,
    timestamp: String,
    step_key: &'a str,
    step_name: &'a str,
    status: &'static str,
    previous_status: &'static str,
    changed_by: &'a str,
    verification_result: &'static str,
    confidence_score: Option<u8>,
    processing_duration_ms: Option<u64>,
    risk_flags: String,
    error_code: Option<&'a str>,
    error_message: Option<&'a str>,
    notes: Option<&'a str>,
}

impl<'a> AuditRow<'a> {
    fn new(entry: &'a AuditTrailEntry, registry: &'a StepRegistry) -> Self {
        let data = &entry.data;
        Self {
            application_id: entry.application_id.0,
            timestamp: entry.timestamp.to_rfc3339(),
            step_key: entry.step_key.as_str(),
            step_name: registry.display_name_of(entry.step_key.as_str()),
            status: entry.status.as_str(),
            previous_status: entry.previous_status.map(|status| status.as_str()).unwrap_or(""),
            changed_by: &entry.changed_by,
            verification_result: data
                .verification_result
                .map(|result| result.label())
                .unwrap_or(""),
            confidence_score: data.confidence_score,
            processing_duration_ms: data.processing_duration_ms,
            risk_flags: data.risk_flags.join(";"),
            error_code: data.error_code.as_deref(),
            error_message: data.error_message.as_deref(),
            notes: entry.notes.as_deref(),
        }
    }
}

/// Writes audit trails as CSV, one row per entry in the order given.
pub struct AuditTrailExporter;

impl AuditTrailExporter {
    pub fn to_path<P: AsRef<Path>>(
        path: P,
        entries: &[AuditTrailEntry],
        registry: &StepRegistry,
    ) -> Result<usize, AuditExportError> {
        let file = std::fs::File::create(path)?;
        Self::to_writer(file, entries, registry)
    }

    /// Returns the number of data rows written. The header row is always present.
    pub fn to_writer<W: Write>(
        writer: W,
        entries: &[AuditTrailEntry],
        registry: &StepRegistry,
    ) -> Result<usize, AuditExportError> {
        let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        csv_writer.write_record(HEADER)?;
        for entry in entries {
            csv_writer.serialize(AuditRow::new(entry, registry))?;
        }
        csv_writer.flush()?;
        Ok(entries.len())
    }
}
