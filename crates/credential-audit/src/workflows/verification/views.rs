use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{AuditTrailEntry, StepStatus, StepStatusRecord, StepType};
use super::registry::{StepRegistry, VerificationStepDefinition};

/// Flattened audit entry for timeline renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntryView {
    pub step_key: String,
    pub step_label: String,
    pub status: StepStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status_label: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
    pub changed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_label: Option<String>,
    pub risk_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TimelineEntryView {
    pub fn from_entry(entry: &AuditTrailEntry, registry: &StepRegistry) -> Self {
        let data = &entry.data;
        let error_detail = match (&data.error_code, &data.error_message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (Some(code), None) => Some(code.clone()),
            (None, Some(message)) => Some(message.clone()),
            (None, None) => None,
        };

        Self {
            step_key: entry.step_key.to_string(),
            step_label: registry.display_name_of(entry.step_key.as_str()).to_string(),
            status: entry.status,
            status_label: entry.status.label(),
            previous_status_label: entry.previous_status.map(StepStatus::label),
            timestamp: entry.timestamp,
            changed_by: entry.changed_by.clone(),
            notes: entry.notes.clone(),
            result_label: data.verification_result.map(|result| result.label()),
            confidence_score: data.confidence_score,
            duration_label: data.processing_duration_ms.map(format_duration),
            risk_flags: data.risk_flags.clone(),
            error_detail,
        }
    }
}

/// One registry step with its current status for tabular renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOverviewRow {
    pub key: &'static str,
    pub display_name: &'static str,
    pub step_type: StepType,
    pub status: StepStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<&'static str>,
    pub can_start: bool,
}

impl StepOverviewRow {
    pub fn new(
        definition: &VerificationStepDefinition,
        record: Option<&StepStatusRecord>,
        can_start: bool,
    ) -> Self {
        let status = record
            .map(|record| record.status)
            .unwrap_or(StepStatus::NotStarted);

        Self {
            key: definition.key,
            display_name: definition.display_name,
            step_type: definition.step_type,
            status,
            status_label: status.label(),
            updated_at: record.map(|record| record.updated_at),
            dependencies: definition.dependencies.clone(),
            can_start,
        }
    }
}

fn format_duration(millis: u64) -> String {
    match millis {
        0..=999 => format!("{millis} ms"),
        // 59_950 and up would print as "60.0 s".
        1_000..=59_949 => format!("{:.1} s", millis as f64 / 1_000.0),
        _ => {
            let seconds = (millis + 500) / 1_000;
            format!("{}m {:02}s", seconds / 60, seconds % 60)
        }
    }
}
