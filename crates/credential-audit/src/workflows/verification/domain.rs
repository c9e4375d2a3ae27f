use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for credentialing applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ApplicationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Key of a verification step (e.g. `license_verification`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(pub String);

impl StepKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for StepKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a single verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    RequiresReview,
}

impl StepStatus {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::NotStarted,
            Self::InProgress,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
            Self::RequiresReview,
        ]
    }

    /// Statuses accepted when completing a step.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::RequiresReview
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RequiresReview => "requires_review",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::RequiresReview => "Requires Review",
        }
    }

    /// Parse the wire representation, returning `None` for unknown values.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|status| status.as_str() == raw.trim())
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application level rollup of every step's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    InProgress,
    Completed,
    Failed,
}

impl OverallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// Kind of primary-source check a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    License,
    Sanctions,
    Malpractice,
    Education,
    BoardCertification,
    DeaRegistration,
    WorkHistory,
    CommitteeReview,
    Other,
}

impl StepType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::License => "License",
            Self::Sanctions => "Sanctions",
            Self::Malpractice => "Malpractice",
            Self::Education => "Education",
            Self::BoardCertification => "Board Certification",
            Self::DeaRegistration => "DEA Registration",
            Self::WorkHistory => "Work History",
            Self::CommitteeReview => "Committee Review",
            Self::Other => "Other",
        }
    }
}

/// Priority hint attached when a step is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Outcome reported by the verification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Verified,
    NotVerified,
    Discrepancy,
    Inconclusive,
}

impl VerificationResult {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Verified => "Verified",
            Self::NotVerified => "Not Verified",
            Self::Discrepancy => "Discrepancy",
            Self::Inconclusive => "Inconclusive",
        }
    }
}

/// Verification specific findings, keyed by the kind of check that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum StepDetail {
    License {
        license_number: Option<String>,
        issuing_state: Option<String>,
        expires_on: Option<NaiveDate>,
        #[serde(default)]
        disciplinary_actions: Vec<String>,
    },
    Sanctions {
        #[serde(default)]
        lists_checked: Vec<String>,
        #[serde(default)]
        matches: Vec<String>,
    },
    Malpractice {
        reports_found: u32,
        open_claims: u32,
    },
    Education {
        institution: String,
        degree: Option<String>,
        graduation_year: Option<u16>,
    },
    Generic {
        #[serde(default)]
        fields: BTreeMap<String, Value>,
    },
}

impl StepDetail {
    /// Step type a detail variant belongs to; `Generic` matches any type.
    pub fn matches(&self, step_type: StepType) -> bool {
        match self {
            Self::License { .. } => step_type == StepType::License,
            Self::Sanctions { .. } => step_type == StepType::Sanctions,
            Self::Malpractice { .. } => step_type == StepType::Malpractice,
            Self::Education { .. } => step_type == StepType::Education,
            Self::Generic { .. } => true,
        }
    }
}

/// Structured payload recorded with every audit entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<StepPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub compliance_checks: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<StepDetail>,
}

/// One immutable record of a step transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    pub application_id: ApplicationId,
    pub step_key: StepKey,
    pub timestamp: DateTime<Utc>,
    pub status: StepStatus,
    pub previous_status: Option<StepStatus>,
    pub changed_by: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub data: StepData,
}

impl AuditTrailEntry {
    /// Two entries describe the same transition when step, time and status agree.
    pub(crate) fn same_transition(&self, other: &AuditTrailEntry) -> bool {
        self.step_key == other.step_key
            && self.timestamp == other.timestamp
            && self.status == other.status
    }
}

/// Latest known entry for one step of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatusRecord {
    pub status: StepStatus,
    pub updated_at: DateTime<Utc>,
    pub entry: AuditTrailEntry,
}

impl StepStatusRecord {
    pub fn step_key(&self) -> &StepKey {
        &self.entry.step_key
    }

    /// Last-write-wins: only a strictly newer entry supersedes this record.
    pub fn is_superseded_by(&self, incoming: &AuditTrailEntry) -> bool {
        incoming.timestamp > self.updated_at
    }
}

impl From<AuditTrailEntry> for StepStatusRecord {
    fn from(entry: AuditTrailEntry) -> Self {
        Self {
            status: entry.status,
            updated_at: entry.timestamp,
            entry,
        }
    }
}

/// Per-application rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrailSummary {
    pub application_id: ApplicationId,
    pub total_entries: usize,
    pub unique_steps: usize,
    pub latest_activity: Option<DateTime<Utc>>,
    pub current_step_statuses: BTreeMap<StepKey, StepStatus>,
    pub overall_status: OverallStatus,
}

/// Projection of one application's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAuditState {
    pub application_id: ApplicationId,
    pub entries: Vec<AuditTrailEntry>,
    pub steps: BTreeMap<StepKey, StepStatusRecord>,
    pub summary: AuditTrailSummary,
}

impl ApplicationAuditState {
    pub fn new(application_id: ApplicationId) -> Self {
        let entries = Vec::new();
        let steps = BTreeMap::new();
        let summary = super::summary::summarize(application_id, &entries, &steps);
        Self {
            application_id,
            entries,
            steps,
            summary,
        }
    }

    /// Rebuild a projection by replaying entries in timestamp order.
    pub fn replay(application_id: ApplicationId, entries: Vec<AuditTrailEntry>) -> Self {
        let mut state = Self::new(application_id);
        for entry in entries {
            state.apply(entry);
        }
        state.recompute_summary();
        state
    }

    /// Record an entry in the log and advance the step projection if the entry is newer.
    ///
    /// Returns `true` when the entry was not already present in the log.
    pub fn apply(&mut self, entry: AuditTrailEntry) -> bool {
        if self
            .entries
            .iter()
            .any(|existing| existing.same_transition(&entry))
        {
            return false;
        }

        match self.steps.get(&entry.step_key) {
            Some(record) if !record.is_superseded_by(&entry) => {}
            _ => {
                self.steps
                    .insert(entry.step_key.clone(), StepStatusRecord::from(entry.clone()));
            }
        }

        let position = self.entries.partition_point(|existing| {
            (existing.timestamp, &existing.step_key) <= (entry.timestamp, &entry.step_key)
        });
        self.entries.insert(position, entry);
        true
    }

    pub fn recompute_summary(&mut self) {
        self.summary = super::summary::summarize(self.application_id, &self.entries, &self.steps);
    }

    pub fn status_of(&self, step_key: &StepKey) -> Option<StepStatus> {
        self.steps.get(step_key).map(|record| record.status)
    }
}
