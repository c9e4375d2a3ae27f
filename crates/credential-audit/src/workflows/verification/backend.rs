use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    ApplicationId, AuditTrailEntry, StepDetail, StepKey, StepPriority, StepStatus, StepType,
    VerificationResult,
};

/// Request recorded when a verification step begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartStepRequest {
    pub application_id: ApplicationId,
    pub step_name: StepKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<StepPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
}

/// Request recorded when a verification step reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteStepRequest {
    pub application_id: ApplicationId,
    pub step_name: StepKey,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<StepDetail>,
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
    pub processed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
}

/// Remote source of truth for verification audit trails.
///
/// The contract is append-only: there is no update or delete operation. Reads return
/// entries in ascending timestamp order.
#[async_trait]
pub trait VerificationBackend: Send + Sync + 'static {
    async fn start_step(&self, request: StartStepRequest) -> Result<AuditTrailEntry, NetworkError>;

    async fn complete_step(
        &self,
        request: CompleteStepRequest,
    ) -> Result<AuditTrailEntry, NetworkError>;

    async fn list_audit_trail(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<AuditTrailEntry>, NetworkError>;

    async fn current_step_statuses(
        &self,
        application_id: ApplicationId,
    ) -> Result<BTreeMap<StepKey, StepStatus>, NetworkError>;
}

/// Transport or remote failures while talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid response from remote: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    /// HTTP status the failure maps to when relayed by a service.
    pub fn http_status(&self) -> u16 {
        match self {
            NetworkError::Rejected { status, .. } => *status,
            NetworkError::Unavailable(_) => 503,
            NetworkError::Transport(_) | NetworkError::InvalidResponse(_) => 502,
        }
    }
}
