use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
use super::domain::{ApplicationId, StepStatus};
use super::store::ValidationError;

pub const START_STEP_PATH: &str = "/api/v1/verification/steps/start";
pub const COMPLETE_STEP_PATH: &str = "/api/v1/verification/steps/complete";
pub const AUDIT_TRAIL_PATH: &str = "/api/v1/verification/applications/{application_id}/audit-trail";
pub const STEP_STATUSES_PATH: &str =
    "/api/v1/verification/applications/{application_id}/step-statuses";

/// Router exposing the remote persistence contract over HTTP.
pub fn verification_router<B>(backend: Arc<B>) -> Router
where
    B: VerificationBackend,
{
    Router::new()
        .route(START_STEP_PATH, post(start_step_handler::<B>))
        .route(COMPLETE_STEP_PATH, post(complete_step_handler::<B>))
        .route(AUDIT_TRAIL_PATH, get(audit_trail_handler::<B>))
        .route(STEP_STATUSES_PATH, get(step_statuses_handler::<B>))
        .with_state(backend)
}

/// Completion payload as received; `status` is parsed by hand so bad values map to 422.
#[derive(Debug, Deserialize)]
pub(crate) struct CompleteStepPayload {
    status: String,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl CompleteStepPayload {
    fn into_request(self) -> Result<CompleteStepRequest, ValidationError> {
        let status = StepStatus::parse(&self.status)
            .ok_or_else(|| ValidationError::UnknownStatus(self.status.clone()))?;
        if !status.is_terminal() {
            return Err(ValidationError::NonTerminalStatus(status));
        }

        let mut fields: serde_json::Map<String, Value> = self.rest.into_iter().collect();
        fields.insert("status".to_string(), json!(status));
        if !fields.contains_key("application_id") {
            return Err(ValidationError::MissingField("application_id"));
        }
        if !fields.contains_key("step_name") {
            return Err(ValidationError::MissingField("step_name"));
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|_| ValidationError::MissingField("well-formed completion payload"))
    }
}

pub(crate) async fn start_step_handler<B>(
    State(backend): State<Arc<B>>,
    Json(request): Json<StartStepRequest>,
) -> Response
where
    B: VerificationBackend,
{
    match backend.start_step(request).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(error) => network_error_response(error),
    }
}

pub(crate) async fn complete_step_handler<B>(
    State(backend): State<Arc<B>>,
    Json(payload): Json<CompleteStepPayload>,
) -> Response
where
    B: VerificationBackend,
{
    let request = match payload.into_request() {
        Ok(request) => request,
        Err(error) => {
            let body = json!({ "error": error.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
        }
    };

    match backend.complete_step(request).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(error) => network_error_response(error),
    }
}

pub(crate) async fn audit_trail_handler<B>(
    State(backend): State<Arc<B>>,
    Path(application_id): Path<u64>,
) -> Response
where
    B: VerificationBackend,
{
    match backend.list_audit_trail(ApplicationId(application_id)).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => network_error_response(error),
    }
}

pub(crate) async fn step_statuses_handler<B>(
    State(backend): State<Arc<B>>,
    Path(application_id): Path<u64>,
) -> Response
where
    B: VerificationBackend,
{
    match backend
        .current_step_statuses(ApplicationId(application_id))
        .await
    {
        Ok(statuses) => (StatusCode::OK, Json(statuses)).into_response(),
        Err(error) => network_error_response(error),
    }
}

fn network_error_response(error: NetworkError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match &error {
        NetworkError::Rejected { message, .. } => message.clone(),
        other => other.to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
}
