use crate::infra::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use credential_audit::error::AppError;
use credential_audit::workflows::verification::{
    verification_router, ApplicationAuditState, ApplicationId, AuditTrailSummary,
    VerificationBackend,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) const SUMMARY_PATH: &str =
    "/api/v1/verification/applications/{application_id}/summary";

pub(crate) fn with_service_routes<B>(backend: Arc<B>) -> Router
where
    B: VerificationBackend,
{
    let summaries = Router::new()
        .route(SUMMARY_PATH, get(summary_endpoint::<B>))
        .with_state(Arc::clone(&backend));

    verification_router(backend)
        .merge(summaries)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Aggregate computed server-side by replaying the stored audit trail.
pub(crate) async fn summary_endpoint<B>(
    State(backend): State<Arc<B>>,
    Path(application_id): Path<u64>,
) -> Result<Json<AuditTrailSummary>, AppError>
where
    B: VerificationBackend,
{
    let application_id = ApplicationId(application_id);
    let entries = backend.list_audit_trail(application_id).await?;
    let state = ApplicationAuditState::replay(application_id, entries);
    Ok(Json(state.summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use credential_audit::workflows::verification::{
        AuditLedger, OverallStatus, StartStepRequest, StepKey,
    };
    use tower::ServiceExt;

    fn start(step: &str) -> StartStepRequest {
        StartStepRequest {
            application_id: ApplicationId(12345),
            step_name: StepKey::from(step),
            reasoning: None,
            request_data: None,
            processed_by: None,
            priority: None,
            step_type: None,
        }
    }

    #[tokio::test]
    async fn summary_endpoint_replays_stored_trail() {
        let ledger = Arc::new(AuditLedger::default());
        ledger
            .start_step(start("license_verification"))
            .await
            .expect("start");
        ledger.start_step(start("npdb_query")).await.expect("start");

        let Json(summary) = summary_endpoint::<AuditLedger>(State(ledger), Path(12345))
            .await
            .expect("summary builds");

        assert_eq!(summary.total_entries, 2);
        assert_eq!(summary.unique_steps, 2);
        assert_eq!(summary.overall_status, OverallStatus::InProgress);
    }

    #[tokio::test]
    async fn health_route_is_mounted_beside_contract_routes() {
        let router = with_service_routes(Arc::new(AuditLedger::default()));
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
