use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use credential_audit::workflows::verification::{
    verification_router, ApplicationId, AuditLedger, AuditTrailExporter, ClientConfig,
    CompleteStepOptions, CompleteStepRequest, HttpVerificationBackend, NetworkError,
    OverallStatus, StartStepOptions, StepKey, StepRegistry, StepStatus, VerificationBackend,
    VerificationClient, VerificationError, VerificationResult,
};

const APPLICATION: ApplicationId = ApplicationId(12345);

async fn spawn_ledger_server() -> (String, Arc<AuditLedger>) {
    let ledger = Arc::new(AuditLedger::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let router = verification_router(Arc::clone(&ledger));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server runs");
    });
    (format!("http://{addr}"), ledger)
}

fn http_client(base_url: &str) -> VerificationClient<HttpVerificationBackend> {
    let backend = HttpVerificationBackend::new(base_url, Duration::from_secs(5))
        .expect("http backend builds");
    VerificationClient::new(
        Arc::new(backend),
        Arc::new(StepRegistry::standard()),
        ClientConfig {
            auto_sync: true,
            sync_interval: Duration::from_secs(30),
        },
    )
}

#[tokio::test]
async fn client_round_trips_through_http_contract() {
    let (base_url, ledger) = spawn_ledger_server().await;
    let client = http_client(&base_url);

    let started = client
        .start_step(APPLICATION, "license_verification", StartStepOptions::default())
        .await
        .expect("start over http");
    assert_eq!(started.status, StepStatus::InProgress);

    let mut options = CompleteStepOptions::new(StepStatus::Completed);
    options.verification_result = Some(VerificationResult::Verified);
    options.confidence_score = Some(98);
    let completed = client
        .complete_step(APPLICATION, "license_verification", options)
        .await
        .expect("complete over http");
    assert_eq!(completed.entry.previous_status, Some(StepStatus::InProgress));
    assert_eq!(ledger.entry_count(APPLICATION), 2);

    let state = client.refresh_steps(APPLICATION).await.expect("refresh");
    assert_eq!(state.entries.len(), 2);
    assert_eq!(state.summary.overall_status, OverallStatus::Completed);

    let summary = client.refresh_summary(APPLICATION).await;
    assert_eq!(summary.total_entries, 2);
    assert!(client.status().error.is_none());
}

#[tokio::test]
async fn remote_validation_is_relayed_as_rejection() {
    let (base_url, _ledger) = spawn_ledger_server().await;
    let backend = HttpVerificationBackend::new(&base_url, Duration::from_secs(5))
        .expect("http backend builds");

    let request = CompleteStepRequest {
        application_id: APPLICATION,
        step_name: StepKey::from("npdb_query"),
        status: StepStatus::InProgress,
        reasoning: None,
        response_data: None,
        verification_result: None,
        confidence_score: None,
        processing_duration_ms: None,
        risk_flags: Vec::new(),
        compliance_checks: BTreeMap::new(),
        error_code: None,
        error_message: None,
        processing_method: None,
        processed_by: None,
        step_type: None,
    };

    match backend.complete_step(request).await {
        Err(NetworkError::Rejected { status: 422, message }) => {
            assert!(message.contains("in_progress"), "message was {message}");
        }
        other => panic!("expected 422 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_backend_surfaces_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = http_client(&format!("http://{addr}"));
    let error = client
        .start_step(APPLICATION, "npdb_query", StartStepOptions::default())
        .await
        .expect_err("nothing is listening");

    assert!(matches!(error, VerificationError::Network(_)));
    assert!(client.status().error.is_some());
    assert!(client.get_step_status(APPLICATION, "npdb_query").is_none());
}

#[tokio::test]
async fn refreshed_timeline_exports_as_csv() {
    let (base_url, ledger) = spawn_ledger_server().await;
    let writer_client = http_client(&base_url);
    writer_client
        .start_step(APPLICATION, "sanctions_screening", StartStepOptions::default())
        .await
        .expect("start");
    let mut options = CompleteStepOptions::new(StepStatus::Failed);
    options.error_code = Some("SAM_MATCH".to_string());
    writer_client
        .complete_step(APPLICATION, "sanctions_screening", options)
        .await
        .expect("complete");

    let reader_client = http_client(&base_url);
    reader_client
        .refresh_steps(APPLICATION)
        .await
        .expect("refresh");
    let timeline = reader_client.timeline(APPLICATION);
    assert_eq!(timeline, {
        let mut entries = ledger.entries(APPLICATION);
        entries.reverse();
        entries
    });

    let mut buffer = Vec::new();
    let rows = AuditTrailExporter::to_writer(&mut buffer, &timeline, reader_client.registry())
        .expect("export");
    assert_eq!(rows, 2);
    let csv = String::from_utf8(buffer).expect("utf8");
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("SAM_MATCH"));
}
