use chrono::Utc;
use clap::Args;
use credential_audit::config::AppConfig;
use credential_audit::error::AppError;
use credential_audit::workflows::verification::registry::SANCTIONS_SCREENING;
use credential_audit::workflows::verification::{
    ApplicationId, AuditLedger, CompleteStepOptions, StartStepOptions, StepDetail,
    StepPriority, StepRegistry, StepStatus, StepType, VerificationClient, VerificationResult,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Application identifier used for the walk-through
    #[arg(long, default_value_t = 12345)]
    pub(crate) application_id: u64,
    /// Simulate an exclusion-list hit during sanctions screening
    #[arg(long)]
    pub(crate) fail_sanctions: bool,
    /// Print the full audit timeline after the step overview
    #[arg(long)]
    pub(crate) timeline: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        application_id,
        fail_sanctions,
        timeline,
    } = args;
    let application_id = ApplicationId(application_id);
    let config = AppConfig::load()?;

    let client = VerificationClient::new(
        Arc::new(AuditLedger::default()),
        Arc::new(StepRegistry::standard()),
        config.sync.client_config(),
    );

    println!("Credentialing verification demo (application {application_id})");
    if client.auto_sync() {
        println!("Background sync every {}s", client.sync_interval().as_secs());
    } else {
        println!("Background sync disabled");
    }
    if let Err(error) = client.watch(application_id) {
        eprintln!("background sync unavailable: {error}");
    }

    let mut pending: Vec<&'static str> = client
        .registry()
        .definitions()
        .iter()
        .map(|step| step.key)
        .collect();

    loop {
        let ready: Vec<&'static str> = pending
            .iter()
            .copied()
            .filter(|key| client.can_start_step(application_id, key))
            .collect();
        if ready.is_empty() {
            break;
        }

        for key in ready {
            client
                .start_step(
                    application_id,
                    key,
                    StartStepOptions {
                        processed_by: Some("demo-agent".to_string()),
                        priority: Some(StepPriority::Normal),
                        ..StartStepOptions::default()
                    },
                )
                .await?;
            let options = demo_outcome(
                client.registry().step_type_of(key),
                fail_sanctions && key == SANCTIONS_SCREENING,
            );
            let record = client.complete_step(application_id, key, options).await?;
            println!(
                "- {} -> {}",
                client.registry().display_name_of(key),
                record.status.label()
            );
            pending.retain(|pending_key| *pending_key != key);
        }
    }

    if !pending.is_empty() {
        println!("\nBlocked steps (dependencies not completed):");
        for key in &pending {
            let blockers: Vec<String> = client
                .registry()
                .dependencies_of(key)
                .into_iter()
                .filter(|dependency| !client.is_step_completed(application_id, dependency.as_str()))
                .map(|dependency| dependency.to_string())
                .collect();
            println!(
                "  - {} (waiting on {})",
                client.registry().display_name_of(key),
                blockers.join(", ")
            );
        }
    }

    println!("\nStep overview");
    for row in client.step_overview(application_id) {
        println!(
            "  {:<36} {:<16} can start: {}",
            row.display_name,
            row.status_label,
            if row.can_start { "yes" } else { "no" }
        );
    }

    let summary = client.refresh_summary(application_id).await;
    println!(
        "\nSummary: {} entries across {} steps | overall {}",
        summary.total_entries,
        summary.unique_steps,
        summary.overall_status.label()
    );
    if let Some(latest) = summary.latest_activity {
        println!("  Latest activity: {}", latest.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    if timeline {
        println!("\nAudit timeline (newest first)");
        for view in client.timeline_views(application_id) {
            let previous = view.previous_status_label.unwrap_or("-");
            println!(
                "  {} | {} | {} -> {} | by {}",
                view.timestamp.format("%H:%M:%S%.3f"),
                view.step_label,
                previous,
                view.status_label,
                view.changed_by
            );
            if let Some(result) = view.result_label {
                println!(
                    "      result {} (confidence {})",
                    result,
                    view.confidence_score
                        .map(|score| score.to_string())
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
            if let Some(error) = &view.error_detail {
                println!("      error {}", error);
            }
            if !view.risk_flags.is_empty() {
                println!("      risk flags: {}", view.risk_flags.join(", "));
            }
        }
    }

    client.teardown();
    Ok(())
}

fn demo_outcome(step_type: StepType, fail: bool) -> CompleteStepOptions {
    let mut options = CompleteStepOptions::new(StepStatus::Completed);
    options.verification_result = Some(VerificationResult::Verified);
    options.confidence_score = Some(96);
    options.processing_duration_ms = Some(1_850);
    options.processing_method = Some("primary_source".to_string());
    options.processed_by = Some("demo-agent".to_string());

    options.detail = match step_type {
        StepType::License => Some(StepDetail::License {
            license_number: Some("MD-44821".to_string()),
            issuing_state: Some("OR".to_string()),
            expires_on: Some(Utc::now().date_naive() + chrono::Duration::days(400)),
            disciplinary_actions: Vec::new(),
        }),
        StepType::Sanctions => Some(StepDetail::Sanctions {
            lists_checked: vec!["OIG LEIE".to_string(), "SAM".to_string()],
            matches: if fail {
                vec!["OIG LEIE".to_string()]
            } else {
                Vec::new()
            },
        }),
        StepType::Malpractice => Some(StepDetail::Malpractice {
            reports_found: 0,
            open_claims: 0,
        }),
        StepType::Education => Some(StepDetail::Education {
            institution: "Oregon Health & Science University".to_string(),
            degree: Some("MD".to_string()),
            graduation_year: Some(2012),
        }),
        _ => None,
    };

    if fail {
        options.status = StepStatus::Failed;
        options.verification_result = Some(VerificationResult::Discrepancy);
        options.confidence_score = Some(99);
        options.risk_flags = vec!["exclusion_match".to_string()];
        options.error_code = Some("EXCLUSION_MATCH".to_string());
        options.error_message = Some("provider appears on the OIG exclusion list".to_string());
    }

    options
}
