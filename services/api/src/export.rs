use crate::infra::http_backend;
use clap::Args;
use credential_audit::config::AppConfig;
use credential_audit::error::AppError;
use credential_audit::workflows::verification::{
    ApplicationId, AuditTrailExporter, StepRegistry, VerificationBackend,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct AuditExportArgs {
    /// Application whose audit trail should be exported
    #[arg(long)]
    pub(crate) application_id: u64,
    /// Destination CSV file (defaults to stdout)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Override APP_BACKEND_URL for this export
    #[arg(long)]
    pub(crate) backend_url: Option<String>,
}

pub(crate) async fn run_audit_export(args: AuditExportArgs) -> Result<(), AppError> {
    let AuditExportArgs {
        application_id,
        output,
        backend_url,
    } = args;

    let config = AppConfig::load()?;
    let backend = http_backend(&config.backend, backend_url)?;
    let registry = StepRegistry::standard();

    let entries = backend
        .list_audit_trail(ApplicationId(application_id))
        .await?;

    let rows = match output {
        Some(path) => {
            let rows = AuditTrailExporter::to_path(&path, &entries, &registry)?;
            eprintln!(
                "Exported {} audit entries for application {} to {}",
                rows,
                application_id,
                path.display()
            );
            rows
        }
        None => AuditTrailExporter::to_writer(std::io::stdout().lock(), &entries, &registry)?,
    };

    if rows == 0 {
        eprintln!("No audit entries recorded for application {}", application_id);
    }
    Ok(())
}
