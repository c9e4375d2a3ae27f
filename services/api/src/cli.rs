use crate::demo::{run_demo, DemoArgs};
use crate::export::{run_audit_export, AuditExportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use credential_audit::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Credential Audit",
    about = "Serve and inspect verification-step audit trails for provider credentialing",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with audit trails held by a remote verification service
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Walk an application through the standard verification steps in-process
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Export an application's audit trail as CSV
    Export(AuditExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Audit {
            command: AuditCommand::Export(args),
        } => run_audit_export(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["credential-audit-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn audit_export_parses_application_and_output() {
        let cli = Cli::try_parse_from([
            "credential-audit-api",
            "audit",
            "export",
            "--application-id",
            "12345",
            "--output",
            "trail.csv",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Audit {
                command: AuditCommand::Export(args),
            }) => {
                assert_eq!(args.application_id, 12345);
                assert_eq!(
                    args.output.as_deref(),
                    Some(std::path::Path::new("trail.csv"))
                );
                assert!(args.backend_url.is_none());
            }
            other => panic!("expected audit export, got {other:?}"),
        }
    }
}
