use crate::report::{run_compliance_report, run_requirement, ComplianceReportArgs, RequirementArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use stewardship::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Stewardship Compliance",
    about = "Serve or query collection-site compliance for stewardship programs",
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
    /// Print a compliance report for a dataset directory
    Report(ComplianceReportArgs),
    /// Print the required site count for a population
    Requirement(RequirementArgs),
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
        Command::Report(args) => run_compliance_report(args),
        Command::Requirement(args) => run_requirement(args),
    }
}
