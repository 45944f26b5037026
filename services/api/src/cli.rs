use crate::report::{run_export, run_report, ExportArgs, ReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use funnel_analytics::config::AppConfig;
use funnel_analytics::error::AppError;
use funnel_analytics::telemetry::{self, LogTarget};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Funnel Analytics",
    about = "Serve and report sales funnel analytics from the command line",
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
    /// Print the funnel dashboard for a window
    Report(ReportArgs),
    /// Write one dashboard table as CSV
    Export(ExportArgs),
}

impl Command {
    /// Report and export write their output to stdout, so their logs go to stderr.
    fn log_target(&self) -> LogTarget {
        match self {
            Command::Serve(_) => LogTarget::Stdout,
            Command::Report(_) | Command::Export(_) => LogTarget::Stderr,
        }
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// SQLite database to serve (overrides FUNNEL_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, command.log_target())?;

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Report(args) => run_report(config, args),
        Command::Export(args) => run_export(config, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_without_subcommand() {
        let cli = Cli::try_parse_from(["funnel-analytics-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn export_requires_known_report() {
        assert!(Cli::try_parse_from([
            "funnel-analytics-api",
            "export",
            "--report",
            "sources",
            "--start-date",
            "2025-01-01",
        ])
        .is_ok());
        assert!(Cli::try_parse_from(["funnel-analytics-api", "export", "--report", "leads"]).is_err());
    }

    #[test]
    fn every_command_logs_and_table_output_keeps_stdout_clean() {
        let parse = |args: &[&str]| {
            Cli::try_parse_from(args.iter().copied())
                .expect("parses")
                .command
                .expect("subcommand given")
        };

        assert_eq!(parse(&["funnel-analytics-api", "serve"]).log_target(), LogTarget::Stdout);
        assert_eq!(parse(&["funnel-analytics-api", "report"]).log_target(), LogTarget::Stderr);
        assert_eq!(
            parse(&["funnel-analytics-api", "export", "--report", "trends"]).log_target(),
            LogTarget::Stderr
        );
    }

    #[test]
    fn report_rejects_malformed_dates() {
        assert!(
            Cli::try_parse_from(["funnel-analytics-api", "report", "--end-date", "03/31/2025"])
                .is_err()
        );
    }
}
