use std::path::PathBuf;

use clap::Parser;
use sheet_sync::Result;
use sheet_sync::input::{ConfigSource, ParameterSource, PromptSource};
use sheet_sync::io::auth::{CredentialProvider, Credentials, OAuthClient};
use sheet_sync::io::backup::BackupWriter;
use sheet_sync::io::sheets::SheetsClient;
use sheet_sync::logging::init_logging;
use sheet_sync::sync::{DEFAULT_BACKUP_NAME, Orchestrator, RunReport};

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(report) if report.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(error) => {
            println!("An error occurred: {error}");
            println!("Please make sure you have set up your Google Sheets API credentials correctly.");
            println!("Refer to the README.md file for setup instructions.");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    init_logging(cli.log_level.as_deref())?;

    let orchestrator = Orchestrator::new(
        CredentialProvider::new(&cli.credentials_dir, OAuthClient::new()),
        connect,
        BackupWriter::new(&cli.backup_dir),
    )
    .with_backup_name(&cli.backup_name);

    let mut source: Box<dyn ParameterSource> = match &cli.params {
        Some(path) => Box::new(ConfigSource::from_path(path)?),
        None => Box::new(PromptSource::stdio()),
    };
    let report = orchestrator.run(source.as_mut());
    print_report(&report);
    Ok(report)
}

fn connect(credentials: &Credentials) -> SheetsClient {
    SheetsClient::new(credentials.access_token())
}

fn print_report(report: &RunReport) {
    if let Some(failure) = &report.failure {
        println!("{failure}");
        return;
    }
    if let Some(updated) = report.updated_cells {
        println!("{updated} cells updated.");
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    println!("Data processing complete.");
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Deduplicate, sort, and score a spreadsheet range, keeping a local backup."
)]
struct Cli {
    /// JSON file with run parameters; prompts interactively when omitted.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Directory holding credentials.json and token.json.
    #[arg(long, default_value = "credentials")]
    credentials_dir: PathBuf,

    /// Existing directory receiving the CSV backup.
    #[arg(long, default_value = "backups")]
    backup_dir: PathBuf,

    /// Backup file name, without extension.
    #[arg(long, default_value = DEFAULT_BACKUP_NAME)]
    backup_name: String,

    /// Tracing filter directives, e.g. `debug` or `sheet_sync=trace`.
    #[arg(long)]
    log_level: Option<String>,
}
