use std::fmt;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::input::ParameterSource;
use crate::io::auth::{Authorizer, CredentialProvider, Credentials};
use crate::io::backup::BackupWriter;
use crate::io::sheets::{SheetGateway, SheetsApi};
use crate::transform::Pipeline;

/// Name of the snapshot written before each remote update.
pub const DEFAULT_BACKUP_NAME: &str = "data_backup";

/// Progress of a single run. `Failed` can follow any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Authenticated,
    DataRead,
    Transformed,
    BackedUp,
    Written,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::Authenticated => "authenticated",
            RunState::DataRead => "data-read",
            RunState::Transformed => "transformed",
            RunState::BackedUp => "backed-up",
            RunState::Written => "written",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Final state: `Done` or `Failed`.
    pub state: RunState,
    /// Last state reached before failing.
    pub failed_after: Option<RunState>,
    /// Human-readable reason for `Failed`.
    pub failure: Option<String>,
    /// Non-fatal problems, such as a rejected remote write.
    pub warnings: Vec<String>,
    pub updated_cells: Option<u64>,
    pub backup_path: Option<PathBuf>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            state: RunState::Init,
            failed_after: None,
            failure: None,
            warnings: Vec::new(),
            updated_cells: None,
            backup_path: None,
        }
    }

    fn advance(&mut self, state: RunState) {
        info!(from = %self.state, to = %state, "run state changed");
        self.state = state;
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(after = %self.state, %message, "run failed");
        self.failed_after = Some(self.state);
        self.state = RunState::Failed;
        self.failure = Some(message);
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }
}

/// Sequences parameter collection, authentication, read, transform, backup,
/// and write-back for one run.
///
/// `connect` turns credentials into the API handle the gateway talks to;
/// nothing about the remote service is held outside a run.
pub struct Orchestrator<A, F> {
    credentials: CredentialProvider<A>,
    connect: F,
    backup: BackupWriter,
    backup_name: String,
}

impl<A, F, S> Orchestrator<A, F>
where
    A: Authorizer,
    F: Fn(&Credentials) -> S,
    S: SheetsApi,
{
    pub fn new(credentials: CredentialProvider<A>, connect: F, backup: BackupWriter) -> Self {
        Self {
            credentials,
            connect,
            backup,
            backup_name: DEFAULT_BACKUP_NAME.to_string(),
        }
    }

    pub fn with_backup_name(mut self, name: impl Into<String>) -> Self {
        self.backup_name = name.into();
        self
    }

    /// Runs to completion. Every failure is captured in the report rather
    /// than returned.
    #[instrument(level = "info", skip_all)]
    pub fn run(&self, source: &mut dyn ParameterSource) -> RunReport {
        let mut report = RunReport::new();

        let params = match source.collect() {
            Ok(params) => params,
            Err(err) => return report.fail(err.to_string()),
        };

        let credentials = match self.credentials.obtain() {
            Ok(credentials) => credentials,
            Err(err) => return report.fail(err.to_string()),
        };
        report.advance(RunState::Authenticated);

        let gateway = SheetGateway::new((self.connect)(&credentials));
        let target = params.target();

        let Some(mut table) = gateway.read(target) else {
            return report.fail("Failed to retrieve data from the sheet.");
        };
        let rows_read = table.len();
        report.advance(RunState::DataRead);

        if let Err(err) = Pipeline::from_params(&params).run(&mut table) {
            return report.fail(err.to_string());
        }
        report.advance(RunState::Transformed);

        match self.backup.backup(&table, &self.backup_name) {
            Ok(path) => report.backup_path = Some(path),
            Err(err) => return report.fail(format!("backup failed: {err}")),
        }
        report.advance(RunState::BackedUp);

        // A rejected write still ends in Done: the backup already holds the result.
        match gateway.write(target, &table, rows_read) {
            Some(updated) => {
                report.updated_cells = Some(updated);
                report.advance(RunState::Written);
            }
            None => {
                let backup = report
                    .backup_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                report.warnings.push(format!(
                    "remote write failed; transformed data is in {backup}"
                ));
            }
        }
        report.advance(RunState::Done);
        report
    }
}
