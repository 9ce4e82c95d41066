use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type covering every way a synchronisation run can fail.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the CSV backup writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Raised when credentials cannot be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Raised when the spreadsheet API rejects or fails a call.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Raised when a raw cell grid cannot be turned into a table.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Raised by the dedupe, sort, and score stages.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Raised while collecting run parameters.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Raised when the backup directory is missing.
    #[error("backup directory not found: {0}")]
    MissingBackupDir(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Failures of the credential provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable token and no client secret to start an authorization flow.
    #[error("client secret not found at {0}; see the README for setup instructions")]
    MissingClientSecret(PathBuf),

    /// The client secret file exists but is not an OAuth client definition.
    #[error("invalid client secret file: {0}")]
    InvalidClientSecret(String),

    /// The token endpoint refused a refresh.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// The interactive authorization flow failed.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The token file could not be read or written.
    #[error("token store error at {path}: {reason}")]
    Store { path: PathBuf, reason: String },
}

/// Failures talking to the spreadsheet API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The API answered with a non-success status.
    #[error("spreadsheet API returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("malformed API response: {0}")]
    Decode(String),
}

/// Failures building a table out of a raw cell grid.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    /// The grid contained no rows, so there is no header.
    #[error("cell grid is empty; expected a header row")]
    Empty,

    /// A data row has more cells than the header has columns.
    #[error("row {row} has {cells} cells but the header has {columns} columns")]
    RaggedRow {
        row: usize,
        cells: usize,
        columns: usize,
    },

    /// Two header cells carry the same name.
    #[error("duplicate column name '{0}' in header")]
    DuplicateColumn(String),
}

/// Failures of the table transform stages.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    /// A stage referenced a column the table does not have.
    #[error("{stage}: unknown column '{column}'")]
    UnknownColumn { stage: &'static str, column: String },

    /// A scored cell could not be coerced to a number.
    #[error("score: column '{column}' row {row} holds non-numeric value '{value}'")]
    NonNumericValue {
        column: String,
        row: usize,
        value: String,
    },

    /// A weighted column whose score column would collide with the total.
    #[error("score: weighted column '{column}' would overwrite '{reserved}'")]
    ReservedColumn {
        column: String,
        reserved: &'static str,
    },
}

/// Failures collecting run parameters.
#[derive(Debug, Error)]
pub enum InputError {
    /// A weight did not parse as a floating-point number.
    #[error("invalid weight '{value}' for column '{column}'")]
    InvalidWeight { column: String, value: String },

    /// Input ended before a required field was answered.
    #[error("input ended before '{0}' was provided")]
    UnexpectedEof(&'static str),

    /// The prompt stream failed.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// A parameter file could not be parsed.
    #[error("invalid parameter file: {0}")]
    Config(String),
}
