use tracing_subscriber::EnvFilter;

use crate::error::{Result, SyncError};

/// Installs the global tracing subscriber, writing to stderr so stdout only
/// carries progress lines. An explicit `filter` wins over `RUST_LOG`; the
/// fallback level is `info`.
pub fn init_logging(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|err| SyncError::Logging(err.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| SyncError::Logging(err.to_string()))
}
