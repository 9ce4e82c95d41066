use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::error::{Result, SyncError};
use crate::model::Table;

/// Extension used for backup snapshots.
pub const BACKUP_EXTENSION: &str = "csv";

/// Persists table snapshots as CSV files inside a fixed directory.
///
/// The directory is never created implicitly; a missing directory is an
/// error so that a mistyped path cannot silently scatter backups.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    dir: PathBuf,
}

impl BackupWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the snapshot called `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{BACKUP_EXTENSION}"))
    }

    /// Writes header and rows to `<dir>/<name>.csv`, replacing any earlier
    /// snapshot of the same name. The file is written beside the target and
    /// renamed into place.
    #[instrument(level = "info", skip(self, table), fields(dir = %self.dir.display()))]
    pub fn backup(&self, table: &Table, name: &str) -> Result<PathBuf> {
        if !self.dir.is_dir() {
            return Err(SyncError::MissingBackupDir(self.dir.clone()));
        }

        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.{BACKUP_EXTENSION}.tmp"));

        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &path)?;
        info!(path = %path.display(), rows = table.len(), "backup written");
        Ok(path)
    }
}
