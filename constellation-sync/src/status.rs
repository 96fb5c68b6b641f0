//! JSON status record emitted after each aggregate run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collect::SkippedSource;
use crate::error::{io_err, SyncError};
use crate::manifest::write_json_atomic;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub sources_scanned: usize,
    pub files_scanned: usize,
    pub collected: usize,
    pub deployed: usize,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub duplicates: usize,
    pub merges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Hub name.
    pub id: String,
    /// Unique per run; equals the deploy backup id when one was taken.
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub state: String,
    pub counts: StatusCounts,
    pub backup: Option<String>,
    #[serde(default)]
    pub skipped: Vec<SkippedSource>,
}

/// Write `record` atomically to `path`.
pub fn write(path: &Path, record: &StatusRecord) -> Result<(), SyncError> {
    write_json_atomic(path, record)?;
    tracing::info!(path = %path.display(), state = %record.state, "status written");
    Ok(())
}

/// Read the last status record, if any.
pub fn read(path: &Path) -> Result<Option<StatusRecord>, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
