//! Error types for constellation-sync.

use std::path::PathBuf;

use thiserror::Error;

use constellation_core::ConfigError;

/// All errors that can arise from aggregation, backup and deployment.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fatal configuration problem (missing root, hub, malformed config).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (manifest, status, backup metadata).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (seed output).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The pre-deployment snapshot could not be written; nothing was deployed.
    #[error("backup {id} failed: {source}")]
    BackupFailed {
        id: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Deployment stopped after the target was partly rewritten.
    /// `backup` holds the target as it was before this run.
    #[error(
        "deployment interrupted, the target may be partly updated; \
         run `constellation restore {backup}` to roll back: {source}"
    )]
    PartialDeployment {
        backup: String,
        #[source]
        source: Box<SyncError>,
    },

    /// No backup with this id exists under the backup root.
    #[error("backup '{id}' not found; run `constellation restore list`")]
    BackupNotFound { id: String },

    /// The id does not start with a `YYYYMMDDTHHMMSSZ` timestamp.
    #[error("invalid backup id '{id}': expected YYYYMMDDTHHMMSSZ[-reason]")]
    InvalidBackupId { id: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Wraps a failure that happened after `backup_id` was taken.
pub(crate) fn partial_deployment(backup_id: &str) -> impl FnOnce(SyncError) -> SyncError + '_ {
    move |source| SyncError::PartialDeployment {
        backup: backup_id.to_string(),
        source: Box::new(source),
    }
}
