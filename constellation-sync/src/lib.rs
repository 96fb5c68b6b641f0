//! # constellation-sync
//!
//! Script aggregation engine: collect, fingerprint, deduplicate and merge,
//! back up, deploy. Also restore, validation, status, diff previews, size
//! monitoring and seed harvesting.
//!
//! Call [`run_aggregate`] for a full run; every step is also public on its own.

pub mod backup;
pub mod collect;
pub mod collection;
pub mod confirm;
pub mod deploy;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod restore;
pub mod seeds;
pub mod size;
pub mod status;
pub mod validate;

pub use backup::{Backup, BackupMeta, BackupReason};
pub use collection::{AggregateStats, CollectedFile, Collection, FileKind};
pub use confirm::{AssumeNo, AssumeYes, Confirm};
pub use deploy::{DeployReport, WriteResult};
pub use error::SyncError;
pub use pipeline::{run_aggregate, AggregateOptions, AggregateReport, Phase};
pub use restore::{restore, RestoreOutcome};
pub use validate::{validate, ValidationReport};
