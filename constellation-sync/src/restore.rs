//! Restore a deployment target from a backup.
//!
//! The chosen backup's files are redeployed as if they were a collection with
//! provenance `backup:<id>`. The current state is snapshotted first
//! (`-pre-restore`), so a restore can itself be undone.

use chrono::{DateTime, Utc};

use constellation_core::{Config, Layout, OriginId};

use crate::backup::{self, Backup, BackupReason};
use crate::collect::{self, SkippedSource, Source};
use crate::collection::Collection;
use crate::confirm::Confirm;
use crate::deploy::{self, DeployReport};
use crate::error::{partial_deployment, SyncError};
use crate::manifest::{self, DeployManifest};

/// Result of [`restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The prompt was declined; nothing changed.
    Declined { backup_id: String },
    Restored {
        backup_id: String,
        /// Snapshot of the target taken just before restoring.
        pre_restore: Backup,
        report: DeployReport,
        skipped: Vec<SkippedSource>,
    },
}

/// Replace the target's file set with the contents of backup `id`.
pub fn restore(
    layout: &Layout,
    config: &Config,
    id: &str,
    now: DateTime<Utc>,
    confirm: &dyn Confirm,
) -> Result<RestoreOutcome, SyncError> {
    let chosen = backup::load(&layout.backups_dir, id)?;

    let prompt = format!(
        "Restore {} file(s) from backup {} into {}?",
        chosen.meta.files.len(),
        chosen.id(),
        layout.target_dir.display()
    );
    if !confirm.confirm(&prompt) {
        tracing::info!(backup = %id, "restore declined");
        return Ok(RestoreOutcome::Declined {
            backup_id: id.to_string(),
        });
    }

    let pre_restore = backup::create(
        &layout.backups_dir,
        &layout.target_dir,
        BackupReason::PreRestore,
        now,
    )?;

    let scan = collect::scan_dir(
        &Source {
            origin: OriginId::backup(chosen.id()),
            dir: chosen.files_dir(),
        },
        config,
    );
    let collection = Collection::from_source_entries(scan.entries);
    let report = deploy::deploy(&layout.target_dir, collection.files(), config, &pre_restore)
        .map_err(partial_deployment(pre_restore.id()))?;

    manifest::save(
        &layout.manifest_path,
        &DeployManifest::from_files(collection.files(), pre_restore.id(), now),
    )
    .map_err(partial_deployment(pre_restore.id()))?;

    tracing::info!(
        backup = %chosen.id(),
        pre_restore = %pre_restore.id(),
        written = report.written(),
        removed = report.removed(),
        "restore complete"
    );
    Ok(RestoreOutcome::Restored {
        backup_id: chosen.id().to_string(),
        pre_restore,
        report,
        skipped: scan.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AssumeNo, AssumeYes};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn hub(tmp: &TempDir) -> (Layout, Config) {
        let config = Config::default();
        fs::create_dir_all(tmp.path().join(&config.hub).join(&config.scripts_dir)).unwrap();
        let layout = Layout::resolve(tmp.path(), &config).unwrap();
        (layout, config)
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn restore_brings_back_backed_up_files() {
        let tmp = TempDir::new().unwrap();
        let (layout, config) = hub(&tmp);
        fs::write(layout.target_dir.join("keep.sh"), "v1\n").unwrap();
        let snapshot =
            backup::create(&layout.backups_dir, &layout.target_dir, BackupReason::Deploy, at(1))
                .unwrap();

        fs::write(layout.target_dir.join("keep.sh"), "v2\n").unwrap();
        fs::write(layout.target_dir.join("extra.sh"), "x\n").unwrap();

        let outcome = restore(&layout, &config, snapshot.id(), at(2), &AssumeYes).unwrap();
        let RestoreOutcome::Restored { pre_restore, .. } = outcome else {
            panic!("expected restore to proceed");
        };
        assert_eq!(pre_restore.id(), "20260501T020000Z-pre-restore");
        assert_eq!(fs::read_to_string(layout.target_dir.join("keep.sh")).unwrap(), "v1\n");
        assert!(!layout.target_dir.join("extra.sh").exists());

        let manifest = manifest::load(&layout.manifest_path).unwrap().unwrap();
        assert_eq!(
            manifest.files["keep.sh"].provenance,
            vec![OriginId::backup(snapshot.id())]
        );
    }

    #[test]
    fn declined_restore_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (layout, config) = hub(&tmp);
        fs::write(layout.target_dir.join("keep.sh"), "v1\n").unwrap();
        let snapshot =
            backup::create(&layout.backups_dir, &layout.target_dir, BackupReason::Deploy, at(1))
                .unwrap();
        fs::write(layout.target_dir.join("keep.sh"), "v2\n").unwrap();

        let outcome = restore(&layout, &config, snapshot.id(), at(2), &AssumeNo).unwrap();
        assert!(matches!(outcome, RestoreOutcome::Declined { .. }));
        assert_eq!(fs::read_to_string(layout.target_dir.join("keep.sh")).unwrap(), "v2\n");
        assert_eq!(backup::list(&layout.backups_dir).unwrap().len(), 1);
    }

    #[test]
    fn unknown_backup_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let (layout, config) = hub(&tmp);
        let err = restore(&layout, &config, "20200101T000000Z", at(2), &AssumeYes).unwrap_err();
        assert!(matches!(err, SyncError::BackupNotFound { .. }));
    }
}
