//! Backup listing, restore and age-based cleanup.
//!
//! Ages come from the stamp embedded in each backup name, never from file
//! modification times, so copying a library around does not reset them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::backup::{BackupKind, BackupStamp, before_restore_path, resolve_under_root, split_backup_name};
use crate::core::error::{CatalogError, IoResultExt, Result};
use crate::infra::io::{dir_size, sync_dir, write_atomic, write_new};
use crate::infra::utils::SizeUtils;
use crate::infra::walk::CatalogWalker;

pub const DEFAULT_CLEANUP_DAYS: u32 = 30;

/// One backup artifact on disk
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    /// What a restore would recreate
    pub original: PathBuf,
    pub kind: BackupKind,
    pub stamp: BackupStamp,
    pub created: NaiveDateTime,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct BackupListing {
    pub root: PathBuf,
    /// Newest first
    pub backups: Vec<BackupInfo>,
    pub manifest_count: usize,
    pub folder_count: usize,
    pub total_size: u64,
}

/// Request structure for restore operations
#[derive(Debug)]
pub struct RestoreRequest {
    pub kind: BackupKind,
    /// Backup path, absolute or relative to the catalog root
    pub path: PathBuf,
    pub dry_run: bool,
}

/// Result of restore operation
#[derive(Debug, Serialize)]
pub struct RestoreResult {
    pub kind: BackupKind,
    pub backup: PathBuf,
    pub restored_to: PathBuf,
    /// Where the replaced manifest was moved
    pub set_aside: Option<PathBuf>,
    pub dry_run: bool,
    pub summary: String,
}

/// Request structure for cleanup operations
#[derive(Debug)]
pub struct CleanupRequest {
    pub older_than_days: u32,
    pub dry_run: bool,
    /// Reference time, local
    pub now: NaiveDateTime,
}

/// Result of cleanup operation
#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub removed: Vec<PathBuf>,
    pub manifests_removed: usize,
    pub folders_removed: usize,
    pub kept: usize,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub summary: String,
}

fn describe(path: &Path) -> Option<BackupInfo> {
    let name = path.file_name()?.to_str()?;
    let (kind, original, stamp) = split_backup_name(name)?;
    Some(BackupInfo {
        path: path.to_path_buf(),
        original: path.with_file_name(original),
        kind,
        stamp,
        created: stamp.datetime(),
        size: dir_size(path),
    })
}

/// Every manifest backup and soft-deleted folder under `root`, newest first.
pub fn scan_backups(root: &Path, walker: &CatalogWalker) -> BackupListing {
    let mut backups: Vec<BackupInfo> = walker
        .walk_backups(root)
        .into_iter()
        .filter_map(|b| describe(&b.path))
        .collect();

    // Stable on equal stamps: keep path order
    backups.sort_by(|a, b| b.stamp.cmp(&a.stamp));

    let manifest_count = backups.iter().filter(|b| b.kind == BackupKind::Manifest).count();
    BackupListing {
        root: root.to_path_buf(),
        manifest_count,
        folder_count: backups.len() - manifest_count,
        total_size: backups.iter().map(|b| b.size).sum(),
        backups,
    }
}

/// Copy the live manifest to `aside`, then write `bytes` over it. The live
/// file is swapped in one rename, so a failed write leaves it as it was; the
/// copy is then dropped again.
fn replace_manifest<W>(target: &Path, aside: Option<&Path>, bytes: &[u8], write: W) -> Result<()>
where
    W: FnOnce(&Path, &[u8]) -> std::io::Result<()>,
{
    if let Some(aside) = aside {
        let current = fs::read(target).at(target)?;
        write_new(aside, &current).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => CatalogError::AlreadyExists(aside.to_path_buf()),
            _ => CatalogError::io(aside, e),
        })?;
    }

    if let Err(e) = write(target, bytes) {
        warn!(manifest = %target.display(), error = %e, "restore write failed, live manifest kept");
        if let Some(aside) = aside {
            fs::remove_file(aside).ok();
        }
        return Err(CatalogError::io(target, e));
    }
    Ok(())
}

/// Put a backup back in place.
///
/// A manifest backup overwrites the live manifest after copying it aside to
/// `<name>.before_restore.<stamp>`; the backup file itself is kept. A folder
/// backup is renamed back and refuses to replace an existing folder.
pub fn restore_backup(root: &Path, req: &RestoreRequest, stamp: BackupStamp) -> Result<RestoreResult> {
    let backup = resolve_under_root(root, &req.path)?;
    let info = describe(&backup).ok_or_else(|| CatalogError::InvalidName {
        name: backup.display().to_string(),
        reason: "not a backup name".into(),
    })?;
    if info.kind != req.kind {
        return Err(CatalogError::InvalidName {
            name: backup.display().to_string(),
            reason: format!("is a {} backup, not a {} backup", info.kind, req.kind),
        });
    }

    let present = match info.kind {
        BackupKind::Manifest => backup.is_file(),
        BackupKind::Folder => backup.is_dir(),
    };
    if !present {
        return Err(CatalogError::NotFound(backup));
    }

    let target = info.original.clone();
    let mut set_aside = None;

    match info.kind {
        BackupKind::Manifest => {
            if target.exists() {
                let aside = before_restore_path(&target, stamp);
                if aside.exists() {
                    return Err(CatalogError::AlreadyExists(aside));
                }
                set_aside = Some(aside);
            }
            if !req.dry_run {
                let bytes = fs::read(&backup).at(&backup)?;
                replace_manifest(&target, set_aside.as_deref(), &bytes, write_atomic)?;
            }
        }
        BackupKind::Folder => {
            if target.exists() {
                return Err(CatalogError::Conflict(target));
            }
            if !req.dry_run {
                fs::rename(&backup, &target).at(&backup)?;
                if let Some(parent) = target.parent() {
                    sync_dir(parent).ok();
                }
            }
        }
    }

    let summary = format!(
        "{}restored {} {} to {}",
        if req.dry_run { "[dry-run] would have " } else { "" },
        info.kind,
        backup.display(),
        target.display()
    );
    if !req.dry_run {
        info!(backup = %backup.display(), target = %target.display(), "backup restored");
    }

    Ok(RestoreResult { kind: info.kind, backup, restored_to: target, set_aside, dry_run: req.dry_run, summary })
}

/// Delete backups whose stamp is older than the cutoff.
pub fn cleanup_backups(root: &Path, walker: &CatalogWalker, req: &CleanupRequest) -> CleanupResult {
    let cutoff = req.now - Duration::days(i64::from(req.older_than_days));
    let listing = scan_backups(root, walker);

    let mut result = CleanupResult {
        removed: Vec::new(),
        manifests_removed: 0,
        folders_removed: 0,
        kept: 0,
        bytes_freed: 0,
        errors: Vec::new(),
        dry_run: req.dry_run,
        summary: String::new(),
    };

    for b in listing.backups {
        if b.created >= cutoff {
            result.kept += 1;
            continue;
        }

        if !req.dry_run {
            let res = match b.kind {
                BackupKind::Manifest => fs::remove_file(&b.path),
                BackupKind::Folder => fs::remove_dir_all(&b.path),
            };
            if let Err(e) = res {
                warn!(path = %b.path.display(), error = %e, "backup cleanup failed");
                result.errors.push(format!("{}: {e}", b.path.display()));
                continue;
            }
        }

        match b.kind {
            BackupKind::Manifest => result.manifests_removed += 1,
            BackupKind::Folder => result.folders_removed += 1,
        }
        result.bytes_freed += b.size;
        result.removed.push(b.path);
    }

    result.summary = format!(
        "{}removed {} manifest backup(s) and {} folder(s) older than {} day(s), freeing {}; {} kept, {} error(s)",
        if req.dry_run { "[dry-run] would have " } else { "" },
        result.manifests_removed,
        result.folders_removed,
        req.older_than_days,
        SizeUtils::format_bytes(result.bytes_freed),
        result.kept,
        result.errors.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn walker() -> CatalogWalker {
        CatalogWalker::new(&[]).unwrap()
    }

    fn seed(root: &Path) {
        let pack = root.join("pack");
        fs::create_dir_all(pack.join("old.deleted_20240101_120000")).unwrap();
        fs::write(pack.join("old.deleted_20240101_120000/old.mogg"), vec![0u8; 10]).unwrap();
        fs::write(pack.join("songs.dta.backup.20240301_120000"), "(new)").unwrap();
        fs::write(pack.join("songs.dta.backup.20231201_120000"), "(older)").unwrap();
        fs::write(pack.join("songs.dta"), "(live)").unwrap();
    }

    #[test]
    fn lists_newest_first() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let listing = scan_backups(tmp.path(), &walker());
        let stamps: Vec<_> = listing.backups.iter().map(|b| b.stamp.to_string()).collect();
        assert_eq!(stamps, vec!["20240301_120000", "20240101_120000", "20231201_120000"]);
        assert_eq!(listing.manifest_count, 2);
        assert_eq!(listing.folder_count, 1);
        assert_eq!(listing.backups[1].size, 10);
        assert_eq!(listing.backups[1].original, tmp.path().join("pack/old"));
    }

    #[test]
    fn cleanup_uses_embedded_stamp() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let req = CleanupRequest { older_than_days: 30, dry_run: false, now: at(2024, 3, 10) };
        let res = cleanup_backups(tmp.path(), &walker(), &req);

        assert_eq!(res.manifests_removed, 1);
        assert_eq!(res.folders_removed, 1);
        assert_eq!(res.kept, 1);
        assert!(res.errors.is_empty());
        assert!(tmp.path().join("pack/songs.dta.backup.20240301_120000").exists());
        assert!(!tmp.path().join("pack/songs.dta.backup.20231201_120000").exists());
        assert!(!tmp.path().join("pack/old.deleted_20240101_120000").exists());
    }

    #[test]
    fn cleanup_dry_run_deletes_nothing() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let req = CleanupRequest { older_than_days: 0, dry_run: true, now: at(2030, 1, 1) };
        let res = cleanup_backups(tmp.path(), &walker(), &req);
        assert_eq!(res.removed.len(), 3);
        assert_eq!(scan_backups(tmp.path(), &walker()).backups.len(), 3);
    }

    #[test]
    fn manifest_restore_sets_current_aside() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let stamp = BackupStamp::from_datetime(at(2024, 3, 10));
        let req = RestoreRequest {
            kind: BackupKind::Manifest,
            path: PathBuf::from("pack/songs.dta.backup.20240301_120000"),
            dry_run: false,
        };
        let res = restore_backup(tmp.path(), &req, stamp).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("pack/songs.dta")).unwrap(), "(new)");
        let aside = res.set_aside.unwrap();
        assert_eq!(aside.file_name().unwrap(), "songs.dta.before_restore.20240310_120000");
        assert_eq!(fs::read_to_string(aside).unwrap(), "(live)");
        assert!(res.backup.exists());
    }

    #[test]
    fn failed_manifest_write_keeps_the_live_file() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let target = tmp.path().join("pack/songs.dta");
        let aside = before_restore_path(&target, BackupStamp::from_datetime(at(2024, 3, 10)));

        let err = replace_manifest(&target, Some(&aside), b"(new)", |_, _| {
            Err(std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"))
        })
        .unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "(live)");
        assert!(!aside.exists());
    }

    #[test]
    fn set_aside_manifests_are_listed_and_cleaned() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        fs::write(tmp.path().join("pack/songs.dta.before_restore.20231101_120000"), "(prev)").unwrap();

        let listing = scan_backups(tmp.path(), &walker());
        assert_eq!(listing.manifest_count, 3);
        let oldest = listing.backups.last().unwrap();
        assert_eq!(oldest.original, tmp.path().join("pack/songs.dta"));

        let req = CleanupRequest { older_than_days: 30, dry_run: false, now: at(2024, 3, 10) };
        let res = cleanup_backups(tmp.path(), &walker(), &req);
        assert_eq!(res.manifests_removed, 2);
        assert!(!tmp.path().join("pack/songs.dta.before_restore.20231101_120000").exists());
    }

    #[test]
    fn folder_restore_renames_back_and_detects_conflict() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let req = RestoreRequest {
            kind: BackupKind::Folder,
            path: tmp.path().join("pack/old.deleted_20240101_120000"),
            dry_run: false,
        };

        fs::create_dir(tmp.path().join("pack/old")).unwrap();
        let err = restore_backup(tmp.path(), &req, BackupStamp::now()).unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        fs::remove_dir(tmp.path().join("pack/old")).unwrap();
        restore_backup(tmp.path(), &req, BackupStamp::now()).unwrap();
        assert!(tmp.path().join("pack/old/old.mogg").exists());
        assert!(!req.path.exists());
    }

    #[test]
    fn restore_errors() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let missing = RestoreRequest {
            kind: BackupKind::Manifest,
            path: PathBuf::from("pack/songs.dta.backup.20200101_000000"),
            dry_run: false,
        };
        assert!(matches!(restore_backup(tmp.path(), &missing, BackupStamp::now()), Err(CatalogError::NotFound(_))));

        let wrong_kind = RestoreRequest {
            kind: BackupKind::Folder,
            path: PathBuf::from("pack/songs.dta.backup.20240301_120000"),
            dry_run: false,
        };
        assert!(matches!(
            restore_backup(tmp.path(), &wrong_kind, BackupStamp::now()),
            Err(CatalogError::InvalidName { .. })
        ));

        let escape = RestoreRequest { kind: BackupKind::Manifest, path: PathBuf::from("../x.backup.20240301_120000"), dry_run: false };
        assert!(restore_backup(tmp.path(), &escape, BackupStamp::now()).is_err());
    }
}
