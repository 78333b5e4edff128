//! Backup primitives taken immediately before destructive mutations.
//!
//! Manifests are copied to `<name>.backup.<YYYYMMDD_HHMMSS>` next to the
//! original; song folders are renamed to `<dir>.deleted_<YYYYMMDD_HHMMSS>`.
//! Both live beside what they protect, so restoring is a rename.

use std::{
    fmt,
    fs,
    path::{Component, Path, PathBuf},
};

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::core::error::{CatalogError, IoResultExt, Result};
use crate::infra::io::{sync_dir, write_new};

pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const MANIFEST_MARKER: &str = ".backup.";
pub const FOLDER_MARKER: &str = ".deleted_";
pub const BEFORE_RESTORE_MARKER: &str = ".before_restore.";

/// Local wall-clock time at second resolution, one per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupStamp(NaiveDateTime);

impl BackupStamp {
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    pub fn parse(s: &str) -> Option<Self> {
        // chrono accepts unpadded fields; require the exact width
        if s.len() != 15 {
            return None;
        }
        NaiveDateTime::parse_from_str(s, STAMP_FORMAT).ok().map(Self)
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for BackupStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

impl Serialize for BackupStamp {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Manifest,
    Folder,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupKind::Manifest => "manifest",
            BackupKind::Folder => "folder",
        })
    }
}

fn with_suffix(path: &Path, marker: &str, stamp: BackupStamp) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!("{marker}{stamp}"));
    path.with_file_name(name)
}

pub fn manifest_backup_path(manifest: &Path, stamp: BackupStamp) -> PathBuf {
    with_suffix(manifest, MANIFEST_MARKER, stamp)
}

pub fn folder_backup_path(dir: &Path, stamp: BackupStamp) -> PathBuf {
    with_suffix(dir, FOLDER_MARKER, stamp)
}

pub fn before_restore_path(manifest: &Path, stamp: BackupStamp) -> PathBuf {
    with_suffix(manifest, BEFORE_RESTORE_MARKER, stamp)
}

/// Copy pre-mutation bytes next to the manifest; never overwrites.
pub fn write_manifest_backup(manifest: &Path, bytes: &[u8], stamp: BackupStamp) -> Result<PathBuf> {
    let dest = manifest_backup_path(manifest, stamp);
    match write_new(&dest, bytes) {
        Ok(()) => {
            debug!(backup = %dest.display(), "manifest backup written");
            Ok(dest)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CatalogError::AlreadyExists(dest)),
        Err(e) => Err(CatalogError::io(&dest, e)),
    }
}

/// Rename a song folder aside. Atomic; never a copy.
pub fn soft_delete_folder(dir: &Path, stamp: BackupStamp) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(CatalogError::NotFound(dir.to_path_buf()));
    }
    let dest = folder_backup_path(dir, stamp);
    if dest.exists() {
        return Err(CatalogError::AlreadyExists(dest));
    }

    fs::rename(dir, &dest).at(dir)?;
    if let Some(parent) = dest.parent() {
        sync_dir(parent).ok();
    }
    info!(from = %dir.display(), to = %dest.display(), "soft-deleted song folder");
    Ok(dest)
}

/// Split a backup file or folder name into kind, original name and stamp.
/// Manifests set aside by a restore count as manifest backups.
pub fn split_backup_name(name: &str) -> Option<(BackupKind, &str, BackupStamp)> {
    for marker in [MANIFEST_MARKER, BEFORE_RESTORE_MARKER] {
        if let Some((orig, stamp)) = name.rsplit_once(marker) {
            let stamp = BackupStamp::parse(stamp)?;
            return (!orig.is_empty()).then_some((BackupKind::Manifest, orig, stamp));
        }
    }
    let (orig, stamp) = name.rsplit_once(FOLDER_MARKER)?;
    let stamp = BackupStamp::parse(stamp)?;
    (!orig.is_empty()).then_some((BackupKind::Folder, orig, stamp))
}

/// Resolve a user-supplied path against the catalog root, refusing to
/// escape it.
pub fn resolve_under_root(root: &Path, p: &Path) -> Result<PathBuf> {
    let rel = if p.is_absolute() {
        p.strip_prefix(root).map_err(|_| escapes(p))?
    } else {
        p
    };

    let mut out = root.to_path_buf();
    let mut pushed = false;
    for c in rel.components() {
        match c {
            Component::Normal(part) => {
                out.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            _ => return Err(escapes(p)),
        }
    }
    if !pushed {
        return Err(CatalogError::InvalidName {
            name: p.display().to_string(),
            reason: "empty path".into(),
        });
    }
    Ok(out)
}

fn escapes(p: &Path) -> CatalogError {
    CatalogError::InvalidName {
        name: p.display().to_string(),
        reason: "path escapes the catalog root".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn stamp() -> BackupStamp {
        BackupStamp::from_datetime(
            NaiveDate::from_ymd_opt(2024, 3, 9)
                .unwrap()
                .and_hms_opt(14, 5, 7)
                .unwrap(),
        )
    }

    #[test]
    fn stamp_format_round_trips() {
        assert_eq!(stamp().to_string(), "20240309_140507");
        assert_eq!(BackupStamp::parse("20240309_140507"), Some(stamp()));
        assert_eq!(BackupStamp::parse("2024039_140507"), None);
        assert_eq!(BackupStamp::parse("garbage"), None);
    }

    #[test]
    fn manifest_backup_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let m = tmp.path().join("songs.dta");
        fs::write(&m, "(a)").unwrap();

        let b = write_manifest_backup(&m, b"(a)", stamp()).unwrap();
        assert_eq!(b.file_name().unwrap(), "songs.dta.backup.20240309_140507");
        assert_eq!(fs::read(&b).unwrap(), b"(a)");

        let err = write_manifest_backup(&m, b"(b)", stamp()).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
        assert_eq!(fs::read(&b).unwrap(), b"(a)");
    }

    #[test]
    fn soft_delete_renames_and_refuses_collision() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("chump");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("chump.mogg"), "x").unwrap();

        let moved = soft_delete_folder(&dir, stamp()).unwrap();
        assert!(!dir.exists());
        assert!(moved.join("chump.mogg").exists());

        fs::create_dir(&dir).unwrap();
        let err = soft_delete_folder(&dir, stamp()).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
        assert!(dir.exists());
    }

    #[test]
    fn splits_backup_names() {
        let (kind, orig, s) = split_backup_name("songs.dta.backup.20240309_140507").unwrap();
        assert_eq!((kind, orig, s), (BackupKind::Manifest, "songs.dta", stamp()));

        let (kind, orig, _) = split_backup_name("my.song.deleted_20240309_140507").unwrap();
        assert_eq!((kind, orig), (BackupKind::Folder, "my.song"));

        let (kind, orig, _) = split_backup_name("songs.dta.before_restore.20240309_140507").unwrap();
        assert_eq!((kind, orig), (BackupKind::Manifest, "songs.dta"));

        assert!(split_backup_name("songs.dta").is_none());
        assert!(split_backup_name("x.backup.notastamp").is_none());
    }

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/lib");
        assert_eq!(
            resolve_under_root(root, Path::new("a/b")).unwrap(),
            PathBuf::from("/lib/a/b")
        );
        assert_eq!(
            resolve_under_root(root, Path::new("/lib/a")).unwrap(),
            PathBuf::from("/lib/a")
        );
        assert!(resolve_under_root(root, Path::new("../etc")).is_err());
        assert!(resolve_under_root(root, Path::new("/etc/passwd")).is_err());
        assert!(resolve_under_root(root, Path::new(".")).is_err());
    }
}
