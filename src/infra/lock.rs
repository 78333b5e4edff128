//! Catalog-wide mutation lock.
//!
//! A `.dtacat.lock` file at the catalog root, created with create-new
//! semantics and removed on drop. A lock older than the stale threshold is
//! assumed abandoned by a crashed process and taken over once.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::error::{CatalogError, Result};

pub const LOCK_FILE_NAME: &str = ".dtacat.lock";
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// Held for the duration of one mutation.
#[derive(Debug)]
pub struct MutationLock {
    path: PathBuf,
    file: File,
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        let _ = self.file.sync_all();
        let _ = fs::remove_file(&self.path);
    }
}

impl MutationLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquire(root: &Path, stale_after: Duration) -> Result<Self> {
        let lock_path = root.join(LOCK_FILE_NAME);

        match create(&lock_path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CatalogError::io(&lock_path, e)),
        }

        let stale = fs::metadata(&lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age > stale_after);

        if !stale {
            return Err(CatalogError::Locked(lock_path));
        }

        warn!(lock = %lock_path.display(), "removing stale catalog lock");
        if fs::remove_file(&lock_path).is_err() {
            return Err(CatalogError::Locked(lock_path));
        }
        create(&lock_path).map_err(|e| match e.kind() {
            // Someone else won the race after the stale cleanup
            std::io::ErrorKind::AlreadyExists => CatalogError::Locked(lock_path.clone()),
            _ => CatalogError::io(&lock_path, e),
        })
    }
}

fn create(lock_path: &Path) -> std::io::Result<MutationLock> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)?;
    writeln!(file, "pid={}", std::process::id()).ok();
    file.sync_all().ok();
    debug!(lock = %lock_path.display(), "catalog lock acquired");
    Ok(MutationLock { path: lock_path.to_path_buf(), file })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_drop() {
        let tmp = TempDir::new().unwrap();
        let lock = MutationLock::acquire(tmp.path(), DEFAULT_STALE_AFTER).unwrap();
        assert!(lock.path().exists());

        let err = MutationLock::acquire(tmp.path(), DEFAULT_STALE_AFTER).unwrap_err();
        assert!(matches!(err, CatalogError::Locked(_)));

        drop(lock);
        assert!(!tmp.path().join(LOCK_FILE_NAME).exists());
        MutationLock::acquire(tmp.path(), DEFAULT_STALE_AFTER).unwrap();
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LOCK_FILE_NAME), "pid=1\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let lock = MutationLock::acquire(tmp.path(), Duration::from_millis(1)).unwrap();
        let body = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(body.trim(), format!("pid={}", std::process::id()));
    }
}
