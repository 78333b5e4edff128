//! Manifest and song-folder I/O: mapped reads, atomic writes, recursive copy.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;

use crate::core::error::{IoResultExt, Result};

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Raw manifest bytes, mapped for large files.
pub enum ManifestBytes {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl AsRef<[u8]> for ManifestBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            ManifestBytes::Mapped(mmap) => mmap,
            ManifestBytes::Buffered(buf) => buf,
        }
    }
}

impl ManifestBytes {
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            ManifestBytes::Mapped(mmap) => mmap.to_vec(),
            ManifestBytes::Buffered(buf) => buf,
        }
    }
}

pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<ManifestBytes> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).at(path)?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path).at(path)?;

        // Safety: read-only map; mutations always go through write_atomic,
        // which replaces the file rather than writing into it
        let mmap = unsafe { Mmap::map(&file) }.at(path)?;
        Ok(ManifestBytes::Mapped(mmap))
    } else {
        Ok(ManifestBytes::Buffered(fs::read(path).at(path)?))
    }
}

/// Replace `path` with `data` via a same-directory temp file.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?,
    };

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms)?;
    }

    match tmp.persist(path) {
        Ok(_) => {}
        Err(e) => {
            // Different filesystem: copy fallback
            fs::copy(e.file.path(), path)?;
        }
    }

    sync_dir(dir).ok();
    Ok(())
}

/// Write a file that must not exist yet.
pub fn write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(data)?;
    f.sync_all()
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
pub fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_p: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Total size of regular files under `path`; a plain file counts itself.
/// Unreadable entries are skipped.
pub fn dir_size(path: &Path) -> u64 {
    fn visit(dir: &Path, total: &mut u64) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let Ok(md) = entry.metadata() else {
                continue;
            };
            if md.is_dir() {
                visit(&entry.path(), total);
            } else {
                *total += md.len();
            }
        }
    }

    match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => {
            let mut total = 0;
            visit(path, &mut total);
            total
        }
        Ok(md) => md.len(),
        Err(_) => 0,
    }
}

/// Recursively copy `src` into a new directory `dst`. Returns bytes copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<u64> {
    fs::create_dir(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&from, &to)?;
        } else {
            copied += fs::copy(&from, &to)?;
        }
    }
    Ok(copied)
}
