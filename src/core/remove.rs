//! Song removal: manifest entries out, song folders soft-deleted.
//!
//! Each manifest is handled independently. A failure on one file is recorded
//! against its keys and the batch moves on.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::backup::{BackupStamp, soft_delete_folder};
use crate::core::mutate::{ManifestRemoval, RemovedEntry, remove_entries};
use crate::core::target::{RemovalTarget, group_targets};
use crate::infra::io::dir_size;
use crate::infra::utils::SizeUtils;

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Leave song folders in place, only edit manifests
    pub keep_folders: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalStatus {
    Removed,
    NotFound,
    Failed,
}

/// Outcome for one requested key.
#[derive(Debug, Clone, Serialize)]
pub struct SongRemoval {
    pub manifest: PathBuf,
    pub key: String,
    pub status: RemovalStatus,
    pub folder_backup: Option<PathBuf>,
    pub bytes: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    pub ok: bool,
    pub dry_run: bool,
    pub songs: Vec<SongRemoval>,
    pub manifests: Vec<ManifestRemoval>,
    pub removed: usize,
    pub failed: usize,
    pub bytes_freed: u64,
    pub summary: String,
}

/// Folder for an entry: the written key first, the canonical key second.
pub fn song_folder(manifest: &Path, entry: &RemovedEntry) -> Option<PathBuf> {
    let base = manifest.parent()?;
    [&entry.entry_key, &entry.song_key]
        .into_iter()
        .map(|k| base.join(k))
        .find(|p| p.is_dir())
}

/// Remove every target, one stamp for the whole batch.
pub fn remove_songs(targets: Vec<RemovalTarget>, opts: RemoveOptions, stamp: BackupStamp) -> RemovalReport {
    let mut songs = Vec::new();
    let mut manifests = Vec::new();

    for target in group_targets(targets) {
        match remove_entries(&target.manifest, &target.keys, stamp, opts.dry_run) {
            Ok(outcome) => {
                for entry in &outcome.removed {
                    songs.push(remove_folder(&target.manifest, entry, opts, stamp));
                }
                for key in &outcome.missing {
                    songs.push(SongRemoval {
                        manifest: target.manifest.clone(),
                        key: key.clone(),
                        status: RemovalStatus::NotFound,
                        folder_backup: None,
                        bytes: 0,
                        error: Some(format!("entry '{key}' not found")),
                    });
                }
                manifests.push(outcome);
            }
            Err(e) => {
                warn!(manifest = %target.manifest.display(), error = %e, "manifest removal failed");
                for key in &target.keys {
                    songs.push(SongRemoval {
                        manifest: target.manifest.clone(),
                        key: key.clone(),
                        status: RemovalStatus::Failed,
                        folder_backup: None,
                        bytes: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
    }

    let removed = songs.iter().filter(|s| s.status == RemovalStatus::Removed).count();
    let failed = songs.len() - removed;
    let bytes_freed = songs.iter().map(|s| s.bytes).sum();

    let summary = format!(
        "{}removed {removed} song(s), {failed} failed, {} in song folders",
        if opts.dry_run { "[dry-run] would have " } else { "" },
        SizeUtils::format_bytes(bytes_freed)
    );
    info!(removed, failed, bytes_freed, "removal finished");

    RemovalReport { ok: removed > 0, dry_run: opts.dry_run, songs, manifests, removed, failed, bytes_freed, summary }
}

fn remove_folder(manifest: &Path, entry: &RemovedEntry, opts: RemoveOptions, stamp: BackupStamp) -> SongRemoval {
    let mut out = SongRemoval {
        manifest: manifest.to_path_buf(),
        key: entry.song_key.clone(),
        status: RemovalStatus::Removed,
        folder_backup: None,
        bytes: 0,
        error: None,
    };
    if opts.keep_folders {
        return out;
    }

    let Some(dir) = song_folder(manifest, entry) else {
        warn!(key = %entry.song_key, "no song folder next to manifest");
        return out;
    };
    out.bytes = dir_size(&dir);

    if opts.dry_run {
        return out;
    }

    // The manifest edit already landed; a folder failure only loses the
    // soft-delete, so the song still counts as removed
    match soft_delete_folder(&dir, stamp) {
        Ok(backup) => out.folder_backup = Some(backup),
        Err(e) => {
            warn!(folder = %dir.display(), error = %e, "soft-delete failed");
            out.bytes = 0;
            out.error = Some(e.to_string());
        }
    }
    out
}
