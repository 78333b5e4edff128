//! One catalog root plus its settings. Every mutation goes through here so it
//! runs under the catalog lock; scans and listings never take it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use tracing::{debug, instrument};

use crate::core::backup::{BackupStamp, resolve_under_root};
use crate::core::backup_ops::{
    BackupListing, CleanupRequest, CleanupResult, RestoreRequest, RestoreResult, cleanup_backups, restore_backup,
    scan_backups,
};
use crate::core::catalog::{CatalogSnapshot, scan_with_progress};
use crate::core::duplicates::{Deduplicated, DuplicateGroup, dedupe, find_duplicates};
use crate::core::error::Result;
use crate::core::merge::{self, MergePlan, MergeReport, MergeRequest};
use crate::core::mutate::{FieldValue, PatchOutcome, patch_entry};
use crate::core::remove::{RemovalReport, RemoveOptions, remove_songs};
use crate::core::target::RemovalTarget;
use crate::infra::config::Config;
use crate::infra::io::dir_size;
use crate::infra::lock::MutationLock;
use crate::infra::utils::PathUtils;
use crate::infra::walk::CatalogWalker;

#[derive(Debug)]
pub struct Library {
    root: PathBuf,
    walker: CatalogWalker,
    config: Config,
}

impl Library {
    /// Open `root`, falling back to `config.catalog_root`, then `.`.
    pub fn open(root: Option<&Path>, config: Config) -> anyhow::Result<Self> {
        let raw = root
            .map(Path::to_path_buf)
            .or_else(|| config.catalog_root.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let root = PathUtils::expand(&raw);
        anyhow::ensure!(root.is_dir(), "catalog root {} is not a directory", root.display());

        let walker = CatalogWalker::new(&config.scan.ignore_patterns)
            .context("invalid scan.ignore_patterns")?
            .with_follow_symlinks(config.scan.follow_symlinks)
            .with_include_hidden(config.scan.include_hidden);

        debug!(root = %root.display(), "library opened");
        Ok(Self { root, walker, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock(&self) -> Result<MutationLock> {
        MutationLock::acquire(&self.root, Duration::from_secs(self.config.lock.stale_after_secs))
    }

    pub fn scan(&self) -> CatalogSnapshot {
        self.scan_with_progress(&ProgressBar::hidden())
    }

    pub fn scan_with_progress(&self, progress: &ProgressBar) -> CatalogSnapshot {
        scan_with_progress(&self.root, &self.walker, progress)
    }

    /// Duplicate groups, sized by the song folders on disk.
    pub fn duplicates(&self, snapshot: &CatalogSnapshot) -> Vec<DuplicateGroup> {
        find_duplicates(&snapshot.records, |r| {
            let dir = r.song_dir();
            if dir.is_dir() { dir_size(&dir) } else { 0 }
        })
    }

    /// The snapshot's records with duplicates collapsed.
    pub fn dedupe(&self, snapshot: &CatalogSnapshot) -> Deduplicated {
        dedupe(&snapshot.records)
    }

    /// Removal targets for canonical song keys found anywhere in the catalog.
    /// Keys that match nothing come back separately.
    pub fn targets_for_songs(&self, snapshot: &CatalogSnapshot, keys: &[String]) -> (Vec<RemovalTarget>, Vec<String>) {
        let mut by_manifest: IndexMap<PathBuf, Vec<String>> = IndexMap::new();
        let mut missing = Vec::new();
        for key in keys {
            let hits: Vec<_> = snapshot
                .records
                .iter()
                .filter(|r| r.song_key == *key)
                .collect();
            if hits.is_empty() {
                missing.push(key.clone());
            }
            for r in hits {
                by_manifest
                    .entry(r.source_file.clone())
                    .or_default()
                    .push(r.entry_key.clone());
            }
        }
        let targets = by_manifest
            .into_iter()
            .map(|(manifest, keys)| RemovalTarget::new(manifest, keys))
            .collect();
        (targets, missing)
    }

    #[instrument(level = "debug", skip(self, targets))]
    pub fn remove(&self, targets: Vec<RemovalTarget>, opts: RemoveOptions) -> Result<RemovalReport> {
        let targets = targets
            .into_iter()
            .map(|t| Ok(RemovalTarget::new(resolve_under_root(&self.root, &t.manifest)?, t.keys)))
            .collect::<Result<Vec<_>>>()?;

        let _guard = if opts.dry_run { None } else { Some(self.lock()?) };
        Ok(remove_songs(targets, opts, BackupStamp::now()))
    }

    pub fn patch(
        &self,
        manifest: &Path,
        key: &str,
        fields: &IndexMap<String, FieldValue>,
        dry_run: bool,
    ) -> Result<PatchOutcome> {
        let manifest = resolve_under_root(&self.root, manifest)?;
        let _guard = if dry_run { None } else { Some(self.lock()?) };
        patch_entry(&manifest, key, fields, BackupStamp::now(), dry_run)
    }

    pub fn validate_merge(&self, snapshot: &CatalogSnapshot, request: &MergeRequest) -> Result<MergePlan> {
        merge::validate(snapshot, request, self.config.merge.large_merge_threshold)
    }

    pub fn execute_merge(&self, plan: &MergePlan) -> Result<MergeReport> {
        let _guard = self.lock()?;
        merge::execute(plan, BackupStamp::now())
    }

    pub fn backups(&self) -> BackupListing {
        scan_backups(&self.root, &self.walker)
    }

    pub fn restore(&self, req: &RestoreRequest) -> Result<RestoreResult> {
        let _guard = if req.dry_run { None } else { Some(self.lock()?) };
        restore_backup(&self.root, req, BackupStamp::now())
    }

    /// Age-based cleanup; `days` defaults to `cleanup.days`.
    pub fn cleanup(&self, days: Option<u32>, dry_run: bool) -> Result<CleanupResult> {
        let req = CleanupRequest {
            older_than_days: days.unwrap_or(self.config.cleanup.days),
            dry_run,
            now: BackupStamp::now().datetime(),
        };
        let _guard = if dry_run { None } else { Some(self.lock()?) };
        Ok(cleanup_backups(&self.root, &self.walker, &req))
    }
}
