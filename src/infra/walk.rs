//! Catalog walker for manifests and backups.
//! - VCS ignore files are irrelevant to game folders and stay disabled
//! - Extra ignore globs (early prune + late filter)
//! - Optional hidden file policy, following symlinks, and max depth
//! - Soft-deleted song folders are never descended into
//! - Deterministic ordering for stable scans and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

use crate::core::backup::{BackupKind, FOLDER_MARKER, split_backup_name};

/// Manifest file name, matched case-insensitively
pub const MANIFEST_NAME: &str = "songs.dta";

/// A backup artifact found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry
{
    pub path: PathBuf,
    pub kind: BackupKind,
}

#[derive(Debug, Clone)]
pub struct CatalogWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Include hidden (dot) entries; default true
    include_hidden: bool,

    /// Follow symbolic links; default false
    follow_symlinks: bool,

    /// Maximum recursion depth; default None (unbounded)
    max_depth: Option<usize>,
}

impl CatalogWalker
{
    /// Build a walker with additional ignore patterns (e.g. "**/temp/**").
    /// Patterns match on paths relative to the walk root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            include_hidden: true,
            follow_symlinks: false,
            max_depth: None,
        })
    }

    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_follow_symlinks(
        mut self,
        follow: bool,
    ) -> Self
    {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // WalkBuilder::hidden(true) skips dotfiles
        b.hidden(!self.include_hidden);

        // Game folders carry no VCS metadata worth honouring
        b.ignore(false);
        b.git_ignore(false);
        b.git_global(false);
        b.git_exclude(false);
        b.parents(false);

        b.follow_links(self.follow_symlinks);
        b.max_depth(self.max_depth);

        // Early pruning: extra ignores, and never descend below a
        // soft-deleted folder (the folder itself is still yielded)
        let extra = self
            .ignore_patterns
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());

            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if is_dir && extra.is_match(rel)
            {
                return false;
            }

            !inside_deleted(rel)
        });

        b
    }

    /// Every entry under `root` except the root itself, sorted.
    fn walk_entries(
        &self,
        root: &Path,
    ) -> Vec<DirEntry>
    {
        let mut out: Vec<DirEntry> = self
            .build_walk(root)
            .build()
            // Drop entries with IO errors
            .filter_map(|res| res.ok())
            .filter(|e| e.depth() > 0)
            // Late extra ignore filtering on the RELATIVE path
            .filter(|e| {
                let rel = e
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(e.path());
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort_by(|a, b| {
            a.path()
                .cmp(b.path())
        });
        out
    }

    /// All `songs.dta` manifests under `root`, sorted.
    pub fn walk_manifests<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        self.walk_entries(root.as_ref())
            .into_iter()
            .filter(|e| {
                e.file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.eq_ignore_ascii_case(MANIFEST_NAME))
            })
            .map(|e| e.into_path())
            .collect()
    }

    /// Manifest backups and soft-deleted folders under `root`, sorted.
    pub fn walk_backups<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<BackupEntry>
    {
        self.walk_entries(root.as_ref())
            .into_iter()
            .filter_map(|e| {
                let name = e
                    .file_name()
                    .to_str()?;
                let (kind, _, _) = split_backup_name(name)?;
                let is_dir = e
                    .file_type()
                    .is_some_and(|ft| ft.is_dir());

                // A manifest backup is a file, a folder backup a directory
                match (kind, is_dir)
                {
                    (BackupKind::Manifest, false) | (BackupKind::Folder, true) => Some(BackupEntry {
                        path: e.into_path(),
                        kind,
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

/// True when some ancestor of `rel` (not `rel` itself) is a soft-deleted folder.
fn inside_deleted(rel: &Path) -> bool
{
    rel.parent()
        .map(|parent| {
            parent
                .components()
                .any(|c| {
                    c.as_os_str()
                        .to_str()
                        .is_some_and(|s| s.contains(FOLDER_MARKER) && split_backup_name(s).is_some())
                })
        })
        .unwrap_or(false)
}
