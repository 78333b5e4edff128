//! Pack merging: validate a request into a plan, then execute it once.
//!
//! Execution copies song folders into a fresh pack and regenerates a manifest
//! from the source entries. Per-song problems drop that song and move on; a
//! failed manifest write removes the new pack entirely. Source deletion runs
//! last and never undoes the merge.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::backup::BackupStamp;
use crate::core::catalog::CatalogSnapshot;
use crate::core::classify::PackType;
use crate::core::error::{CatalogError, IoResultExt, Result};
use crate::core::extract::{canonical_key, entry_key};
use crate::core::mutate::regenerate;
use crate::core::remove::{RemovalReport, RemoveOptions, remove_songs};
use crate::core::target::RemovalTarget;
use crate::infra::io::{copy_dir_all, dir_size, read_manifest, write_new};
use crate::infra::utils::SizeUtils;
use crate::infra::walk::MANIFEST_NAME;
use crate::parsers::dta_parser::{Node, parse};

pub const DEFAULT_LARGE_MERGE_THRESHOLD: usize = 500;

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub target: String,
    pub packs: Vec<String>,
    pub delete_sources: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedSong {
    pub manifest: PathBuf,
    pub song_key: String,
    pub entry_key: String,
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcePack {
    pub label: String,
    pub pack_type: PackType,
    pub title_id: Option<String>,
    pub manifests: Vec<PathBuf>,
    pub songs: Vec<PlannedSong>,
    pub song_count: usize,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub target_name: String,
    pub target_title_id: Option<String>,
    /// `<USRDIR>/<target>/songs`
    pub target_dir: PathBuf,
    pub sources: Vec<SourcePack>,
    pub total_songs: usize,
    pub total_size: u64,
    pub warnings: Vec<String>,
    pub delete_sources: bool,
}

impl MergePlan {
    /// The new pack directory, parent of `target_dir`.
    pub fn pack_dir(&self) -> &Path {
        self.target_dir.parent().unwrap_or(&self.target_dir)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeFailure {
    pub pack: String,
    pub song_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRemoval {
    pub pack: String,
    pub report: RemovalReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub ok: bool,
    pub target_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub merged: Vec<String>,
    pub failed: Vec<MergeFailure>,
    pub bytes_copied: u64,
    pub warnings: Vec<String>,
    pub source_removals: Vec<SourceRemoval>,
    pub summary: String,
}

fn invalid(name: &str, reason: &str) -> CatalogError {
    CatalogError::InvalidName { name: name.to_string(), reason: reason.to_string() }
}

/// USRDIR ancestor of a manifest, if any.
fn usrdir_of(manifest: &Path) -> Option<&Path> {
    manifest.ancestors().find(|a| a.file_name().is_some_and(|n| n == "USRDIR"))
}

/// Check a merge request against the catalog. Never writes.
#[instrument(level = "debug", skip(snapshot), fields(target = %request.target))]
pub fn validate(snapshot: &CatalogSnapshot, request: &MergeRequest, large_merge_threshold: usize) -> Result<MergePlan> {
    let labels: Vec<&String> = request
        .packs
        .iter()
        .unique_by(|p| p.to_lowercase())
        .collect();
    if labels.len() < 2 {
        return Err(CatalogError::InsufficientPacks { got: labels.len() });
    }

    let name = request.target.as_str();
    if name.trim().is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid(name, "name contains whitespace"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(invalid(name, "name contains a path separator"));
    }
    if snapshot.pack(name).is_some() {
        return Err(invalid(name, "a pack with this name already exists"));
    }

    let mut sources = Vec::with_capacity(labels.len());
    for label in labels {
        let pack = snapshot
            .pack(label)
            .ok_or_else(|| CatalogError::UnknownPack(label.clone()))?;

        let songs: Vec<PlannedSong> = snapshot
            .records_in_pack(&pack.label)
            .map(|r| PlannedSong {
                manifest: r.source_file.clone(),
                song_key: r.song_key.clone(),
                entry_key: r.entry_key.clone(),
                folder: r.song_dir(),
            })
            .collect();
        let size: u64 = songs.iter().map(|s| dir_size(&s.folder)).sum();

        sources.push(SourcePack {
            label: pack.label,
            pack_type: pack.pack_type,
            title_id: pack.title_id,
            manifests: pack.manifests,
            song_count: songs.len(),
            songs,
            size,
        });
    }

    let target_dir = sources
        .first()
        .and_then(|s| s.manifests.first())
        .and_then(|m| usrdir_of(m))
        .unwrap_or(snapshot.root.as_path())
        .join(name)
        .join("songs");
    if target_dir.parent().is_some_and(Path::exists) {
        return Err(invalid(name, "target directory already exists"));
    }

    let mut warnings = Vec::new();
    let target_title_id = sources[0].title_id.clone();
    let title_ids: Vec<&str> = sources
        .iter()
        .filter_map(|s| s.title_id.as_deref())
        .unique()
        .collect();
    if title_ids.len() > 1 {
        warnings.push(format!(
            "packs span several title ids ({}); using {}",
            title_ids.join(", "),
            target_title_id.as_deref().unwrap_or("none")
        ));
    }

    let repeated = sources
        .iter()
        .flat_map(|s| s.songs.iter().map(|song| song.song_key.as_str()).unique())
        .duplicates()
        .count();
    if repeated > 0 {
        warnings.push(format!(
            "{repeated} song key(s) appear in more than one pack; only the first copy is merged"
        ));
    }

    let total_songs: usize = sources.iter().map(|s| s.song_count).sum();
    let total_size: u64 = sources.iter().map(|s| s.size).sum();
    if total_songs > large_merge_threshold {
        warnings.push(format!(
            "{total_songs} songs exceeds the recommended {large_merge_threshold} per pack"
        ));
    }

    Ok(MergePlan {
        target_name: name.to_string(),
        target_title_id,
        target_dir,
        sources,
        total_songs,
        total_size,
        warnings,
        delete_sources: request.delete_sources,
    })
}

/// Parsed nodes per manifest, read once.
struct NodeCache {
    nodes: HashMap<PathBuf, Vec<Node>>,
}

impl NodeCache {
    /// Entry written as `written`, else the first with the same canonical key.
    fn entry(&mut self, manifest: &Path, written: &str) -> Result<Option<Node>> {
        if !self.nodes.contains_key(manifest) {
            let bytes = read_manifest(manifest)?;
            self.nodes.insert(manifest.to_path_buf(), parse(bytes.as_ref()));
        }
        let song_key = canonical_key(written);
        Ok(self.nodes.get(manifest).and_then(|nodes| {
            nodes
                .iter()
                .find(|n| entry_key(n) == Some(written))
                .or_else(|| {
                    nodes
                        .iter()
                        .find(|n| entry_key(n).is_some_and(|k| canonical_key(k) == song_key))
                })
                .cloned()
        }))
    }
}

/// Execute a validated plan.
#[instrument(level = "debug", skip(plan), fields(target = %plan.target_name))]
pub fn execute(plan: &MergePlan, stamp: BackupStamp) -> Result<MergeReport> {
    let pack_dir = plan.pack_dir().to_path_buf();
    if pack_dir.exists() {
        return Err(CatalogError::AlreadyExists(pack_dir));
    }
    fs::create_dir_all(&plan.target_dir).at(&plan.target_dir)?;

    let mut cache = NodeCache { nodes: HashMap::new() };
    let mut entries = Vec::new();
    let mut merged = Vec::new();
    let mut merged_keys: HashSet<String> = HashSet::new();
    let mut merged_by_pack: Vec<Vec<&PlannedSong>> = Vec::new();
    let mut failed = Vec::new();
    let mut bytes_copied = 0u64;

    for source in &plan.sources {
        let mut done = Vec::new();
        for song in &source.songs {
            let fail = |reason: String| MergeFailure {
                pack: source.label.clone(),
                song_key: song.song_key.clone(),
                reason,
            };

            if merged_keys.contains(&song.song_key) {
                failed.push(fail(format!("song key '{}' already merged from another pack", song.song_key)));
                continue;
            }

            let node = match cache.entry(&song.manifest, &song.entry_key) {
                Ok(Some(node)) => node,
                Ok(None) => {
                    failed.push(fail("entry no longer in manifest".into()));
                    continue;
                }
                Err(e) => {
                    failed.push(fail(e.to_string()));
                    continue;
                }
            };

            let folder_name = song.folder.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(&song.entry_key));
            let dest = plan.target_dir.join(folder_name);
            if dest.exists() {
                failed.push(fail(format!("folder name collision: {}", dest.display())));
                continue;
            }
            if !song.folder.is_dir() {
                failed.push(fail(format!("song folder missing: {}", song.folder.display())));
                continue;
            }

            match copy_dir_all(&song.folder, &dest) {
                Ok(n) => {
                    bytes_copied += n;
                    entries.push(node);
                    merged_keys.insert(song.song_key.clone());
                    merged.push(song.song_key.clone());
                    done.push(song);
                }
                Err(e) => {
                    warn!(song = %song.song_key, error = %e, "copy failed");
                    fs::remove_dir_all(&dest).ok();
                    failed.push(fail(format!("copy failed: {e}")));
                }
            }
        }
        merged_by_pack.push(done);
    }

    let manifest = plan.target_dir.join(MANIFEST_NAME);
    if merged.is_empty() {
        fs::remove_dir_all(&pack_dir).ok();
        return Ok(MergeReport {
            ok: false,
            target_dir: plan.target_dir.clone(),
            manifest: None,
            merged,
            failed,
            bytes_copied: 0,
            warnings: plan.warnings.clone(),
            source_removals: Vec::new(),
            summary: "nothing merged; target pack removed".into(),
        });
    }

    if let Err(source) = write_new(&manifest, regenerate(&entries).as_bytes()) {
        warn!(manifest = %manifest.display(), error = %source, "manifest write failed, rolling back");
        fs::remove_dir_all(&pack_dir).ok();
        return Err(CatalogError::ManifestWrite { path: manifest, source });
    }
    info!(songs = merged.len(), bytes = bytes_copied, "merged pack written");

    let mut source_removals = Vec::new();
    if plan.delete_sources {
        for (source, done) in plan.sources.iter().zip(&merged_by_pack) {
            if done.is_empty() {
                continue;
            }
            let mut targets: Vec<RemovalTarget> = Vec::new();
            for (manifest, songs) in &done.iter().chunk_by(|s| s.manifest.clone()) {
                targets.push(RemovalTarget::new(manifest, songs.map(|s| s.entry_key.clone()).collect()));
            }
            let report = remove_songs(targets, RemoveOptions::default(), stamp);
            if !report.ok {
                warn!(pack = %source.label, "source removal reported no removals");
            }
            source_removals.push(SourceRemoval { pack: source.label.clone(), report });
        }
    }

    let summary = format!(
        "merged {} song(s) into '{}' ({}), {} failed",
        merged.len(),
        plan.target_name,
        SizeUtils::format_bytes(bytes_copied),
        failed.len()
    );

    Ok(MergeReport {
        ok: true,
        target_dir: plan.target_dir.clone(),
        manifest: Some(manifest),
        merged,
        failed,
        bytes_copied,
        warnings: plan.warnings.clone(),
        source_removals,
        summary,
    })
}
