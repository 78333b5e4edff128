//! Directory scan: manifests to an immutable catalog snapshot.
//!
//! Manifests are parsed in parallel; record order is manifest path order,
//! then entry order within each manifest, so two scans of an unchanged root
//! produce identical snapshots (apart from the generation time).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::classify::{PackType, classify};
use crate::core::error::{IoResultExt, Result};
use crate::core::extract::{SongRecord, extract_all};
use crate::infra::io::read_manifest;
use crate::infra::walk::CatalogWalker;
use crate::parsers::dta_parser::parse;

/// Per-manifest summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub path: PathBuf,
    pub pack_name: String,
    pub pack_type: PackType,
    pub title_id: Option<String>,
    pub song_count: usize,
    /// Manifest size in bytes
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Songs grouped by pack label.
#[derive(Debug, Clone, Serialize)]
pub struct PackSummary {
    pub label: String,
    pub pack_type: PackType,
    pub title_id: Option<String>,
    pub manifests: Vec<PathBuf>,
    pub song_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub root: PathBuf,
    pub generated_at: DateTime<Local>,
    pub records: Vec<SongRecord>,
    pub sources: Vec<SourceSummary>,
}

impl CatalogSnapshot {
    /// Packs in order of first appearance.
    pub fn packs(&self) -> IndexMap<String, PackSummary> {
        let mut packs: IndexMap<String, PackSummary> = IndexMap::new();
        for src in &self.sources {
            let pack = packs
                .entry(src.pack_name.clone())
                .or_insert_with(|| PackSummary {
                    label: src.pack_name.clone(),
                    pack_type: src.pack_type,
                    title_id: src.title_id.clone(),
                    manifests: Vec::new(),
                    song_count: 0,
                });
            pack.manifests.push(src.path.clone());
            pack.song_count += src.song_count;
        }
        packs
    }

    /// Case-insensitive pack lookup.
    pub fn pack(&self, label: &str) -> Option<PackSummary> {
        self.packs()
            .into_values()
            .find(|p| p.label.eq_ignore_ascii_case(label))
    }

    pub fn records_in_pack<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a SongRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.pack_name.eq_ignore_ascii_case(label))
    }

    pub fn records_in_manifest<'a>(&'a self, manifest: &'a Path) -> impl Iterator<Item = &'a SongRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.source_file == manifest)
    }

    pub fn total_songs(&self) -> usize {
        self.records.len()
    }
}

/// Parse one manifest into records plus its summary.
pub fn scan_manifest(path: &Path) -> Result<(Vec<SongRecord>, SourceSummary)> {
    let bytes = read_manifest(path)?;
    let meta = std::fs::metadata(path).at(path)?;

    let pack = classify(path);
    let records: Vec<SongRecord> = extract_all(&parse(bytes.as_ref()))
        .into_iter()
        .map(|r| r.with_pack(&pack, path))
        .collect();

    let summary = SourceSummary {
        path: path.to_path_buf(),
        pack_name: pack.label().to_string(),
        pack_type: pack.pack_type,
        title_id: pack.title_id.clone(),
        song_count: records.len(),
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Local>::from),
    };
    debug!(manifest = %path.display(), songs = records.len(), "manifest scanned");
    Ok((records, summary))
}

/// Scan every manifest under `root`.
pub fn scan(root: &Path, walker: &CatalogWalker) -> CatalogSnapshot {
    scan_with_progress(root, walker, &ProgressBar::hidden())
}

#[instrument(level = "debug", skip(walker, progress), fields(root = %root.display()))]
pub fn scan_with_progress(root: &Path, walker: &CatalogWalker, progress: &ProgressBar) -> CatalogSnapshot {
    let manifests = walker.walk_manifests(root);
    progress.set_length(manifests.len() as u64);

    // Order preserved by collect
    let scanned: Vec<Option<(Vec<SongRecord>, SourceSummary)>> = manifests
        .par_iter()
        .map(|path| {
            let out = match scan_manifest(path) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(manifest = %path.display(), error = %e, "skipping unreadable manifest");
                    None
                }
            };
            progress.inc(1);
            out
        })
        .collect();
    progress.finish_and_clear();

    let mut records = Vec::new();
    let mut sources = Vec::new();
    for (recs, summary) in scanned.into_iter().flatten() {
        records.extend(recs);
        sources.push(summary);
    }

    CatalogSnapshot { root: root.to_path_buf(), generated_at: Local::now(), records, sources }
}
