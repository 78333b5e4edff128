//! Read-only commands: `scan` and `duplicates`.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, DuplicatesArgs, ScanArgs};
use crate::core::catalog::CatalogSnapshot;
use crate::core::library::Library;
use crate::infra::config::load_config;
use crate::infra::utils::{PathUtils, SizeUtils};

/// Open the catalog named by `--root` or the config.
pub fn open_library(ctx: &AppContext) -> Result<Library> {
    let config = load_config()?;
    Library::open(ctx.root.as_deref(), config).context("Failed to open catalog")
}

/// Styled text for stdout; plain when `--no-color` is set or stdout is not
/// a terminal.
pub fn paint<T: std::fmt::Display>(text: T, style: Style) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.style(style))
        .to_string()
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Scan with a progress bar unless quiet or emitting JSON.
pub fn scan_catalog(lib: &Library, ctx: &AppContext, json: bool) -> CatalogSnapshot {
    let pb = if ctx.quiet || json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} manifests")
        {
            pb.set_style(style);
        }
        pb
    };
    lib.scan_with_progress(&pb)
}

#[derive(Tabled)]
struct PackRow {
    #[tabled(rename = "Pack")]
    label: String,
    #[tabled(rename = "Type")]
    pack_type: String,
    #[tabled(rename = "Title ID")]
    title_id: String,
    #[tabled(rename = "Songs")]
    songs: usize,
    #[tabled(rename = "Manifests")]
    manifests: usize,
}

#[derive(Tabled)]
struct SongRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Artist")]
    artist: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Album")]
    album: String,
    #[tabled(rename = "Year")]
    year: String,
    #[tabled(rename = "Pack")]
    pack: String,
}

#[instrument(skip_all)]
pub fn scan(args: ScanArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let snapshot = scan_catalog(&lib, ctx, args.json);

    if let Some(pack) = &args.pack {
        anyhow::ensure!(snapshot.pack(pack).is_some(), "unknown pack '{pack}'");
    }
    let deduped = args.dedupe.then(|| lib.dedupe(&snapshot));
    let all = deduped
        .as_ref()
        .map_or(snapshot.records.as_slice(), |d| d.kept.as_slice());
    let records: Vec<_> = all
        .iter()
        .filter(|r| {
            args.pack
                .as_deref()
                .is_none_or(|p| r.pack_name.eq_ignore_ascii_case(p))
        })
        .collect();

    if args.json {
        return match (&deduped, args.pack.is_some()) {
            (_, true) => print_json(&records),
            (Some(d), false) => print_json(&json!({
                "root": snapshot.root,
                "generated_at": snapshot.generated_at,
                "total_songs": d.kept.len(),
                "records": d.kept,
                "sources": snapshot.sources,
                "deduplicated": {
                    "total_dropped": d.dropped.len(),
                    "dropped_songs": d.dropped,
                },
            })),
            (None, false) => print_json(&snapshot),
        };
    }

    if args.songs || args.pack.is_some() {
        let rows: Vec<SongRow> = records
            .iter()
            .map(|r| SongRow {
                key: r.song_key.clone(),
                artist: r.artist.clone().unwrap_or_default(),
                name: r.name.clone().unwrap_or_default(),
                album: r.album.clone().unwrap_or_default(),
                year: r.year.map(|y| y.to_string()).unwrap_or_default(),
                pack: r.pack_name.clone(),
            })
            .collect();
        println!("{}", Table::new(rows));
    } else {
        let rows: Vec<PackRow> = snapshot
            .packs()
            .into_values()
            .map(|p| PackRow {
                label: p.label,
                pack_type: p.pack_type.to_string(),
                title_id: p.title_id.unwrap_or_default(),
                songs: p.song_count,
                manifests: p.manifests.len(),
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    if let Some(d) = &deduped {
        for dropped in &d.dropped {
            println!(
                "{} {} [{}] kept in {}",
                paint("dropped", Style::new().dimmed()),
                dropped.song_key,
                dropped.pack_name,
                dropped.kept_pack
            );
        }
    }

    if !ctx.quiet {
        println!(
            "{} songs in {} manifests under {}",
            paint(records.len(), Style::new().bold()),
            snapshot.sources.len(),
            snapshot.root.display()
        );
    }
    Ok(())
}

#[instrument(skip_all)]
pub fn duplicates(args: DuplicatesArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let snapshot = scan_catalog(&lib, ctx, args.json);
    let groups = lib.duplicates(&snapshot);

    if args.json {
        return print_json(&groups);
    }

    if groups.is_empty() {
        println!("{}", paint("No duplicates found", Style::new().green()));
        return Ok(());
    }

    let mut total = 0u64;
    for g in &groups {
        total += g.size_to_free;
        println!(
            "{} ({} copies, {} reclaimable)",
            paint(g.recommended_keep.display_title(), Style::new().bold()),
            g.members.len(),
            SizeUtils::format_bytes(g.size_to_free)
        );
        println!(
            "  {} {} [{}] {}",
            paint("keep", Style::new().green()),
            g.recommended_keep.song_key,
            g.recommended_keep.pack_name,
            paint(PathUtils::display_rel(lib.root(), &g.recommended_keep.source_file), Style::new().dimmed())
        );
        for r in &g.recommended_delete {
            println!(
                "  {} {} [{}] {}",
                paint("drop", Style::new().red()),
                r.song_key,
                r.pack_name,
                paint(PathUtils::display_rel(lib.root(), &r.source_file), Style::new().dimmed())
            );
        }
    }

    if !ctx.quiet {
        println!(
            "\n{} duplicate groups, {} reclaimable",
            paint(groups.len(), Style::new().bold()),
            SizeUtils::format_bytes(total)
        );
    }
    Ok(())
}
