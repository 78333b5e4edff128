//! Mutating commands on existing packs: `remove` and `patch`.

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use owo_colors::Style;
use tracing::instrument;

use crate::cli::{AppContext, PatchArgs, RemoveArgs};
use crate::cli_ext::catalog_cmd::{open_library, paint, print_json, scan_catalog};
use crate::core::mutate::FieldValue;
use crate::core::remove::{RemovalStatus, RemoveOptions};
use crate::core::target::RemovalTarget;
use crate::infra::utils::{PathUtils, SizeUtils};

#[instrument(skip_all)]
pub fn remove(args: RemoveArgs, ctx: &AppContext) -> Result<()> {
    if args.targets.is_empty() && args.songs.is_empty() {
        bail!("nothing to remove: pass MANIFEST:KEYS targets or --song KEY");
    }
    let lib = open_library(ctx)?;

    let mut targets = args
        .targets
        .iter()
        .map(|t| RemovalTarget::parse(t))
        .collect::<Result<Vec<_>>>()?;

    if !args.songs.is_empty() {
        let snapshot = scan_catalog(&lib, ctx, args.json);
        let (found, missing) = lib.targets_for_songs(&snapshot, &args.songs);
        for key in &missing {
            eprintln!("{} song '{}' is not in the catalog", paint("warning:", Style::new().yellow()), key);
        }
        targets.extend(found);
    }
    if targets.is_empty() {
        bail!("no matching songs");
    }

    let opts = RemoveOptions { keep_folders: args.keep_folders, dry_run: ctx.dry_run };
    let report = lib.remove(targets, opts).context("Removal failed")?;

    if args.json {
        print_json(&report)?;
    } else {
        for song in &report.songs {
            let manifest = PathUtils::display_rel(lib.root(), &song.manifest);
            match song.status {
                RemovalStatus::Removed => println!(
                    "{} {} from {} ({})",
                    paint("removed", Style::new().green()),
                    song.key,
                    manifest,
                    SizeUtils::format_bytes(song.bytes)
                ),
                RemovalStatus::NotFound => println!("{} {} in {}", paint("not found", Style::new().yellow()), song.key, manifest),
                RemovalStatus::Failed => println!(
                    "{} {} in {}: {}",
                    paint("failed", Style::new().red()),
                    song.key,
                    manifest,
                    song.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
        if !ctx.quiet {
            println!("{}", paint(&report.summary, Style::new().bold()));
        }
    }

    if !report.ok {
        bail!("no songs were removed");
    }
    Ok(())
}

/// `field=value` pairs in command-line order; later duplicates win.
pub fn parse_assignments(raw: &[String]) -> Result<IndexMap<String, FieldValue>> {
    let mut fields = IndexMap::new();
    for item in raw {
        let (field, value) = item
            .split_once('=')
            .with_context(|| format!("expected FIELD=VALUE, got '{item}'"))?;
        fields.insert(field.trim().to_string(), FieldValue::parse_cli(value));
    }
    Ok(fields)
}

#[instrument(skip_all)]
pub fn patch(args: PatchArgs, ctx: &AppContext) -> Result<()> {
    let fields = parse_assignments(&args.set)?;
    let lib = open_library(ctx)?;
    let outcome = lib
        .patch(&args.manifest, &args.key, &fields, ctx.dry_run)
        .with_context(|| format!("Failed to patch '{}' in {}", args.key, args.manifest.display()))?;

    if args.json {
        print_json(&outcome)?;
    } else {
        for f in &outcome.patched {
            println!("{} {}", paint("patched", Style::new().green()), f);
        }
        for f in &outcome.added {
            println!("{} {}", paint("added", Style::new().green()), f);
        }
        for f in &outcome.failed {
            println!("{} {}: {}", paint("failed", Style::new().red()), f.field, f.reason);
        }
        if !ctx.quiet {
            println!("{}", paint(&outcome.summary, Style::new().bold()));
        }
    }

    if !outcome.ok() {
        bail!("no fields were changed");
    }
    Ok(())
}
