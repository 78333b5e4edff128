//! `merge`: validate a pack merge, then run it.

use anyhow::{Context, Result, bail};
use owo_colors::Style;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, MergeArgs};
use crate::cli_ext::catalog_cmd::{open_library, paint, print_json, scan_catalog};
use crate::core::merge::{MergePlan, MergeRequest};
use crate::infra::utils::{PathUtils, SizeUtils};

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "Pack")]
    label: String,
    #[tabled(rename = "Type")]
    pack_type: String,
    #[tabled(rename = "Title ID")]
    title_id: String,
    #[tabled(rename = "Songs")]
    songs: usize,
    #[tabled(rename = "Size")]
    size: String,
}

fn print_plan(plan: &MergePlan, root: &std::path::Path) {
    let rows: Vec<SourceRow> = plan
        .sources
        .iter()
        .map(|s| SourceRow {
            label: s.label.clone(),
            pack_type: s.pack_type.to_string(),
            title_id: s.title_id.clone().unwrap_or_default(),
            songs: s.song_count,
            size: SizeUtils::format_bytes(s.size),
        })
        .collect();
    println!("{}", Table::new(rows));
    println!(
        "{} {} songs ({}) into {}",
        paint("merge", Style::new().bold()),
        plan.total_songs,
        SizeUtils::format_bytes(plan.total_size),
        PathUtils::display_rel(root, &plan.target_dir)
    );
    for w in &plan.warnings {
        println!("{} {}", paint("warning:", Style::new().yellow()), w);
    }
}

#[instrument(skip_all, fields(target = %args.target))]
pub fn run(args: MergeArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let snapshot = scan_catalog(&lib, ctx, args.json);

    let request = MergeRequest { target: args.target.clone(), packs: args.packs.clone(), delete_sources: args.delete_sources };
    let plan = lib
        .validate_merge(&snapshot, &request)
        .context("Merge validation failed")?;

    // --dry-run stops after validation as well
    if args.validate_only || ctx.dry_run {
        if args.json {
            return print_json(&json!({ "valid": true, "plan": plan }));
        }
        print_plan(&plan, lib.root());
        return Ok(());
    }

    if !args.json && !ctx.quiet {
        print_plan(&plan, lib.root());
    }

    let report = lib.execute_merge(&plan).context("Merge failed")?;

    if args.json {
        print_json(&report)?;
    } else {
        for f in &report.failed {
            println!("{} {} [{}]: {}", paint("skipped", Style::new().yellow()), f.song_key, f.pack, f.reason);
        }
        for removal in &report.source_removals {
            println!("{} {}: {}", paint("source", Style::new().dimmed()), removal.pack, removal.report.summary);
        }
        println!("{}", paint(&report.summary, Style::new().bold()));
    }

    if !report.ok {
        bail!("merge produced no songs");
    }
    Ok(())
}
