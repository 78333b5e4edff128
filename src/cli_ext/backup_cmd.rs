//! `backup list|restore|cleanup`.

use anyhow::{Context, Result};
use owo_colors::Style;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, BackupCleanupArgs, BackupKindArg, BackupListArgs, BackupRestoreArgs};
use crate::cli_ext::catalog_cmd::{open_library, paint, print_json};
use crate::core::backup::BackupKind;
use crate::core::backup_ops::RestoreRequest;
use crate::infra::utils::{PathUtils, SizeUtils};

impl From<BackupKindArg> for BackupKind {
    fn from(k: BackupKindArg) -> Self {
        match k {
            BackupKindArg::Manifest => BackupKind::Manifest,
            BackupKindArg::Folder => BackupKind::Folder,
        }
    }
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Path")]
    path: String,
}

#[instrument(skip_all)]
pub fn list(args: BackupListArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let mut listing = lib.backups();
    if let Some(kind) = args.kind {
        let kind = BackupKind::from(kind);
        listing.backups.retain(|b| b.kind == kind);
    }
    listing.backups.truncate(args.limit);

    if args.json {
        return print_json(&listing);
    }

    if listing.backups.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    let rows: Vec<BackupRow> = listing
        .backups
        .iter()
        .map(|b| BackupRow {
            kind: b.kind.to_string(),
            created: b.created.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: SizeUtils::format_bytes(b.size),
            path: PathUtils::display_rel(lib.root(), &b.path),
        })
        .collect();
    println!("{}", Table::new(rows));

    if !ctx.quiet {
        println!(
            "{} manifest backups, {} deleted folders, {} total",
            listing.manifest_count,
            listing.folder_count,
            paint(SizeUtils::format_bytes(listing.total_size), Style::new().bold())
        );
    }
    Ok(())
}

#[instrument(skip_all)]
pub fn restore(args: BackupRestoreArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let req = RestoreRequest { kind: args.kind.into(), path: args.path.clone(), dry_run: ctx.dry_run };
    let result = lib
        .restore(&req)
        .with_context(|| format!("Failed to restore {}", args.path.display()))?;

    if args.json {
        return print_json(&result);
    }
    if let Some(aside) = &result.set_aside {
        println!("{} current manifest moved to {}", paint("note:", Style::new().cyan()), PathUtils::display_rel(lib.root(), aside));
    }
    println!("{}", paint(&result.summary, Style::new().green()));
    Ok(())
}

#[instrument(skip_all)]
pub fn cleanup(args: BackupCleanupArgs, ctx: &AppContext) -> Result<()> {
    let lib = open_library(ctx)?;
    let result = lib
        .cleanup(args.days, ctx.dry_run)
        .context("Backup cleanup failed")?;

    if args.json {
        return print_json(&result);
    }
    if !ctx.quiet {
        for p in &result.removed {
            println!("{} {}", paint("removed", Style::new().red()), PathUtils::display_rel(lib.root(), p));
        }
    }
    for e in &result.errors {
        eprintln!("{} {}", paint("error:", Style::new().red()), e);
    }
    println!("{}", paint(&result.summary, Style::new().bold()));
    Ok(())
}
