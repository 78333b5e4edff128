use anyhow::Result;
use clap::Parser;
use dtacat::cli::{AppContext, BackupSubcommand, Cli, Commands};
use dtacat::cli_ext::{backup_cmd, catalog_cmd, edit_cmd, merge_cmd};

fn main() -> Result<()> {
    let cli = Cli::parse();

    dtacat::infra::logging::init(cli.verbose, cli.no_color);
    if cli.no_color {
        owo_colors::set_override(false);
    }

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        root: cli.root,
    };

    match cli.command {
        Commands::Scan(args) => catalog_cmd::scan(args, &ctx),
        Commands::Duplicates(args) => catalog_cmd::duplicates(args, &ctx),
        Commands::Remove(args) => edit_cmd::remove(args, &ctx),
        Commands::Patch(args) => edit_cmd::patch(args, &ctx),
        Commands::Merge(args) => merge_cmd::run(args, &ctx),
        Commands::Backup(args) => match args.command {
            BackupSubcommand::List(a) => backup_cmd::list(a, &ctx),
            BackupSubcommand::Restore(a) => backup_cmd::restore(a, &ctx),
            BackupSubcommand::Cleanup(a) => backup_cmd::cleanup(a, &ctx),
        },
        Commands::Init(args) => dtacat::infra::config::init(args, &ctx),
        Commands::Completions(args) => dtacat::completion::run(args, &ctx),
    }
}
