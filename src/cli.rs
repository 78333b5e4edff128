use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,           // global --quiet
    pub no_color: bool,        // global --no-color
    pub dry_run: bool,         // global --dry-run
    pub verbose: bool,         // global --verbose
    pub root: Option<PathBuf>, // global --root
}

#[derive(Parser)]
#[command(name = "dtacat")]
#[command(about = "A fast, lossless catalog and pack editor for songs.dta manifests")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Catalog root (defaults to catalog_root from dtacat.toml, then ".")
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the catalog and list songs per pack
    Scan(ScanArgs),

    /// Find songs present in more than one pack
    Duplicates(DuplicatesArgs),

    /// Remove songs from manifests and soft-delete their folders
    Remove(RemoveArgs),

    /// Replace or add metadata fields of one entry
    Patch(PatchArgs),

    /// Merge two or more packs into a new one
    Merge(MergeArgs),

    /// List, restore and clean up backups
    Backup(BackupArgs),

    /// Initialize a dtacat.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Print every song instead of the per-pack summary
    #[arg(long)]
    pub songs: bool,

    /// Only songs of this pack (case-insensitive label)
    #[arg(long, value_name = "PACK")]
    pub pack: Option<String>,

    /// Collapse duplicates to the best-ranked copy and report the rest
    #[arg(long)]
    pub dedupe: bool,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct DuplicatesArgs {
    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// Targets (format: path/to/songs.dta:key1,key2)
    #[arg(value_name = "MANIFEST:KEYS")]
    pub targets: Vec<String>,

    /// Remove a song key from every manifest that lists it
    #[arg(long = "song", value_name = "KEY")]
    pub songs: Vec<String>,

    /// Edit manifests only; leave song folders in place
    #[arg(long)]
    pub keep_folders: bool,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct PatchArgs {
    /// Manifest path, relative to the catalog root or absolute
    pub manifest: PathBuf,

    /// Entry key as listed by `scan --songs`
    pub key: String,

    /// Field assignment (repeatable); 42 is an int, 'rock' a symbol, anything else a string
    #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
    pub set: Vec<String>,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Name of the new pack directory
    pub target: String,

    /// Source pack label (repeat at least twice)
    #[arg(long = "pack", value_name = "NAME", required = true)]
    pub packs: Vec<String>,

    /// Remove merged songs from their source packs afterwards
    #[arg(long)]
    pub delete_sources: bool,

    /// Print the plan and stop
    #[arg(long)]
    pub validate_only: bool,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// List manifest backups and soft-deleted folders
    List(BackupListArgs),

    /// Put a backup back in place
    Restore(BackupRestoreArgs),

    /// Delete backups older than N days
    Cleanup(BackupCleanupArgs),
}

#[derive(Parser, Debug)]
pub struct BackupListArgs {
    /// Only this kind of backup
    #[arg(long, value_enum)]
    pub kind: Option<BackupKindArg>,

    /// Limit result count
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupKindArg {
    /// `<name>.backup.<stamp>` manifest copy
    Manifest,
    /// `<dir>.deleted_<stamp>` song folder
    Folder,
}

#[derive(Args, Debug)]
pub struct BackupRestoreArgs {
    /// Backup kind
    #[arg(value_enum)]
    pub kind: BackupKindArg,

    /// Backup path, relative to the catalog root or absolute
    pub path: PathBuf,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BackupCleanupArgs {
    /// Age threshold in days (defaults to cleanup.days)
    #[arg(long)]
    pub days: Option<u32>,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
