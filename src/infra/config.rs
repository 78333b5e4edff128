use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::backup_ops::DEFAULT_CLEANUP_DAYS;
use crate::core::merge::DEFAULT_LARGE_MERGE_THRESHOLD;
use crate::infra::lock::DEFAULT_STALE_AFTER;

pub const CONFIG_FILE_NAME: &str = "dtacat.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Catalog root; `--root` wins, then this, then the current directory
    pub catalog_root: Option<PathBuf>,

    /// Manifest and backup discovery
    pub scan: ScanConfig,

    /// Merge validation limits
    pub merge: MergeConfig,

    /// Backup retention
    pub cleanup: CleanupConfig,

    /// Mutation lock
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig
{
    /// Glob patterns relative to the catalog root
    pub ignore_patterns: Vec<String>,
    pub follow_symlinks: bool,
    pub include_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig
{
    /// Warn above this many songs
    pub large_merge_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig
{
    /// Default age for `backup cleanup`
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig
{
    pub stale_after_secs: u64,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            catalog_root: None,
            scan: ScanConfig::default(),
            merge: MergeConfig::default(),
            cleanup: CleanupConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Default for ScanConfig
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec!["**/.git/**".to_string(), "**/__MACOSX/**".to_string()],
            follow_symlinks: false,
            include_hidden: true,
        }
    }
}

impl Default for MergeConfig
{
    fn default() -> Self
    {
        Self { large_merge_threshold: DEFAULT_LARGE_MERGE_THRESHOLD }
    }
}

impl Default for CleanupConfig
{
    fn default() -> Self
    {
        Self { days: DEFAULT_CLEANUP_DAYS }
    }
}

impl Default for LockConfig
{
    fn default() -> Self
    {
        Self { stale_after_secs: DEFAULT_STALE_AFTER.as_secs() }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Layer the first config file found in `dir` and `DTACAT__*` variables over
/// the defaults.
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["dtacat.toml", "dtacat.yaml", "dtacat.json", ".dtacat.toml"];

    for name in &config_paths
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // DTACAT__MERGE__LARGE_MERGE_THRESHOLD=800
    builder = builder.add_source(
        config::Environment::with_prefix("DTACAT")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("scan.ignore_patterns")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILE_NAME);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        print!("{toml_string}");
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
