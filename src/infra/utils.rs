//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::path::{Path, PathBuf};

/// Human-readable byte sizes
pub struct SizeUtils;

impl SizeUtils
{
    /// Format a byte count with binary units, one decimal above KiB
    pub fn format_bytes(bytes: u64) -> String
    {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

        // Plain bytes need no decimals
        if bytes < 1024
        {
            return format!("{bytes} B");
        }

        // Walk up the units
        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1
        {
            value /= 1024.0;
            unit += 1;
        }

        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Case- and whitespace-insensitive text keys
pub struct NameUtils;

impl NameUtils
{
    /// Lowercase and trim for grouping comparisons
    pub fn normalize(s: &str) -> String
    {
        s.trim()
            .to_lowercase()
    }

    /// Same as `normalize`, with `None` as the empty string
    pub fn normalize_opt(s: Option<&str>) -> String
    {
        s.map(Self::normalize)
            .unwrap_or_default()
    }
}

/// Path helpers for user input and display
pub struct PathUtils;

impl PathUtils
{
    /// Expand `~` and `$VAR`, then canonicalize when the path exists
    pub fn expand(raw: &Path) -> PathBuf
    {
        // Expansion needs UTF-8; leave other paths alone
        let expanded = match raw.to_str()
        {
            Some(s) => PathBuf::from(
                shellexpand::full(s)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| s.to_string()),
            ),
            None => raw.to_path_buf(),
        };

        dunce::canonicalize(&expanded).unwrap_or(expanded)
    }

    /// Path relative to `root` for display, else the path itself
    pub fn display_rel(
        root: &Path,
        path: &Path,
    ) -> String
    {
        path.strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
