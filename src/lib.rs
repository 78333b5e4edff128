//! **dtacat** - Fast, lossless catalog and pack editor for `songs.dta` manifests
//!
//! Byte-exact tokenizing and surgical rewrites of rhythm-game song manifests,
//! with rename-based backups for every destructive change.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core catalog pipeline - scan, locate, mutate, merge, back up
pub mod core {
    /// Error taxonomy for catalog mutations
    pub mod error;
    pub use error::{CatalogError, Result};

    /// Song records pulled out of parsed entries
    pub mod extract;
    pub use extract::{SongRecord, extract_record};

    /// Pack type and title id from a manifest path
    pub mod classify;
    pub use classify::{PackInfo, PackType, classify};

    /// Byte spans of top-level entries
    pub mod locate;
    pub use locate::{EntryLocator, EntrySpan, locate, locate_all};

    /// Entry removal, field patching and manifest regeneration
    pub mod mutate;
    pub use mutate::{FieldValue, PatchOutcome, regenerate};

    /// "<manifest>:<key>,<key>" removal targets
    pub mod target;
    pub use target::RemovalTarget;

    /// Removal orchestration across manifests and song folders
    pub mod remove;
    pub use remove::{RemovalReport, RemoveOptions};

    /// Directory scan into an immutable snapshot (rayon)
    pub mod catalog;
    pub use catalog::{CatalogSnapshot, scan};

    /// Duplicate detection with keep/delete recommendations
    pub mod duplicates;
    pub use duplicates::{DuplicateGroup, MatchKey, dedupe, find_duplicates};

    /// Pack merge validation and execution
    pub mod merge;
    pub use merge::{MergePlan, MergeReport, MergeRequest};

    /// Backup stamps, manifest copies and folder soft-deletes
    pub mod backup;
    pub use backup::{BackupKind, BackupStamp};

    /// Backup listing, restore and age-based cleanup
    pub mod backup_ops;
    pub use backup_ops::{BackupListing, CleanupResult, RestoreRequest, RestoreResult};

    /// Operations facade holding the mutation lock
    pub mod library;
    pub use library::Library;
}

/// Manifest syntax - byte tokenizer and lenient tree parser
pub mod parsers {
    /// Offset-exact tokenizer over raw manifest bytes
    pub mod tokenizer;
    pub use tokenizer::{Token, TokenKind, tokenize};

    /// Token stream to `Node` tree
    pub mod dta_parser;
    pub use dta_parser::{Atom, AtomKind, Node, parse};
}

/// Infrastructure - Configuration, I/O, walking and logging
pub mod infra {
    /// Layered configuration with TOML/YAML/JSON files and env overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped reads, atomic writes, directory copies and sizes
    pub mod io;
    pub use io::{ManifestBytes, read_manifest, write_atomic};

    /// Catalog-wide lock file for mutations
    pub mod lock;
    pub use lock::MutationLock;

    /// tracing-subscriber setup for the binary
    pub mod logging;

    /// Manifest and backup discovery built on `ignore`
    pub mod walk;
    pub use walk::CatalogWalker;

    /// Utility functions and helpers for common operations
    pub mod utils;
}

/// Command handlers behind the CLI
pub mod cli_ext {
    pub mod backup_cmd;
    pub mod catalog_cmd;
    pub mod edit_cmd;
    pub mod merge_cmd;
}

// Strategic re-exports for clean CLI interface
pub use crate::cli::{AppContext, Cli, Commands};
pub use crate::core::{CatalogError, CatalogSnapshot, Library, SongRecord};
pub use crate::infra::{CatalogWalker, Config, load_config};
pub use crate::parsers::{Node, parse, tokenize};
