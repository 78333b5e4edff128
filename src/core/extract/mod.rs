//! Field extraction: top-level manifest entries to song records.
//!
//! Entries look like `('key' ('name' "Song") ('artist' "Band") ...)`. Field
//! names are matched case-sensitively after stripping symbol quotes; the first
//! atom following the name is the value.

pub mod record;

pub use record::SongRecord;

use std::path::PathBuf;

use crate::core::classify::PackType;
use crate::parsers::dta_parser::{Atom, Node, strip_symbol_quotes};

/// Top-level heads that never describe a song.
pub const RESERVED_KEYS: &[&str] = &["songs", "song", "meta", "version"];

/// Canonical song key: symbol quotes and an `o<digits>_` prefix removed.
pub fn canonical_key(raw: &str) -> &str {
    let key = strip_symbol_quotes(raw.trim());
    strip_numbered_prefix(key).unwrap_or(key)
}

fn strip_numbered_prefix(key: &str) -> Option<&str> {
    let rest = key.strip_prefix('o')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    rest[digits..].strip_prefix('_')
}

/// Key as written (quotes stripped) for a top-level entry.
pub fn entry_key(entry: &Node) -> Option<&str> {
    let head = entry.head()?;
    let key = head.value.trim();
    (!key.is_empty()).then_some(key)
}

/// First atom following `name` in a direct child `(name value ...)`.
pub fn field_atom<'a>(entry: &'a Node, name: &str) -> Option<&'a Atom> {
    entry.as_list()?.iter().skip(1).find_map(|child| {
        let items = child.as_list()?;
        let head = items.first()?.as_atom()?;
        if head.value != name {
            return None;
        }
        items[1..].iter().find_map(Node::as_atom)
    })
}

pub fn field_str(entry: &Node, name: &str) -> Option<String> {
    field_atom(entry, name)
        .map(|a| a.value.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn field_int(entry: &Node, name: &str) -> Option<i64> {
    field_atom(entry, name).and_then(Atom::as_int)
}

fn first_str(entry: &Node, names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| field_str(entry, n))
}

/// Extract a record from one top-level node; pack fields are left for the
/// caller to fill via [`SongRecord::with_pack`].
pub fn extract_record(entry: &Node) -> Option<SongRecord> {
    let written = entry_key(entry)?;
    if RESERVED_KEYS.contains(&written) {
        return None;
    }

    let name = field_str(entry, "name");
    let artist = field_str(entry, "artist");
    if name.is_none() && artist.is_none() {
        return None;
    }

    Some(SongRecord {
        song_key: canonical_key(written).to_string(),
        entry_key: written.to_string(),
        song_id: field_int(entry, "song_id"),
        name,
        artist,
        album: first_str(entry, &["album", "album_name"]),
        year: field_int(entry, "year_released").or_else(|| field_int(entry, "year")),
        genre: field_str(entry, "genre"),
        sub_genre: first_str(entry, &["sub_genre", "subgenre"]),
        decade: field_str(entry, "decade"),
        pack_type: PackType::Other,
        pack_name: String::new(),
        source_file: PathBuf::new(),
        title_id: None,
        is_eurovision: false,
    })
}

/// Extract every song record from parsed manifest nodes, in entry order.
pub fn extract_all(nodes: &[Node]) -> Vec<SongRecord> {
    nodes.iter().filter_map(extract_record).collect()
}
