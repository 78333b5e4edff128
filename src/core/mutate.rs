//! Surgical manifest edits: entry removal, field patching, regeneration.
//!
//! Removal and patching splice the original bytes at token offsets, so every
//! byte outside the edited ranges survives unchanged (comments, CP-1252 text,
//! odd spacing included). Regeneration is only used for brand new manifests.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::core::backup::{BackupStamp, write_manifest_backup};
use crate::core::error::{CatalogError, IoResultExt, Result};
use crate::core::locate::{EntryLocator, EntrySpan, key_text};
use crate::infra::io::{read_manifest, write_atomic};
use crate::parsers::dta_parser::{AtomKind, Node, strip_symbol_quotes};
use crate::parsers::tokenizer::{TokenKind, escape_string, is_plain_symbol};

const DEFAULT_INDENT: &str = "   ";

// ---------------------------------------------------------------- removal

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedEntry {
    pub song_key: String,
    pub entry_key: String,
}

/// Result of removing entries from one manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestRemoval {
    pub manifest: PathBuf,
    /// Entries actually removed, in file order
    pub removed: Vec<RemovedEntry>,
    /// Requested keys with no matching entry
    pub missing: Vec<String>,
    pub backup: Option<PathBuf>,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Extend a span end over trailing blanks and one line break.
fn extend_over_line_end(src: &[u8], mut end: usize) -> usize {
    while end < src.len() && matches!(src[end], b' ' | b'\t') {
        end += 1;
    }
    match src.get(end..end + 2) {
        Some(b"\r\n") => end + 2,
        _ if matches!(src.get(end), Some(b'\n' | b'\r')) => end + 1,
        _ => end,
    }
}

/// Cut `spans` out of `src`, back to front. Spans must not overlap.
pub fn excise(src: &[u8], spans: &[EntrySpan]) -> Vec<u8> {
    let mut ranges: Vec<(usize, usize)> = spans
        .iter()
        .map(|s| (s.start, extend_over_line_end(src, s.end)))
        .collect();
    ranges.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = src.to_vec();
    for (start, end) in ranges {
        out.drain(start..end);
    }
    out
}

/// Remove the entries for `keys` from one manifest.
///
/// Spans are resolved against the original text before anything is
/// written. Nothing is touched when no key matches.
#[instrument(level = "debug", skip(keys), fields(manifest = %manifest.display()))]
pub fn remove_entries<S: AsRef<str>>(
    manifest: &Path,
    keys: &[S],
    stamp: BackupStamp,
    dry_run: bool,
) -> Result<ManifestRemoval> {
    let src = read_manifest(manifest)?.into_vec();
    let located = EntryLocator::new(manifest, &src).find_all(keys);

    let mut removed: Vec<&EntrySpan> = located.spans.iter().collect();
    removed.sort_by_key(|s| s.start);

    let mut outcome = ManifestRemoval {
        manifest: manifest.to_path_buf(),
        removed: removed
            .iter()
            .map(|s| RemovedEntry { song_key: s.song_key.clone(), entry_key: s.entry_key.clone() })
            .collect(),
        missing: located.missing.clone(),
        backup: None,
        bytes_before: src.len(),
        bytes_after: src.len(),
    };

    if located.spans.is_empty() {
        debug!("no matching entries, manifest left untouched");
        return Ok(outcome);
    }

    let new_text = excise(&src, &located.spans);
    outcome.bytes_after = new_text.len();

    if dry_run {
        return Ok(outcome);
    }

    outcome.backup = Some(write_manifest_backup(manifest, &src, stamp)?);
    write_atomic(manifest, &new_text).at(manifest)?;
    info!(removed = outcome.removed.len(), "manifest entries removed");
    Ok(outcome)
}

// ---------------------------------------------------------------- patching

/// Value written into a `(field value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Int(i64),
    Symbol(String),
    Str(String),
}

impl FieldValue {
    /// Numbers become ints, `'x'` a symbol, anything else a string. A quoted
    /// value that cannot stand as one symbol token is kept as a string.
    pub fn parse_cli(raw: &str) -> Self {
        if let Ok(n) = raw.trim().parse::<i64>() {
            return FieldValue::Int(n);
        }
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            let inner = &raw[1..raw.len() - 1];
            return if is_plain_symbol(inner) {
                FieldValue::Symbol(inner.to_string())
            } else {
                FieldValue::Str(inner.to_string())
            };
        }
        FieldValue::Str(raw.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Int(_) => false,
            FieldValue::Symbol(s) | FieldValue::Str(s) => s.trim().is_empty(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            FieldValue::Int(n) => n.to_string(),
            FieldValue::Symbol(s) => format!("'{s}'"),
            FieldValue::Str(s) => escape_string(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldFailure {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub manifest: PathBuf,
    pub key: String,
    pub patched: Vec<String>,
    pub added: Vec<String>,
    pub failed: Vec<FieldFailure>,
    pub backup: Option<PathBuf>,
    pub dry_run: bool,
    pub summary: String,
}

impl PatchOutcome {
    pub fn ok(&self) -> bool {
        !self.patched.is_empty() || !self.added.is_empty()
    }
}

/// Text-level result of a patch, before anything hits disk.
#[derive(Debug, Default)]
pub struct PatchedText {
    pub text: Vec<u8>,
    pub patched: Vec<String>,
    pub added: Vec<String>,
    pub failed: Vec<FieldFailure>,
}

struct Child {
    name: String,
    name_tok: usize,
    close_tok: usize,
}

fn valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Leading whitespace of the line holding offset `at`, if only blanks
/// precede it.
fn indent_before(src: &[u8], at: usize) -> Option<String> {
    let line_start = memchr::memrchr(b'\n', &src[..at]).map_or(0, |i| i + 1);
    let lead = &src[line_start..at];
    (!lead.is_empty() && lead.iter().all(|b| matches!(b, b' ' | b'\t')))
        .then(|| String::from_utf8_lossy(lead).into_owned())
}

/// Apply field edits to one entry of `src`.
pub fn patch_text(
    manifest: &Path,
    src: &[u8],
    key: &str,
    fields: &IndexMap<String, FieldValue>,
) -> Result<PatchedText> {
    let locator = EntryLocator::new(manifest, src);
    let group = *locator
        .find_group(key)
        .ok_or_else(|| CatalogError::EntryNotFound { path: manifest.to_path_buf(), key: key.to_string() })?;
    let (Some(close), Some(key_idx)) = (group.close, group.key) else {
        return Err(CatalogError::EntryNotFound { path: manifest.to_path_buf(), key: key.to_string() });
    };
    let toks = locator.tokens();

    // Direct children `(name ...)` of the entry
    let mut children = Vec::new();
    let mut last_child_open = None;
    let mut depth = 0usize;
    let mut open_at = 0usize;
    for i in key_idx + 1..close {
        match toks[i].kind {
            TokenKind::Open => {
                if depth == 0 {
                    open_at = i;
                }
                depth += 1;
            }
            TokenKind::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    last_child_open = Some((open_at, i));
                    let name_tok = open_at + 1;
                    if name_tok < i && !toks[name_tok].is_paren() {
                        children.push(Child {
                            name: strip_symbol_quotes(&key_text(&toks[name_tok])).to_string(),
                            name_tok,
                            close_tok: i,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let quote_names = children
        .iter()
        .any(|c| toks[c.name_tok].kind == TokenKind::Symbol)
        || children.is_empty();

    let (insert_at, indent) = match last_child_open {
        Some((open, child_close)) => (
            toks[child_close].end,
            indent_before(src, toks[open].start).unwrap_or_else(|| DEFAULT_INDENT.to_string()),
        ),
        None => (
            toks[key_idx].end,
            indent_before(src, toks[key_idx].start).unwrap_or_else(|| DEFAULT_INDENT.to_string()),
        ),
    };

    let mut out = PatchedText::default();
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut additions = String::new();

    for (field, value) in fields {
        if !valid_field_name(field) {
            out.failed.push(FieldFailure { field: field.clone(), reason: "malformed field name".into() });
            continue;
        }
        if value.is_empty() {
            out.failed.push(FieldFailure { field: field.clone(), reason: "empty value".into() });
            continue;
        }
        if let FieldValue::Symbol(sym) = value {
            if !is_plain_symbol(sym) {
                out.failed.push(FieldFailure {
                    field: field.clone(),
                    reason: format!("'{sym}' cannot be written as a symbol"),
                });
                continue;
            }
        }

        match children.iter().find(|c| c.name == *field) {
            Some(child) => {
                let first = child.name_tok + 1;
                let (start, end, text) = if first < child.close_tok {
                    (toks[first].start, toks[child.close_tok - 1].end, value.render())
                } else {
                    let at = toks[child.name_tok].end;
                    (at, at, format!(" {}", value.render()))
                };
                edits.push((start, end, text));
                out.patched.push(field.clone());
            }
            None => {
                let name = if quote_names { format!("'{field}'") } else { field.clone() };
                additions.push_str(&format!("\n{indent}({name} {})", value.render()));
                out.added.push(field.clone());
            }
        }
    }

    if !additions.is_empty() {
        edits.push((insert_at, insert_at, additions));
    }
    edits.sort_by(|a, b| b.0.cmp(&a.0));

    let mut text = src.to_vec();
    for (start, end, replacement) in edits {
        text.splice(start..end, replacement.into_bytes());
    }
    out.text = text;
    Ok(out)
}

/// Patch fields of one entry in place, with a backup of the original.
#[instrument(level = "debug", skip(fields), fields(manifest = %manifest.display()))]
pub fn patch_entry(
    manifest: &Path,
    key: &str,
    fields: &IndexMap<String, FieldValue>,
    stamp: BackupStamp,
    dry_run: bool,
) -> Result<PatchOutcome> {
    let src = read_manifest(manifest)?.into_vec();
    let patched = patch_text(manifest, &src, key, fields)?;

    let mut outcome = PatchOutcome {
        manifest: manifest.to_path_buf(),
        key: key.to_string(),
        patched: patched.patched,
        added: patched.added,
        failed: patched.failed,
        backup: None,
        dry_run,
        summary: String::new(),
    };

    if outcome.ok() && !dry_run {
        outcome.backup = Some(write_manifest_backup(manifest, &src, stamp)?);
        write_atomic(manifest, &patched.text).at(manifest)?;
        info!(key, patched = outcome.patched.len(), added = outcome.added.len(), "entry patched");
    }

    outcome.summary = format!(
        "{}{} patched, {} added, {} failed",
        if dry_run { "[dry-run] " } else { "" },
        outcome.patched.len(),
        outcome.added.len(),
        outcome.failed.len()
    );
    Ok(outcome)
}

// ---------------------------------------------------------------- regenerate

fn render_inline(node: &Node, out: &mut String) {
    match node {
        Node::Atom(a) => match a.kind {
            AtomKind::Str => out.push_str(&escape_string(&a.value)),
            AtomKind::Symbol => {
                out.push('\'');
                out.push_str(&a.value);
                out.push('\'');
            }
            AtomKind::Int | AtomKind::Float | AtomKind::Word => out.push_str(&a.value),
        },
        Node::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render_inline(item, out);
            }
            out.push(')');
        }
    }
}

/// Serialize entries one field per line, nested lists inline.
pub fn regenerate(entries: &[Node]) -> String {
    let mut out = String::new();
    for entry in entries {
        let Some(items) = entry.as_list() else {
            continue;
        };
        out.push_str("(\n");
        for (i, child) in items.iter().enumerate() {
            out.push_str(DEFAULT_INDENT);
            match (i, child) {
                (0, Node::Atom(key)) => {
                    out.push('\'');
                    out.push_str(strip_symbol_quotes(&key.value));
                    out.push('\'');
                }
                _ => render_inline(child, &mut out),
            }
            out.push('\n');
        }
        out.push_str(")\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::locate::locate_all;
    use crate::parsers::dta_parser::parse;
    use proptest::prelude::*;

    const TWO: &str = "( 'foo' ('name' \"Foo Song\") ('artist' \"Foo Artist\") )\n( 'bar' ('name' \"Bar Song\") ('artist' \"Bar Artist\") )\n";

    fn p() -> &'static Path {
        Path::new("songs.dta")
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> IndexMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn excise_consumes_trailing_line_break() {
        let spans = locate_all(p(), TWO.as_bytes(), &["foo"]).spans;
        let out = excise(TWO.as_bytes(), &spans);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "( 'bar' ('name' \"Bar Song\") ('artist' \"Bar Artist\") )\n"
        );
    }

    #[test]
    fn excise_handles_crlf_and_adjacent_entries() {
        let src = b"(a (name \"x\"))  \r\n(b (name \"y\"))(c (name \"z\"))\r\n";
        let spans = locate_all(p(), src, &["a", "c"]).spans;
        assert_eq!(excise(src, &spans), b"(b (name \"y\"))".to_vec());
    }

    #[test]
    fn patch_replaces_existing_value_in_place() {
        let src = b"(\n   'foo'\n   ('name' \"Old\")\n   ('year_released' 1990)\n)\n";
        let r = patch_text(
            p(),
            src,
            "foo",
            &fields(&[("name", FieldValue::Str("New \"One\"".into())), ("year_released", FieldValue::Int(1991))]),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(r.text).unwrap(),
            "(\n   'foo'\n   ('name' \"New \\\"One\\\"\")\n   ('year_released' 1991)\n)\n"
        );
        assert_eq!(r.patched, vec!["name", "year_released"]);
        assert!(r.added.is_empty());
    }

    #[test]
    fn patch_inserts_missing_field_with_existing_indent() {
        let src = b"; keep me\n(\n   'foo'\n   ('name' \"Foo\")\n)\n(bar (name \"B\"))\n";
        let r = patch_text(p(), src, "foo", &fields(&[("genre", FieldValue::Symbol("rock".into()))])).unwrap();
        assert_eq!(
            String::from_utf8(r.text).unwrap(),
            "; keep me\n(\n   'foo'\n   ('name' \"Foo\")\n   ('genre' 'rock')\n)\n(bar (name \"B\"))\n"
        );
        assert_eq!(r.added, vec!["genre"]);
    }

    #[test]
    fn patch_follows_unquoted_style() {
        let src = b"(bar\n  (name \"B\"))";
        let r = patch_text(p(), src, "bar", &fields(&[("rating", FieldValue::Int(2))])).unwrap();
        assert_eq!(String::from_utf8(r.text).unwrap(), "(bar\n  (name \"B\")\n  (rating 2))");
    }

    #[test]
    fn patch_reports_per_field_failures() {
        let r = patch_text(
            p(),
            TWO.as_bytes(),
            "bar",
            &fields(&[
                ("bad name", FieldValue::Int(1)),
                ("album", FieldValue::Str("  ".into())),
                ("artist", FieldValue::Str("X".into())),
            ]),
        )
        .unwrap();
        assert_eq!(r.failed.len(), 2);
        assert_eq!(r.patched, vec!["artist"]);
        // foo untouched
        assert!(String::from_utf8(r.text).unwrap().starts_with("( 'foo' ('name' \"Foo Song\") ('artist' \"Foo Artist\") )\n"));
    }

    #[test]
    fn patch_missing_entry_is_an_error() {
        let err = patch_text(p(), TWO.as_bytes(), "nope", &fields(&[("name", FieldValue::Int(1))])).unwrap_err();
        assert!(matches!(err, CatalogError::EntryNotFound { .. }));
    }

    #[test]
    fn cli_values_pick_their_kind() {
        assert_eq!(FieldValue::parse_cli("1999"), FieldValue::Int(1999));
        assert_eq!(FieldValue::parse_cli("'rock'"), FieldValue::Symbol("rock".into()));
        assert_eq!(FieldValue::parse_cli("Rock"), FieldValue::Str("Rock".into()));
        assert_eq!(FieldValue::parse_cli("'"), FieldValue::Str("'".into()));
        assert_eq!(FieldValue::parse_cli("'classic rock'"), FieldValue::Str("classic rock".into()));
        assert_eq!(FieldValue::parse_cli("'a(b'"), FieldValue::Str("a(b".into()));
    }

    #[test]
    fn quoted_value_with_spaces_survives_a_reparse() {
        let src = b"('foo' ('name' \"Foo\") ('artist' \"A\") ('genre' 'rock'))";
        let value = FieldValue::parse_cli("'classic rock'");
        let r = patch_text(p(), src, "foo", &fields(&[("genre", value)])).unwrap();
        assert_eq!(r.patched, vec!["genre"]);

        let nodes = parse(&r.text);
        assert_eq!(nodes.len(), 1);
        let rec = crate::core::extract::extract_record(&nodes[0]).unwrap();
        assert_eq!(rec.genre.as_deref(), Some("classic rock"));
    }

    #[test]
    fn symbols_that_would_split_are_rejected() {
        let src = b"('foo' ('name' \"Foo\") ('genre' 'rock'))";
        for bad in ["classic rock", "a)b", "it's", "say\"hi\""] {
            let r = patch_text(p(), src, "foo", &fields(&[("genre", FieldValue::Symbol(bad.into()))])).unwrap();
            assert!(r.patched.is_empty(), "{bad}");
            assert_eq!(r.failed.len(), 1, "{bad}");
            assert_eq!(r.text, src.to_vec(), "{bad}");
        }
    }

    #[test]
    fn regenerate_layout() {
        let nodes = parse(br#"('foo' ('name' "A \"B\"") (rank (drum 3) (bass 0)) (year_released 2001) (vocal_gender female))"#);
        assert_eq!(
            regenerate(&nodes),
            "(\n   'foo'\n   ('name' \"A \\\"B\\\"\")\n   (rank (drum 3) (bass 0))\n   (year_released 2001)\n   (vocal_gender female)\n)\n"
        );
        // Regenerated text parses back to the same tree
        assert_eq!(parse(regenerate(&nodes).as_bytes()), nodes);
    }

    proptest! {
        #[test]
        fn removal_is_order_independent(mask in proptest::collection::vec(any::<bool>(), 5), rev in any::<bool>()) {
            let src = "(k0 (name \"a\"))\n(k1 (name \"b\"))\n(k2 (name \"c\"))\n(k3 (name \"d\"))\n(k4 (name \"e\"))\n";
            let mut keys: Vec<String> = mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| format!("k{i}")).collect();
            let forward = excise(src.as_bytes(), &locate_all(p(), src.as_bytes(), &keys).spans);
            if rev { keys.reverse(); } else { let n = keys.len().min(1); keys.rotate_left(n); }
            let other = excise(src.as_bytes(), &locate_all(p(), src.as_bytes(), &keys).spans);
            prop_assert_eq!(&forward, &other);
            let left = parse(&forward).len();
            prop_assert_eq!(left, 5 - mask.iter().filter(|m| **m).count());
        }
    }
}
