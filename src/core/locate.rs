//! Entry location over the token stream.
//!
//! Byte spans come from token offsets, so parens inside strings or comments
//! can never be mistaken for structure.

use std::path::{Path, PathBuf};

use memchr::memmem;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::extract::canonical_key;
use crate::parsers::dta_parser::strip_symbol_quotes;
use crate::parsers::tokenizer::{Token, TokenKind, decode_text, tokenize, unescape_string};

/// Byte range of one top-level entry in a manifest's current text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySpan {
    pub manifest: PathBuf,
    pub start: usize,
    pub end: usize,
    pub song_key: String,
    /// Key as written with quotes stripped; names the song folder
    pub entry_key: String,
    /// Key token as written, quotes included
    pub written_key: String,
}

impl EntrySpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A top-level group by token index.
#[derive(Debug, Clone, Copy)]
pub struct Group {
    pub open: usize,
    /// `None` when the group never closes
    pub close: Option<usize>,
    /// Index of the key token, when the first child is an atom
    pub key: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct LocateAll {
    /// Sorted by descending start
    pub spans: Vec<EntrySpan>,
    pub missing: Vec<String>,
}

/// Tokenized manifest ready for repeated lookups.
pub struct EntryLocator<'a> {
    manifest: &'a Path,
    src: &'a [u8],
    tokens: Vec<Token<'a>>,
    groups: Vec<Group>,
}

impl<'a> EntryLocator<'a> {
    pub fn new(manifest: &'a Path, src: &'a [u8]) -> Self {
        let tokens = tokenize(src);
        let groups = top_level_groups(&tokens);
        Self { manifest, src, tokens, groups }
    }

    pub fn src(&self) -> &'a [u8] {
        self.src
    }

    pub fn tokens(&self) -> &[Token<'a>] {
        &self.tokens
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Group for `key`. A prefixed key such as `o12_foo` matches that exact
    /// entry, or an unprefixed `foo`; it never matches `o34_foo`. A bare key
    /// matches any entry with the same canonical key.
    pub fn find_group(&self, key: &str) -> Option<&Group> {
        let requested = strip_symbol_quotes(key.trim());
        let wanted = canonical_key(key);
        if wanted.is_empty() || memmem::find(self.src, wanted.as_bytes()).is_none() {
            return None;
        }

        let written = |g: &&Group| g.key.map(|k| key_text(&self.tokens[k]));
        let group = if requested != wanted {
            self.groups
                .iter()
                .find(|g| written(g).is_some_and(|w| strip_symbol_quotes(w.trim()) == requested))
                .or_else(|| {
                    self.groups
                        .iter()
                        .find(|g| written(g).is_some_and(|w| strip_symbol_quotes(w.trim()) == wanted))
                })
        } else {
            self.groups
                .iter()
                .find(|g| written(g).is_some_and(|w| canonical_key(&w) == wanted))
        }?;

        if group.close.is_none() {
            warn!(
                manifest = %self.manifest.display(),
                key = wanted,
                offset = self.tokens[group.open].start,
                "entry never closes, treating as not found"
            );
            return None;
        }
        Some(group)
    }

    pub fn find(&self, key: &str) -> Option<EntrySpan> {
        let group = self.find_group(key)?;
        self.span_of(group)
    }

    fn span_of(&self, group: &Group) -> Option<EntrySpan> {
        let close = group.close?;
        let key_tok = &self.tokens[group.key?];
        let unquoted = key_text(key_tok);
        Some(EntrySpan {
            manifest: self.manifest.to_path_buf(),
            start: self.tokens[group.open].start,
            end: self.tokens[close].end,
            song_key: canonical_key(&unquoted).to_string(),
            entry_key: strip_symbol_quotes(&unquoted).to_string(),
            written_key: key_tok.text().into_owned(),
        })
    }

    /// Resolve many keys against the same text in one pass.
    pub fn find_all<S: AsRef<str>>(&self, keys: &[S]) -> LocateAll {
        let mut out = LocateAll::default();
        for key in keys {
            let key = key.as_ref();
            match self.find(key) {
                Some(span) if out.spans.iter().any(|s| s.start == span.start) => {
                    debug!(key, "duplicate removal key, ignoring");
                }
                Some(span) => out.spans.push(span),
                None => out.missing.push(key.to_string()),
            }
        }
        out.spans.sort_by(|a, b| b.start.cmp(&a.start));
        out
    }

    /// Every closed top-level entry with an atom key, in file order.
    pub fn entries(&self) -> Vec<EntrySpan> {
        self.groups.iter().filter_map(|g| self.span_of(g)).collect()
    }
}

/// Key token text with string quoting undone.
pub fn key_text(tok: &Token<'_>) -> String {
    match tok.kind {
        TokenKind::Str => decode_text(&unescape_string(tok.raw)).into_owned(),
        _ => tok.text().into_owned(),
    }
}

fn top_level_groups(tokens: &[Token<'_>]) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<Group> = None;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::Open => {
                if depth == 0 {
                    let key = tokens
                        .get(i + 1)
                        .filter(|t| !t.is_paren())
                        .map(|_| i + 1);
                    current = Some(Group { open: i, close: None, key });
                }
                depth += 1;
            }
            TokenKind::Close if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(mut g) = current.take() {
                        g.close = Some(i);
                        groups.push(g);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(g) = current {
        groups.push(g);
    }
    groups
}

/// Convenience wrapper for a single lookup.
pub fn locate(manifest: &Path, src: &[u8], key: &str) -> Option<EntrySpan> {
    EntryLocator::new(manifest, src).find(key)
}

/// Convenience wrapper for batch lookups.
pub fn locate_all<S: AsRef<str>>(manifest: &Path, src: &[u8], keys: &[S]) -> LocateAll {
    EntryLocator::new(manifest, src).find_all(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &[u8] = br#"; pack manifest
(
   'o1_alpha'
   ('name' "Alpha (Live)")
   ('artist' "A")
)
(
   beta
   ('name' "Beta ) tricky")
)
(
   "gamma"
   ('name' "Gamma")
)
"#;

    fn p() -> &'static Path {
        Path::new("songs.dta")
    }

    #[test]
    fn spans_cover_whole_entry() {
        let span = locate(p(), SRC, "alpha").unwrap();
        let text = &SRC[span.start..span.end];
        assert!(text.starts_with(b"(\n   'o1_alpha'"));
        assert!(text.ends_with(b"\"A\")\n)"));
        assert_eq!(span.song_key, "alpha");
        assert_eq!(span.entry_key, "o1_alpha");
        assert_eq!(span.written_key, "'o1_alpha'");
    }

    #[test]
    fn parens_in_strings_do_not_confuse() {
        let span = locate(p(), SRC, "beta").unwrap();
        assert!(SRC[span.start..span.end].ends_with(b"tricky\")\n)"));
    }

    #[test]
    fn quoted_string_keys_match() {
        assert!(locate(p(), SRC, "gamma").is_some());
        assert!(locate(p(), SRC, "'gamma'").is_some());
    }

    #[test]
    fn missing_key_and_field_value_not_matched() {
        // "name" only appears as a field, never as an entry key
        assert!(locate(p(), SRC, "name").is_none());
        assert!(locate(p(), SRC, "delta").is_none());
    }

    #[test]
    fn find_all_sorts_descending_and_reports_missing() {
        let all = locate_all(p(), SRC, &["alpha", "nope", "gamma", "beta"]);
        let starts: Vec<_> = all.spans.iter().map(|s| s.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(starts, sorted);
        assert_eq!(all.spans.len(), 3);
        assert_eq!(all.missing, vec!["nope".to_string()]);
    }

    #[test]
    fn prefixed_keys_match_their_own_entry() {
        let src = b"('o1_foo' ('name' \"a\"))\n('o2_foo' ('name' \"b\"))\n(bar ('name' \"c\"))\n";
        assert_eq!(locate(p(), src, "o2_foo").unwrap().entry_key, "o2_foo");
        assert_eq!(locate(p(), src, "'o1_foo'").unwrap().entry_key, "o1_foo");
        assert_eq!(locate(p(), src, "foo").unwrap().entry_key, "o1_foo");
        assert!(locate(p(), src, "o3_foo").is_none());
        // Prefixed request against a bare entry
        assert_eq!(locate(p(), src, "o9_bar").unwrap().entry_key, "bar");

        let all = locate_all(p(), src, &["o1_foo", "o2_foo"]);
        assert_eq!(all.spans.len(), 2);
        assert!(all.missing.is_empty());
    }

    #[test]
    fn unclosed_entry_is_not_found() {
        let src = b"(a ('name' \"x\"))\n(b ('name' \"y\")";
        assert!(locate(p(), src, "a").is_some());
        assert!(locate(p(), src, "b").is_none());
    }

    #[test]
    fn entries_lists_closed_groups() {
        let loc = EntryLocator::new(p(), SRC);
        let keys: Vec<_> = loc.entries().into_iter().map(|s| s.song_key).collect();
        assert_eq!(keys, vec!["alpha", "beta", "gamma"]);
    }
}
