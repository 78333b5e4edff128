//! Structured song record produced from one manifest entry.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::classify::{PackInfo, PackType};

/// One song as described by a manifest entry plus the pack it lives in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRecord {
    /// Canonical key: quotes and `o<digits>_` prefix stripped
    pub song_key: String,
    /// Key as written, quotes stripped; names the song folder
    pub entry_key: String,
    pub song_id: Option<i64>,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub sub_genre: Option<String>,
    pub decade: Option<String>,
    pub pack_type: PackType,
    pub pack_name: String,
    pub source_file: PathBuf,
    pub title_id: Option<String>,
    /// Any field or the pack path mentions a Eurovision keyword
    pub is_eurovision: bool,
}

const EUROVISION_KEYWORDS: &[&str] = &["eurovision"];

impl SongRecord {
    /// Attach pack identity after extraction.
    pub fn with_pack(mut self, pack: &PackInfo, source: &Path) -> Self {
        self.pack_type = pack.pack_type;
        self.pack_name = pack.label().to_string();
        self.title_id = pack.title_id.clone();
        self.source_file = source.to_path_buf();
        self.is_eurovision = self.mentions_eurovision();
        self
    }

    fn mentions_eurovision(&self) -> bool {
        let source = self.source_file.to_string_lossy();
        let hay = [
            Some(self.song_key.as_str()),
            self.name.as_deref(),
            self.artist.as_deref(),
            self.album.as_deref(),
            self.genre.as_deref(),
            self.sub_genre.as_deref(),
            self.decade.as_deref(),
            Some(self.pack_name.as_str()),
            Some(source.as_ref()),
        ]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
        EUROVISION_KEYWORDS.iter().any(|k| hay.contains(k))
    }

    /// Fill missing year, album, genre, sub-genre and decade from `other`.
    pub fn inherit_missing(&mut self, other: &SongRecord) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.year, &other.year);
        fill(&mut self.album, &other.album);
        fill(&mut self.genre, &other.genre);
        fill(&mut self.sub_genre, &other.sub_genre);
        fill(&mut self.decade, &other.decade);
    }

    /// Folder holding this song's audio and artwork, next to the manifest.
    pub fn song_dir(&self) -> PathBuf {
        let base = self.source_file.parent().unwrap_or_else(|| Path::new("."));
        let by_entry = base.join(&self.entry_key);
        if by_entry.exists() || self.entry_key == self.song_key {
            by_entry
        } else {
            base.join(&self.song_key)
        }
    }

    /// `"Artist - Name"` with placeholders for missing parts.
    pub fn display_title(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("?"),
            self.name.as_deref().unwrap_or("?")
        )
    }
}
