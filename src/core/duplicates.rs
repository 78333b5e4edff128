//! Duplicate detection across packs.
//!
//! Three passes, each over the survivors of the previous one: same numeric
//! `song_id`, then same canonical `song_key`, then same normalized
//! `(artist, name, album)`. Within a group the best-ranked pack keeps the
//! song and inherits metadata it lacks from the copies it beats.

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::classify::is_content_id;
use crate::core::extract::SongRecord;
use crate::infra::utils::NameUtils;

/// What a duplicate group has in common.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum MatchKey {
    SongId { song_id: i64 },
    SongKey { song_key: String },
    Metadata { artist: String, name: String, album: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub key: MatchKey,
    /// Sorted by pack priority, keep first
    pub members: Vec<SongRecord>,
    /// Keeper with metadata filled in from the others
    pub recommended_keep: SongRecord,
    pub recommended_delete: Vec<SongRecord>,
    pub size_to_free: u64,
}

/// A record removed by [`dedupe`].
#[derive(Debug, Clone, Serialize)]
pub struct DroppedSong {
    pub song_key: String,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub source_file: std::path::PathBuf,
    pub pack_name: String,
    pub kept_pack: String,
    pub matched_by: MatchKey,
}

/// Catalog with one record per song.
#[derive(Debug, Clone, Serialize)]
pub struct Deduplicated {
    pub kept: Vec<SongRecord>,
    pub dropped: Vec<DroppedSong>,
}

/// Lower wins: pack type first, then human-named packs over content ids.
pub fn dedup_priority(r: &SongRecord) -> (u8, bool) {
    (r.pack_type.priority(), is_content_id(&r.pack_name))
}

fn by_song_id(r: &SongRecord) -> Option<MatchKey> {
    r.song_id
        .filter(|id| *id > 0)
        .map(|song_id| MatchKey::SongId { song_id })
}

fn by_song_key(r: &SongRecord) -> Option<MatchKey> {
    Some(MatchKey::SongKey { song_key: r.song_key.clone() })
}

fn by_metadata(r: &SongRecord) -> Option<MatchKey> {
    let artist = NameUtils::normalize_opt(r.artist.as_deref());
    let name = NameUtils::normalize_opt(r.name.as_deref());
    if artist.is_empty() || name.is_empty() {
        return None;
    }
    Some(MatchKey::Metadata { artist, name, album: NameUtils::normalize_opt(r.album.as_deref()) })
}

const PASSES: [fn(&SongRecord) -> Option<MatchKey>; 3] = [by_song_id, by_song_key, by_metadata];

/// One resolved group, as indices into the working set.
struct Resolved {
    key: MatchKey,
    /// Priority order, keeper first
    order: Vec<usize>,
}

/// Run every pass. Returns the survivors in input order and the groups found,
/// each holding clones taken when its pass ran.
fn resolve(records: &[SongRecord]) -> (Vec<SongRecord>, Vec<(MatchKey, Vec<SongRecord>)>) {
    let mut working: Vec<SongRecord> = records.to_vec();
    let mut found = Vec::new();

    for key_of in PASSES {
        let mut groups: IndexMap<MatchKey, Vec<usize>> = IndexMap::new();
        for (i, r) in working.iter().enumerate() {
            if let Some(k) = key_of(r) {
                groups.entry(k).or_default().push(i);
            }
        }

        let resolved: Vec<Resolved> = groups
            .into_iter()
            .filter(|(_, idx)| idx.len() >= 2)
            .map(|(key, mut order)| {
                // Stable: equal priorities keep scan order
                order.sort_by_key(|&i| dedup_priority(&working[i]));
                Resolved { key, order }
            })
            .collect();

        let mut dropped = vec![false; working.len()];
        for group in resolved {
            let keep = group.order[0];
            for &other in &group.order[1..] {
                let donor = working[other].clone();
                working[keep].inherit_missing(&donor);
                dropped[other] = true;
            }
            let members: Vec<SongRecord> = group
                .order
                .iter()
                .map(|&i| working[i].clone())
                .collect();
            found.push((group.key, members));
        }

        working = working
            .into_iter()
            .zip(dropped)
            .filter_map(|(r, gone)| (!gone).then_some(r))
            .collect();
    }

    (working, found)
}

/// Duplicate groups from all three passes, in pass order.
///
/// `size_of` measures what deleting one record would free; the CLI passes
/// the on-disk size of the song folder.
pub fn find_duplicates<F>(records: &[SongRecord], size_of: F) -> Vec<DuplicateGroup>
where
    F: Fn(&SongRecord) -> u64,
{
    let (_, found) = resolve(records);
    found
        .into_iter()
        .map(|(key, members)| {
            let recommended_delete = members[1..].to_vec();
            let size_to_free = recommended_delete.iter().map(&size_of).sum::<u64>();
            DuplicateGroup {
                key,
                recommended_keep: members[0].clone(),
                recommended_delete,
                members,
                size_to_free,
            }
        })
        .collect()
}

/// Collapse the catalog to one record per song, reporting what was dropped.
pub fn dedupe(records: &[SongRecord]) -> Deduplicated {
    let (kept, found) = resolve(records);
    let dropped = found
        .into_iter()
        .flat_map(|(key, members)| {
            let kept_pack = members[0].pack_name.clone();
            members
                .into_iter()
                .skip(1)
                .map(move |r| DroppedSong {
                    song_key: r.song_key,
                    name: r.name,
                    artist: r.artist,
                    source_file: r.source_file,
                    pack_name: r.pack_name,
                    kept_pack: kept_pack.clone(),
                    matched_by: key.clone(),
                })
        })
        .collect();
    Deduplicated { kept, dropped }
}
