//! Pack classification from a manifest's location on disk.
//!
//! Layout: `.../game/<TITLE_ID>/USRDIR/<pack>/songs.dta`. The disc pack keeps
//! its manifest directly under `USRDIR/`.

use std::{
    fmt,
    path::{Component, Path},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Display label of the on-disc pack.
pub const BASE_LABEL: &str = "BASE";

const USRDIR: &str = "USRDIR";

static CONTENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,2}\d{5,}").expect("static content-id pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackType {
    Disc,
    Export,
    Dlc,
    Custom,
    Other,
}

impl PackType {
    /// Keep order for duplicate resolution, lower wins.
    pub fn priority(self) -> u8 {
        match self {
            PackType::Disc => 0,
            PackType::Export => 1,
            PackType::Dlc => 2,
            PackType::Custom => 3,
            PackType::Other => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackType::Disc => "disc",
            PackType::Export => "export",
            PackType::Dlc => "dlc",
            PackType::Custom => "custom",
            PackType::Other => "other",
        }
    }
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackInfo {
    pub title_id: Option<String>,
    pub pack_name: Option<String>,
    pub pack_type: PackType,
}

impl PackInfo {
    /// Pack name, or `BASE` for the disc pack.
    pub fn label(&self) -> &str {
        self.pack_name.as_deref().unwrap_or(BASE_LABEL)
    }
}

/// Classify the pack a manifest belongs to.
pub fn classify(manifest: &Path) -> PackInfo {
    let parts: Vec<&str> = manifest
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    let usrdir = parts.iter().rposition(|p| *p == USRDIR);

    let title_id = usrdir
        .filter(|&i| i >= 2 && parts[i - 2] == "game")
        .map(|i| parts[i - 1].to_string());

    // A component after USRDIR that is not the manifest file itself
    let pack_name = usrdir
        .and_then(|i| parts.get(i + 1).map(|name| (i + 1, *name)))
        .filter(|&(idx, _)| idx + 1 < parts.len())
        .map(|(_, name)| name.to_string());

    let pack_type = pack_type_for(pack_name.as_deref());

    PackInfo { title_id, pack_name, pack_type }
}

/// Store content-id folder name, e.g. `O799159THEBEATLESROCKBAND3`.
pub fn is_content_id(pack_name: &str) -> bool {
    CONTENT_ID.is_match(pack_name)
}

fn pack_type_for(name: Option<&str>) -> PackType {
    let Some(name) = name else {
        return PackType::Disc;
    };
    let lower = name.to_lowercase();

    if lower.contains("custom") {
        PackType::Custom
    } else if lower.contains("export") {
        PackType::Export
    } else if ["dlc", "pack", "rb4-to-rb2"].iter().any(|m| lower.contains(m)) {
        PackType::Dlc
    } else if is_content_id(name) {
        PackType::Dlc
    } else {
        PackType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(p: &str) -> PackInfo {
        classify(Path::new(p))
    }

    #[test]
    fn disc_pack_sits_directly_under_usrdir() {
        let i = info("/lib/game/BLUS30050/USRDIR/songs.dta");
        assert_eq!(i.pack_type, PackType::Disc);
        assert_eq!(i.pack_name, None);
        assert_eq!(i.label(), "BASE");
        assert_eq!(i.title_id.as_deref(), Some("BLUS30050"));
    }

    #[test]
    fn rb4_to_rb2_is_dlc() {
        let i = info("/lib/game/BLUS30050/USRDIR/rb4-to-rb2-pack/songs.dta");
        assert_eq!(i.pack_type, PackType::Dlc);
        assert_eq!(i.pack_name.as_deref(), Some("rb4-to-rb2-pack"));
    }

    #[test]
    fn name_priority_order() {
        assert_eq!(info("/g/USRDIR/custom_export/songs/songs.dta").pack_type, PackType::Custom);
        assert_eq!(info("/g/USRDIR/RB3Export/songs/songs.dta").pack_type, PackType::Export);
        assert_eq!(info("/g/USRDIR/Weekly_DLC/songs/songs.dta").pack_type, PackType::Dlc);
        assert_eq!(info("/g/USRDIR/UP8802123/songs/songs.dta").pack_type, PackType::Dlc);
        assert_eq!(info("/g/USRDIR/misc/songs/songs.dta").pack_type, PackType::Other);
    }

    #[test]
    fn content_id_names_are_case_sensitive() {
        assert!(is_content_id("O799159THEBEATLESROCKBAND3"));
        assert!(is_content_id("UP8802123"));
        assert!(!is_content_id("o799159thebeatles"));
        assert!(!is_content_id("beatles_dlc"));
    }

    #[test]
    fn title_id_needs_game_parent() {
        assert_eq!(info("/x/BLUS30050/USRDIR/a/songs.dta").title_id, None);
    }

    #[test]
    fn no_usrdir_is_disc_without_title() {
        let i = info("/tmp/songs.dta");
        assert_eq!(i.pack_type, PackType::Disc);
        assert_eq!(i.title_id, None);
    }

    #[test]
    fn priorities_rank_disc_first() {
        let mut v = vec![PackType::Other, PackType::Custom, PackType::Dlc, PackType::Export, PackType::Disc];
        v.sort_by_key(|t| t.priority());
        assert_eq!(v, vec![PackType::Disc, PackType::Export, PackType::Dlc, PackType::Custom, PackType::Other]);
    }
}
