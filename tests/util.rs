//! Shared test utilities for integration tests
//!
//! Builds a small catalog on disk: a disc pack, an official DLC pack and a
//! custom pack, each with song folders next to its manifest.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;

pub const USRDIR: &str = "game/BLUS30050/USRDIR";

pub const DISC_DTA: &str = "\
( 'foo' ('name' \"Foo Song\") ('artist' \"Foo Artist\") )
( 'bar' ('name' \"Bar Song\") ('artist' \"Bar Artist\") )
";

pub const DLC_DTA: &str = "\
(
   'longview'
   ('name' \"Longview\")
   ('artist' \"Green Day\")
   ('album_name' \"Dookie\")
   ('year_released' 1994)
   ('genre' 'punk')
)
(
   'o12345_chump'
   ('name' \"Chump\")
   ('artist' \"Green Day\")
   ('song_id' 1012345)
)
";

pub const CUSTOM_DTA: &str = "\
; hand-edited custom pack
(chump
   (name \"chump \")
   (artist \" green day\")
)
(
   'basket'
   ('name' \"Basket \\\"Case\\\"\")
   ('artist' \"Green Day\")
)
";

/// Manifest path of `pack` relative to the catalog root; `None` is the disc.
pub fn manifest_rel(pack: Option<&str>) -> String
{
    match pack
    {
        Some(p) => format!("{USRDIR}/{p}/songs/songs.dta"),
        None => format!("{USRDIR}/songs.dta"),
    }
}

/// Write a manifest plus one folder of `size` bytes per listed song.
pub fn add_pack(
    tmp: &assert_fs::TempDir,
    pack: Option<&str>,
    dta: &str,
    folders: &[(&str, usize)],
) -> PathBuf
{
    let rel = manifest_rel(pack);
    tmp.child(&rel)
        .write_str(dta)
        .expect("write manifest");

    let dir = Path::new(&rel)
        .parent()
        .expect("manifest has a parent")
        .to_path_buf();
    for (name, size) in folders
    {
        tmp.child(dir.join(name).join(format!("{name}.mogg")))
            .write_binary(&vec![7u8; *size])
            .expect("write song file");
    }

    tmp.path().join(rel)
}

/// Three packs: disc (`foo`, `bar`), `rb3_dlc` (`longview`, `chump`) and
/// `my_custom` (`chump`, `basket`).
pub fn make_catalog() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    add_pack(&tmp, None, DISC_DTA, &[("foo", 100), ("bar", 200)]);
    add_pack(&tmp, Some("rb3_dlc"), DLC_DTA, &[("longview", 300), ("o12345_chump", 400)]);
    add_pack(&tmp, Some("my_custom"), CUSTOM_DTA, &[("chump", 500), ("basket", 600)]);

    tmp
}

/// Canonicalized root, matching what the library reports.
pub fn root(tmp: &assert_fs::TempDir) -> PathBuf
{
    dunce::canonicalize(tmp.path()).expect("canonical root")
}
