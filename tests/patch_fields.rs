//! Field patching keeps every byte outside the edited values.

use std::fs;

use dtacat::core::error::CatalogError;
use dtacat::core::library::Library;
use dtacat::core::mutate::FieldValue;
use dtacat::infra::config::Config;
use indexmap::IndexMap;

mod util;
use util::{CUSTOM_DTA, DLC_DTA, make_catalog, manifest_rel};

fn open(tmp: &assert_fs::TempDir) -> Library
{
    Library::open(Some(tmp.path()), Config::default()).expect("open library")
}

fn fields(pairs: &[(&str, FieldValue)]) -> IndexMap<String, FieldValue>
{
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn replaces_in_place_and_appends_missing_fields()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let dlc = manifest_rel(Some("rb3_dlc"));

    let out = lib
        .patch(
            dlc.as_ref(),
            "longview",
            &fields(&[
                ("genre", FieldValue::Symbol("rock".into())),
                ("decade", FieldValue::Symbol("the90s".into())),
            ]),
            false,
        )
        .unwrap();

    assert!(out.ok());
    assert_eq!(out.patched, vec!["genre".to_string()]);
    assert_eq!(out.added, vec!["decade".to_string()]);

    let expected = DLC_DTA.replacen(
        "   ('genre' 'punk')\n",
        "   ('genre' 'rock')\n   ('decade' 'the90s')\n",
        1,
    );
    assert_eq!(fs::read_to_string(tmp.path().join(&dlc)).unwrap(), expected);
    assert_eq!(fs::read_to_string(out.backup.unwrap()).unwrap(), DLC_DTA);
}

#[test]
fn inserted_names_follow_unquoted_style()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let custom = manifest_rel(Some("my_custom"));

    lib.patch(custom.as_ref(), "chump", &fields(&[("album", FieldValue::Str("Dookie".into()))]), false)
        .unwrap();

    let expected = CUSTOM_DTA.replacen(
        "   (artist \" green day\")\n",
        "   (artist \" green day\")\n   (album \"Dookie\")\n",
        1,
    );
    assert_eq!(fs::read_to_string(tmp.path().join(&custom)).unwrap(), expected);
}

#[test]
fn string_values_are_escaped()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let dlc = manifest_rel(Some("rb3_dlc"));

    lib.patch(dlc.as_ref(), "chump", &fields(&[("name", FieldValue::Str("Chump \"Live\"".into()))]), false)
        .unwrap();

    let text = fs::read_to_string(tmp.path().join(&dlc)).unwrap();
    assert!(text.contains("('name' \"Chump \\\"Live\\\"\")"));

    let snap = lib.scan();
    let chump = snap
        .records
        .iter()
        .find(|r| r.entry_key == "o12345_chump")
        .unwrap();
    assert_eq!(chump.name.as_deref(), Some("Chump \"Live\""));
}

#[test]
fn per_field_failures_do_not_block_the_rest()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let dlc = manifest_rel(Some("rb3_dlc"));

    let out = lib
        .patch(
            dlc.as_ref(),
            "longview",
            &fields(&[
                ("bad name", FieldValue::Int(1)),
                ("artist", FieldValue::Str("   ".into())),
                ("year_released", FieldValue::Int(1995)),
            ]),
            false,
        )
        .unwrap();

    assert_eq!(out.patched, vec!["year_released".to_string()]);
    assert_eq!(out.failed.len(), 2);
    assert!(
        fs::read_to_string(tmp.path().join(&dlc))
            .unwrap()
            .contains("('year_released' 1995)")
    );
}

#[test]
fn all_fields_failing_writes_nothing()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let dlc = manifest_rel(Some("rb3_dlc"));

    let out = lib
        .patch(dlc.as_ref(), "longview", &fields(&[("name", FieldValue::Str(String::new()))]), false)
        .unwrap();

    assert!(!out.ok());
    assert!(out.backup.is_none());
    assert_eq!(fs::read_to_string(tmp.path().join(&dlc)).unwrap(), DLC_DTA);
}

#[test]
fn unknown_entry_is_an_error()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    let err = lib
        .patch(manifest_rel(None).as_ref(), "ghost", &fields(&[("name", FieldValue::Int(1))]), false)
        .unwrap_err();
    assert!(matches!(err, CatalogError::EntryNotFound { .. }));
}
