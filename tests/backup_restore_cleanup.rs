//! Integration tests for backup listing, restore and cleanup flows.

use std::fs;

use dtacat::core::backup::BackupKind;
use dtacat::core::backup_ops::RestoreRequest;
use dtacat::core::error::CatalogError;
use dtacat::core::library::Library;
use dtacat::core::remove::RemoveOptions;
use dtacat::core::target::RemovalTarget;
use dtacat::infra::config::Config;

mod util;
use util::{DISC_DTA, USRDIR, make_catalog, manifest_rel};

fn open(tmp: &assert_fs::TempDir) -> Library
{
    Library::open(Some(tmp.path()), Config::default()).expect("open library")
}

/// Remove `foo` from the disc so one manifest and one folder backup exist.
fn remove_foo(lib: &Library)
{
    let report = lib
        .remove(vec![RemovalTarget::new(manifest_rel(None), vec!["foo".into()])], RemoveOptions::default())
        .unwrap();
    assert!(report.ok);
}

#[test]
fn listing_finds_both_kinds()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    remove_foo(&lib);

    let listing = lib.backups();
    assert_eq!(listing.backups.len(), 2);
    assert_eq!(listing.manifest_count, 1);
    assert_eq!(listing.folder_count, 1);
    assert_eq!(listing.total_size, DISC_DTA.len() as u64 + 100);

    let folder = listing
        .backups
        .iter()
        .find(|b| b.kind == BackupKind::Folder)
        .unwrap();
    assert_eq!(folder.original, lib.root().join(USRDIR).join("foo"));
}

#[test]
fn folder_restore_renames_back_and_refuses_an_occupied_target()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    remove_foo(&lib);

    let backup = lib
        .backups()
        .backups
        .into_iter()
        .find(|b| b.kind == BackupKind::Folder)
        .unwrap();

    let req = RestoreRequest { kind: BackupKind::Folder, path: backup.path.clone(), dry_run: false };
    let out = lib.restore(&req).unwrap();
    assert_eq!(out.restored_to, backup.original);
    assert!(backup.original.join("foo.mogg").is_file());
    assert!(!backup.path.exists());

    // Restoring again: the backup is gone
    let err = lib.restore(&req).unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));

    // An occupied target is a conflict
    fs::rename(&backup.original, &backup.path).unwrap();
    fs::create_dir(&backup.original).unwrap();
    let err = lib.restore(&req).unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)));
}

#[test]
fn manifest_restore_sets_the_current_file_aside()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    remove_foo(&lib);
    let disc = lib.root().join(manifest_rel(None));
    let after_removal = fs::read_to_string(&disc).unwrap();

    let backup = lib
        .backups()
        .backups
        .into_iter()
        .find(|b| b.kind == BackupKind::Manifest)
        .unwrap();

    // Relative paths resolve under the catalog root
    let rel = backup
        .path
        .strip_prefix(lib.root())
        .unwrap()
        .to_path_buf();
    let out = lib
        .restore(&RestoreRequest { kind: BackupKind::Manifest, path: rel, dry_run: false })
        .unwrap();

    assert_eq!(fs::read_to_string(&disc).unwrap(), DISC_DTA);
    let aside = out.set_aside.unwrap();
    assert_eq!(fs::read_to_string(&aside).unwrap(), after_removal);
    assert!(backup.path.exists());

    // The set-aside copy is itself a restorable manifest backup
    let listed = lib.backups();
    assert!(listed.backups.iter().any(|b| b.path == aside && b.original == disc));
}

#[test]
fn kind_mismatch_and_escaping_paths_are_rejected()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    remove_foo(&lib);

    let manifest_backup = lib
        .backups()
        .backups
        .into_iter()
        .find(|b| b.kind == BackupKind::Manifest)
        .unwrap();
    let err = lib
        .restore(&RestoreRequest { kind: BackupKind::Folder, path: manifest_backup.path, dry_run: false })
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidName { .. }));

    let err = lib
        .restore(&RestoreRequest {
            kind: BackupKind::Manifest,
            path: "../songs.dta.backup.20240101_000000".into(),
            dry_run: false,
        })
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidName { .. }));
}

#[test]
fn cleanup_goes_by_embedded_stamp()
{
    let tmp = make_catalog();
    let lib = open(&tmp);
    remove_foo(&lib);

    let usr = lib.root().join(USRDIR);
    fs::write(usr.join("songs.dta.backup.20200101_000000"), "old").unwrap();
    fs::create_dir(usr.join("bar.deleted_20200101_000000")).unwrap();
    fs::write(usr.join("bar.deleted_20200101_000000/bar.mogg"), vec![0u8; 10]).unwrap();

    let dry = lib.cleanup(Some(30), true).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.removed.len(), 2);
    assert!(usr.join("songs.dta.backup.20200101_000000").exists());

    let result = lib.cleanup(Some(30), false).unwrap();
    assert_eq!(result.manifests_removed, 1);
    assert_eq!(result.folders_removed, 1);
    assert_eq!(result.bytes_freed, 13);
    assert_eq!(result.kept, 2);
    assert!(result.errors.is_empty());
    assert!(!usr.join("bar.deleted_20200101_000000").exists());

    // Today's backups survive
    assert_eq!(lib.backups().backups.len(), 2);
}
