// tests/database.rs

//! Package database tests: initialization, open modes, indexed lookups,
//! persistent depends cache and configuration files.

mod common;

use common::{config, header, setup_installed_db};
use rpmts::cache::CacheStore;
use rpmts::db;
use rpmts::{
    DbMode, Error, Header, HeaderBuilder, PackageDatabase, RpmDb, Tag, TransactionConfig,
    TransactionSet,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_init_and_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    drop(temp_file);

    db::init(&db_path).unwrap();
    // A second init on an existing database is harmless
    db::init(&db_path).unwrap();

    let db = RpmDb::open(&db_path, DbMode::ReadWrite).unwrap();
    assert_eq!(db.count().unwrap(), 0);
}

#[test]
fn test_open_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("missing.db");

    let result = RpmDb::open(db_path.to_str().unwrap(), DbMode::ReadOnly);
    assert!(matches!(result, Err(Error::DatabaseNotFound(_))));

    let result = RpmDb::open(db_path.to_str().unwrap(), DbMode::Disabled);
    assert!(matches!(result, Err(Error::DatabaseOpen(_))));
}

#[test]
fn test_indexed_lookups() {
    let (_dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("bash", "5.2", "1")
            .provides("/bin/sh")
            .requires("glibc")
            .conflicts("zsh-compat < 2")
            .file("/usr/bin/bash"),
        HeaderBuilder::new("glibc", "2.38", "3"),
    ]);
    let db = RpmDb::open(&db_path, DbMode::ReadOnly).unwrap();

    for (tag, key) in [
        (Tag::Name, "bash"),
        (Tag::ProvideName, "/bin/sh"),
        (Tag::RequireName, "glibc"),
        (Tag::ConflictName, "zsh-compat"),
        (Tag::Basenames, "/usr/bin/bash"),
    ] {
        let found: Vec<u32> = db
            .init_iterator(tag, Some(key))
            .unwrap()
            .map(|m| m.offset)
            .collect();
        assert_eq!(found, vec![offsets[0]], "lookup by {} {}", tag, key);
    }

    let all = db.init_iterator(Tag::Name, None).unwrap();
    assert_eq!(all.count_remaining(), 2);

    assert!(db.init_iterator(Tag::Version, Some("5.2")).is_err());
}

#[test]
fn test_stored_header_round_trip() {
    let (_dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("bash", "5.2", "1")
            .epoch(1)
            .requires("glibc >= 2.34")
            .file("/usr/bin/bash"),
    ]);
    let db = RpmDb::open(&db_path, DbMode::ReadOnly).unwrap();

    let h = db.get(offsets[0]).unwrap().unwrap();
    assert_eq!(h.nevra(), "bash-1:5.2-1.x86_64");
    assert_eq!(h.get_strings(Tag::RequireName), &["glibc".to_string()]);
    assert!(db.get(offsets[0] + 100).unwrap().is_none());
}

#[test]
fn test_prune_skips_queued_offsets() {
    let (_dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("kernel", "6.1", "1"),
        HeaderBuilder::new("kernel", "6.2", "1"),
    ]);
    let db = RpmDb::open(&db_path, DbMode::ReadOnly).unwrap();

    let mut mi = db.init_iterator(Tag::Name, Some("kernel")).unwrap();
    mi.prune(&[offsets[0]]);
    let left: Vec<String> = mi.map(|m| m.header.version().to_string()).collect();
    assert_eq!(left, vec!["6.2"]);
}

#[test]
fn test_database_opened_lazily_read_only() {
    let (dir, db_path, _) = setup_installed_db(vec![HeaderBuilder::new("glibc", "2.38", "1")]);
    let mut ts = TransactionSet::new(config(&dir).with_db(&db_path, DbMode::ReadOnly));

    ts.add_install_element(
        header(HeaderBuilder::new("app", "1", "1").requires("glibc")),
        None,
        false,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.check().unwrap(), 0);
}

#[test]
fn test_unreadable_database_is_not_fatal_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.db");
    let mut ts = TransactionSet::new(config(&dir).with_db(&missing, DbMode::ReadOnly));

    ts.add_install_element(
        header(HeaderBuilder::new("app", "1", "1").requires("glibc")),
        None,
        true,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.check().unwrap(), 1);
}

#[test]
fn test_unopenable_database_is_fatal_read_write() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.db");
    let mut ts = TransactionSet::new(config(&dir).with_db(&missing, DbMode::ReadWrite));

    let result = ts.add_install_element(
        header(HeaderBuilder::new("app", "1", "1")),
        None,
        true,
        vec![],
    );
    assert!(matches!(result, Err(Error::DatabaseOpen(_))));
}

#[test]
fn test_disabled_database_is_never_opened() {
    let (dir, db_path, _) = setup_installed_db(vec![HeaderBuilder::new("P", "1.0", "1")]);
    let mut ts = TransactionSet::new(config(&dir).with_db(&db_path, DbMode::Disabled));

    ts.add_install_element(header(HeaderBuilder::new("P", "2.0", "1")), None, true, vec![])
        .unwrap();

    assert_eq!(ts.num_removed(), 0);
}

#[test]
fn test_verdicts_persist_in_read_write_database() {
    let (dir, db_path, _) = setup_installed_db(vec![HeaderBuilder::new("glibc", "2.38", "1")]);
    let mut ts = TransactionSet::new(config(&dir).with_db(&db_path, DbMode::ReadWrite));

    ts.add_install_element(
        header(
            HeaderBuilder::new("app", "1", "1")
                .requires("glibc >= 2.30")
                .requires("libmissing"),
        ),
        None,
        false,
        vec![],
    )
    .unwrap();
    assert_eq!(ts.check().unwrap(), 1);

    let db = RpmDb::open(&db_path, DbMode::ReadOnly).unwrap();
    assert_eq!(CacheStore::get(&db, "glibc >= 2.30").unwrap(), Some(0));
    assert_eq!(CacheStore::get(&db, "libmissing").unwrap(), Some(1));

    // Changing the installed set invalidates them
    drop(db);
    let db = RpmDb::open(&db_path, DbMode::ReadWrite).unwrap();
    db.add_package(&HeaderBuilder::new("libmissing", "1", "1").build().unwrap())
        .unwrap();
    assert_eq!(CacheStore::get(&db, "libmissing").unwrap(), None);
}

#[test]
fn test_config_loaded_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
root = "/mnt/sysimage"
db_path = "/var/lib/rpmts/rpm.db"
db_mode = "read_write"
color = 3
no_suggest = true
anaconda_order = true
dependency_whiteout = ["filesystem>setup", "broken"]
max_rescans = 2

[macros]
_with_selinux = "1"
"#
    )
    .unwrap();

    let config = TransactionConfig::load(file.path()).unwrap();
    assert_eq!(config.root.to_str(), Some("/mnt/sysimage"));
    assert_eq!(config.db_mode, DbMode::ReadWrite);
    assert_eq!(config.color, 3);
    assert!(config.no_suggest);
    assert!(config.anaconda_order);
    assert!(config.no_promote);
    assert_eq!(config.max_rescans, 2);
    assert_eq!(config.macros.get("_with_selinux").map(String::as_str), Some("1"));

    let whiteouts = config.whiteouts();
    assert_eq!(whiteouts.len(), 1);
    assert_eq!(whiteouts[0].successor, "filesystem");
    assert_eq!(whiteouts[0].predecessor, "setup");
}

#[test]
fn test_bad_config_is_rejected() {
    let result = TransactionConfig::from_toml("db_mode = \"sometimes\"");
    assert!(matches!(result, Err(Error::Config(_))));
}
