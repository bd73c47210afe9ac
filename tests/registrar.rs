// tests/registrar.rs

//! Element registration tests: deduplication, upgrades, obsoletes, erasures.

mod common;

use common::{config, empty_ts, header, order_of, setup_installed_db, ts_with_db};
use rpmts::transaction::{ChainReason, ElementType};
use rpmts::{AddOutcome, DbMode, Error, HeaderBuilder, TransactionSet};

#[test]
fn test_duplicate_add_is_idempotent() {
    let (_dir, mut ts) = empty_ts();
    let h = header(HeaderBuilder::new("A", "1", "1").hdrid("0123abcd"));

    let first = ts.add_install_element(h.clone(), Some("a.rpm".into()), false, vec![]);
    let second = ts.add_install_element(h, Some("a.rpm".into()), false, vec![]);

    assert_eq!(first.unwrap(), AddOutcome::Added(0));
    assert_eq!(second.unwrap(), AddOutcome::Skipped);
    assert_eq!(ts.check().unwrap(), 0);
    assert_eq!(ts.order(), rpmts::OrderOutcome::Ordered);
    assert_eq!(order_of(&ts), vec!["A-1-1.x86_64"]);
}

#[test]
fn test_newer_add_wins() {
    let (_dir, mut ts) = empty_ts();
    ts.add_install_element(header(HeaderBuilder::new("P", "2.0", "1")), None, false, vec![])
        .unwrap();
    let older = ts
        .add_install_element(header(HeaderBuilder::new("P", "1.0", "1")), None, false, vec![])
        .unwrap();

    assert_eq!(older, AddOutcome::Skipped);
    assert_eq!(ts.order(), rpmts::OrderOutcome::Ordered);
    assert_eq!(order_of(&ts), vec!["P-2.0-1.x86_64"]);
}

#[test]
fn test_older_add_is_replaced_in_place() {
    let (_dir, mut ts) = empty_ts();
    ts.add_install_element(header(HeaderBuilder::new("P", "1.0", "1")), None, false, vec![])
        .unwrap();
    ts.add_install_element(header(HeaderBuilder::new("Q", "1.0", "1")), None, false, vec![])
        .unwrap();
    let key_before = ts.element(0).unwrap().added_key();

    let newer = ts
        .add_install_element(
            header(HeaderBuilder::new("P", "1.10", "1")),
            Some("p-new.rpm".into()),
            false,
            vec![],
        )
        .unwrap();

    assert_eq!(newer, AddOutcome::Replaced(0));
    assert_eq!(ts.len(), 2);
    assert_eq!(ts.num_added(), 2);
    let p = ts.element(0).unwrap();
    assert_eq!(p.nevra(), "P-1.10-1.x86_64");
    assert_eq!(p.key(), Some("p-new.rpm"));
    assert_eq!(p.added_key(), key_before);
    assert_eq!(ts.element(1).unwrap().name(), "Q");
}

#[test]
fn test_same_name_other_arch_kept_with_color() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = config(&temp_dir);
    config.db_mode = DbMode::Disabled;
    config.color = 3;
    let mut ts = TransactionSet::new(config);

    ts.add_install_element(header(HeaderBuilder::new("glibc", "2.5", "1")), None, false, vec![])
        .unwrap();
    let other = ts
        .add_install_element(
            header(HeaderBuilder::new("glibc", "2.5", "1").arch("i686")),
            None,
            false,
            vec![],
        )
        .unwrap();

    assert_eq!(other, AddOutcome::Added(1));
}

#[test]
fn test_missing_arch_is_rejected() {
    let (_dir, mut ts) = empty_ts();
    let result = ts.add_install_element(
        header(HeaderBuilder::new("A", "1", "1").without_arch()),
        None,
        false,
        vec![],
    );

    match result {
        Err(Error::MissingTag { package, tag }) => {
            assert_eq!(package, "A-1-1");
            assert_eq!(tag, "Arch");
        }
        other => panic!("expected MissingTag, got {:?}", other),
    }
    assert!(ts.is_empty());
}

#[test]
fn test_source_packages_bypass_dedup() {
    let (_dir, mut ts) = empty_ts();
    let srpm = header(HeaderBuilder::new("A", "1", "1").source());

    ts.add_install_element(srpm.clone(), None, false, vec![]).unwrap();
    let again = ts.add_install_element(srpm, None, false, vec![]).unwrap();

    assert_eq!(again, AddOutcome::Added(1));
    assert_eq!(ts.check().unwrap(), 0);
}

#[test]
fn test_upgrade_erases_installed_instance() {
    let (dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("P", "1.0", "1"),
        HeaderBuilder::new("R", "1.0", "1"),
    ]);
    let mut ts = ts_with_db(&dir, &db_path);

    let outcome = ts
        .add_install_element(header(HeaderBuilder::new("P", "2.0", "1")), None, true, vec![])
        .unwrap();

    assert_eq!(outcome, AddOutcome::Added(0));
    assert_eq!(ts.num_removed(), 1);
    let erased = ts.element(1).unwrap();
    assert_eq!(erased.element_type(), ElementType::Removed);
    assert_eq!(erased.db_offset(), Some(offsets[0]));
    assert_eq!(erased.depends_on(), ts.element(0).unwrap().added_key());

    let p = ts.element(0).unwrap();
    assert_eq!(p.flinks().len(), 1);
    assert_eq!(p.flinks()[0].reason, ChainReason::Upgrades);
    assert_eq!(p.flinks()[0].nevra, "P-1.0-1.x86_64");
    assert_eq!(erased.blinks()[0].nevra, "P-2.0-1.x86_64");
}

#[test]
fn test_install_without_upgrade_keeps_installed() {
    let (dir, db_path, _) = setup_installed_db(vec![HeaderBuilder::new("P", "1.0", "1")]);
    let mut ts = ts_with_db(&dir, &db_path);

    ts.add_install_element(header(HeaderBuilder::new("P", "2.0", "1")), None, false, vec![])
        .unwrap();

    assert_eq!(ts.num_removed(), 0);
}

#[test]
fn test_upgrade_skips_identical_installed_header() {
    let (dir, db_path, _) =
        setup_installed_db(vec![HeaderBuilder::new("P", "1.0", "1").hdrid("feed")]);
    let mut ts = ts_with_db(&dir, &db_path);

    ts.add_install_element(
        header(HeaderBuilder::new("P", "1.0", "1").hdrid("feed")),
        None,
        true,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.num_removed(), 0);
}

#[test]
fn test_versioned_obsoletes_erase_match() {
    let (dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("old", "1", "1"),
        HeaderBuilder::new("old-extra", "3", "1").provides("old = 3"),
    ]);
    let mut ts = ts_with_db(&dir, &db_path);

    ts.add_install_element(
        header(HeaderBuilder::new("new", "1", "1").obsoletes("old < 2")),
        None,
        false,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.num_removed(), 1);
    let erased = ts.element(1).unwrap();
    assert_eq!(erased.db_offset(), Some(offsets[0]));
    assert_eq!(ts.element(0).unwrap().flinks()[0].reason, ChainReason::Obsoletes);
}

#[test]
fn test_unversioned_obsoletes_with_legacy_matching() {
    let installed = || vec![HeaderBuilder::new("oldlib", "1", "1").provides("compat")];

    let (dir, db_path, _) = setup_installed_db(installed());
    let mut ts = ts_with_db(&dir, &db_path);
    ts.add_install_element(
        header(HeaderBuilder::new("newlib", "1", "1").obsoletes("compat")),
        None,
        false,
        vec![],
    )
    .unwrap();
    assert_eq!(ts.num_removed(), 1);

    let (dir, db_path, _) = setup_installed_db(installed());
    let mut config = config(&dir).with_db(&db_path, DbMode::ReadOnly);
    config.legacy_unversioned_obsoletes = false;
    let mut ts = TransactionSet::new(config);
    ts.add_install_element(
        header(HeaderBuilder::new("newlib", "1", "1").obsoletes("compat")),
        None,
        false,
        vec![],
    )
    .unwrap();
    assert_eq!(ts.num_removed(), 0);
}

#[test]
fn test_self_obsoletes_ignored() {
    let (dir, db_path, _) = setup_installed_db(vec![HeaderBuilder::new("P", "1.0", "1")]);
    let mut ts = ts_with_db(&dir, &db_path);

    ts.add_install_element(
        header(HeaderBuilder::new("P", "2.0", "1").obsoletes("P < 2.0")),
        None,
        false,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.num_removed(), 0);
}

#[test]
fn test_erase_is_queued_once() {
    let (dir, db_path, offsets) = setup_installed_db(vec![HeaderBuilder::new("P", "1.0", "1")]);
    let mut ts = ts_with_db(&dir, &db_path);

    let installed = header(HeaderBuilder::new("P", "1.0", "1"));
    let first = ts.add_erase_element(installed.clone(), offsets[0]).unwrap();
    let second = ts.add_erase_element(installed, offsets[0]).unwrap();

    assert_eq!(first, second);
    assert_eq!(ts.num_removed(), 1);

    // The upgrade finds the queued instance instead of adding another
    ts.add_install_element(header(HeaderBuilder::new("P", "2.0", "1")), None, true, vec![])
        .unwrap();
    assert_eq!(ts.num_removed(), 1);
    assert_eq!(ts.len(), 2);
}

#[test]
fn test_obsoletes_by_path_erase_file_owner() {
    let (dir, db_path, offsets) = setup_installed_db(vec![
        HeaderBuilder::new("oldtool", "1", "1").file("/usr/bin/oldtool"),
        HeaderBuilder::new("other", "1", "1").file("/usr/bin/other"),
    ]);
    let mut ts = ts_with_db(&dir, &db_path);

    ts.add_install_element(
        header(HeaderBuilder::new("newtool", "2", "1").obsoletes("/usr/bin/oldtool")),
        None,
        false,
        vec![],
    )
    .unwrap();

    assert_eq!(ts.num_removed(), 1);
    let erased = ts.element(1).unwrap();
    assert_eq!(erased.db_offset(), Some(offsets[0]));
    assert_eq!(erased.nevra(), "oldtool-1-1.x86_64");
    assert_eq!(ts.element(0).unwrap().flinks()[0].reason, ChainReason::Obsoletes);
}
