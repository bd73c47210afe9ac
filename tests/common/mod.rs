// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use rpmts::db::{self, MatchIterator, PackageDatabase};
use rpmts::{
    DbMode, HeaderBuilder, HeaderRef, Result, RpmDb, Tag, TransactionConfig, TransactionSet,
};
use std::cell::Cell;
use std::rc::Rc;
use tempfile::TempDir;

/// Build a shared header from a builder.
pub fn header(b: HeaderBuilder) -> HeaderRef {
    Rc::new(b.build().unwrap())
}

/// Configuration that does not read anything from the host system.
pub fn config(dir: &TempDir) -> TransactionConfig {
    TransactionConfig {
        sysinfo_path: dir.path().join("sysinfo"),
        ..TransactionConfig::default()
    }
}

/// Transaction set without a package database.
pub fn empty_ts() -> (TempDir, TransactionSet) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = config(&temp_dir);
    config.db_mode = DbMode::Disabled;
    let ts = TransactionSet::new(config);
    (temp_dir, ts)
}

/// Create a test database with the given packages installed.
///
/// Returns (TempDir, db_path, offsets) - keep the TempDir alive to prevent cleanup.
pub fn setup_installed_db(installed: Vec<HeaderBuilder>) -> (TempDir, String, Vec<u32>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("rpm.db")
        .to_str()
        .unwrap()
        .to_string();

    db::init(&db_path).unwrap();
    let db = RpmDb::open(&db_path, DbMode::ReadWrite).unwrap();
    let offsets = installed
        .into_iter()
        .map(|b| db.add_package(&b.build().unwrap()).unwrap())
        .collect();

    (temp_dir, db_path, offsets)
}

/// Transaction set that opens `db_path` read-only on first use.
pub fn ts_with_db(dir: &TempDir, db_path: &str) -> TransactionSet {
    TransactionSet::new(config(dir).with_db(db_path, DbMode::ReadOnly))
}

/// Database wrapper counting lookups, for checking which paths consult
/// the installed packages.
pub struct CountingDb {
    inner: RpmDb,
    calls: Cell<usize>,
}

impl CountingDb {
    pub fn new(inner: RpmDb) -> Self {
        Self {
            inner,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl PackageDatabase for CountingDb {
    fn init_iterator(&self, tag: Tag, key: Option<&str>) -> Result<MatchIterator> {
        self.calls.set(self.calls.get() + 1);
        self.inner.init_iterator(tag, key)
    }
}

/// NEVRAs of the elements in their current order.
pub fn order_of(ts: &TransactionSet) -> Vec<String> {
    ts.elements().iter().map(|te| te.nevra().to_string()).collect()
}
