// src/db/mod.rs

//! Installed package database
//!
//! The transaction code sees installed packages only through the
//! [`PackageDatabase`] trait: iterate the headers stored under a tag and
//! key, each paired with its instance offset. [`RpmDb`] is the SQLite
//! implementation, which also hosts the persistent depends cache.

pub mod schema;

use crate::cache::CacheStore;
use crate::config::DbMode;
use crate::error::{Error, Result};
use crate::fi::FileList;
use crate::header::{Header, HeaderRef, MemoryHeader, Tag};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// Tags that installed headers can be looked up by
pub const INDEXED_TAGS: [Tag; 5] = [
    Tag::Name,
    Tag::ProvideName,
    Tag::RequireName,
    Tag::ConflictName,
    Tag::Basenames,
];

/// An installed header together with its database instance number
#[derive(Debug, Clone)]
pub struct InstalledHeader {
    pub offset: u32,
    pub header: HeaderRef,
}

/// Iterator over the results of a database lookup
#[derive(Debug, Default)]
pub struct MatchIterator {
    matches: std::vec::IntoIter<InstalledHeader>,
}

impl MatchIterator {
    pub fn new(matches: Vec<InstalledHeader>) -> Self {
        Self {
            matches: matches.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Drop instances whose offset is in `offsets` (sorted ascending)
    pub fn prune(&mut self, offsets: &[u32]) {
        if offsets.is_empty() {
            return;
        }
        let remaining: Vec<InstalledHeader> = std::mem::take(&mut self.matches)
            .filter(|m| offsets.binary_search(&m.offset).is_err())
            .collect();
        self.matches = remaining.into_iter();
    }

    pub fn count_remaining(&self) -> usize {
        self.matches.len()
    }
}

impl Iterator for MatchIterator {
    type Item = InstalledHeader;

    fn next(&mut self) -> Option<Self::Item> {
        self.matches.next()
    }
}

/// Read access to installed packages
pub trait PackageDatabase {
    /// Headers indexed under `tag` with the given key, or every header
    /// when `key` is `None`
    fn init_iterator(&self, tag: Tag, key: Option<&str>) -> Result<MatchIterator>;
}

/// Initialize a new database at the specified path
///
/// Creates the file and parent directories and brings the schema up to
/// date. Calling it on an existing database is safe.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Initializing database at: {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing database
pub fn open(db_path: &str, mode: DbMode) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = match mode {
        DbMode::ReadWrite => {
            let conn = Connection::open(db_path)?;
            schema::migrate(&conn)?;
            conn
        }
        DbMode::ReadOnly | DbMode::Disabled => {
            Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?
        }
    };

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

/// SQLite-backed package database
pub struct RpmDb {
    conn: Connection,
}

impl RpmDb {
    pub fn open(db_path: &str, mode: DbMode) -> Result<Self> {
        if mode == DbMode::Disabled {
            return Err(Error::DatabaseOpen(format!(
                "{}: database access is disabled",
                db_path
            )));
        }
        Ok(Self {
            conn: open(db_path, mode)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Record a header as installed, returning its instance offset
    pub fn add_package(&self, h: &dyn Header) -> Result<u32> {
        let json = MemoryHeader::copy_of(h).to_json()?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO packages (name, header) VALUES (?1, ?2)",
            params![h.name(), json],
        )?;
        let offset = u32::try_from(tx.last_insert_rowid())
            .map_err(|_| Error::InitError("package offset out of range".to_string()))?;

        {
            let mut stmt =
                tx.prepare("INSERT INTO package_index (tag, key, offset) VALUES (?1, ?2, ?3)")?;
            for (tag, key) in index_keys(h) {
                stmt.execute(params![tag.to_string(), key, offset])?;
            }
        }

        // Cached verdicts describe the old package set
        tx.execute("DELETE FROM depends_cache", [])?;
        tx.commit()?;
        debug!("Recorded {} as instance {}", h.nevra(), offset);
        Ok(offset)
    }

    /// Forget an installed instance
    pub fn remove_package(&self, offset: u32) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM package_index WHERE offset = ?1", [offset])?;
        let removed = tx.execute("DELETE FROM packages WHERE offset = ?1", [offset])?;
        if removed > 0 {
            tx.execute("DELETE FROM depends_cache", [])?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn get(&self, offset: u32) -> Result<Option<HeaderRef>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT header FROM packages WHERE offset = ?1",
                [offset],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(Rc::new(MemoryHeader::from_json(&json)?))),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn load(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<InstalledHeader>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (offset, json) = row?;
            let header: HeaderRef = Rc::new(MemoryHeader::from_json(&json)?);
            matches.push(InstalledHeader { offset, header });
        }
        Ok(matches)
    }
}

/// Every (tag, key) pair a header is indexed under
fn index_keys(h: &dyn Header) -> Vec<(Tag, String)> {
    let mut keys = BTreeSet::new();
    keys.insert((Tag::Name, h.name().to_string()));
    for tag in [Tag::ProvideName, Tag::RequireName, Tag::ConflictName] {
        for name in h.get_strings(tag) {
            keys.insert((tag, name.clone()));
        }
    }
    for path in FileList::from_header(h).paths() {
        keys.insert((Tag::Basenames, path));
    }
    keys.into_iter().collect()
}

impl PackageDatabase for RpmDb {
    fn init_iterator(&self, tag: Tag, key: Option<&str>) -> Result<MatchIterator> {
        if !INDEXED_TAGS.contains(&tag) {
            return Err(Error::ParseError(format!("{} is not an indexed tag", tag)));
        }

        let matches = match key {
            Some(key) => self.load(
                "SELECT DISTINCT p.offset, p.header
                 FROM package_index i JOIN packages p ON p.offset = i.offset
                 WHERE i.tag = ?1 AND i.key = ?2
                 ORDER BY p.offset",
                &[&tag.to_string(), &key],
            )?,
            None => self.load(
                "SELECT offset, header FROM packages ORDER BY offset",
                &[],
            )?,
        };
        Ok(MatchIterator::new(matches))
    }
}

impl CacheStore for RpmDb {
    fn get(&self, key: &str) -> Result<Option<i32>> {
        Ok(self
            .conn
            .query_row(
                "SELECT verdict FROM depends_cache WHERE dnevr = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put(&self, key: &str, value: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO depends_cache (dnevr, verdict) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM depends_cache", [])?;
        Ok(())
    }
}

impl std::fmt::Debug for RpmDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpmDb")
            .field("path", &self.conn.path())
            .finish()
    }
}
