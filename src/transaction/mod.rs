// src/transaction/mod.rs

//! Transaction sets
//!
//! A transaction set collects the packages to install and erase, checks
//! that every dependency will hold once the transaction is done, and
//! orders the elements so each package's requirements are in place before
//! it is processed.
//!
//! # Lifecycle
//!
//! ```text
//! add_install_element / add_erase_element -> check -> order -> elements()
//! ```
//!
//! Installed packages come from a [`PackageDatabase`], opened lazily from
//! the configured path on first need unless one is supplied with
//! [`TransactionSet::set_database`].

mod check;
mod element;
mod order;
mod problems;
mod registrar;

pub use check::{SkippedHint, SolveOutcome, SolvedPackage, Solver};
pub use element::{
    ChainLink, ChainReason, ElementKind, ElementType, PackageKey, TransactionElement, chain,
};
pub use order::OrderOutcome;
pub use problems::{Problem, ProblemKind, ProblemSet};
pub use registrar::AddOutcome;

use crate::al::AvailableList;
use crate::cache::{CacheStore, DependsCache, MemoryStore};
use crate::config::{DbMode, TransactionConfig, Whiteout};
use crate::db::{PackageDatabase, RpmDb};
use crate::ds::{DepTag, DependencySet};
use crate::error::{Error, Result};
use crate::fi::FileList;
use crate::header::HeaderRef;
use crate::probe::ResolverContext;
use std::rc::Rc;
use tracing::{debug, warn};

/// Called with the number of unordered elements when ordering fails
pub type RollbackHook = Box<dyn FnMut(usize)>;

pub struct TransactionSet {
    config: TransactionConfig,
    elements: Vec<TransactionElement>,
    /// Capabilities of the added elements
    added: AvailableList<PackageKey>,
    /// Packages outside the transaction, used for suggestions
    available: AvailableList<HeaderRef>,
    num_added: usize,
    num_removed: usize,
    /// Database offsets queued for erasure, sorted
    removed_offsets: Vec<u32>,
    db: Option<Rc<dyn PackageDatabase>>,
    db_opened: bool,
    cache: DependsCache,
    cache_store_set: bool,
    resolver: ResolverContext,
    solver: Option<Box<dyn Solver>>,
    rollback: Option<RollbackHook>,
    problems: ProblemSet,
    skipped_hints: Vec<SkippedHint>,
    whiteouts: Vec<Whiteout>,
}

impl TransactionSet {
    pub fn new(config: TransactionConfig) -> Self {
        let cache = if config.cache_depends {
            let store: Rc<dyn CacheStore> = Rc::new(MemoryStore::new());
            DependsCache::new(Some(store))
        } else {
            DependsCache::disabled()
        };
        Self {
            added: AvailableList::new(config.color),
            available: AvailableList::new(config.color),
            resolver: ResolverContext::new(&config),
            whiteouts: config.whiteouts(),
            elements: Vec::new(),
            num_added: 0,
            num_removed: 0,
            removed_offsets: Vec::new(),
            db: None,
            db_opened: config.db_mode == DbMode::Disabled,
            cache,
            cache_store_set: false,
            solver: None,
            rollback: None,
            problems: ProblemSet::new(),
            skipped_hints: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Use an already open package database instead of the configured one
    pub fn set_database(&mut self, db: Rc<dyn PackageDatabase>) {
        self.db = Some(db);
        self.db_opened = true;
    }

    /// Back the depends cache with `store`
    pub fn set_cache_store(&mut self, store: Rc<dyn CacheStore>) {
        self.cache = DependsCache::new(Some(store));
        self.cache_store_set = true;
    }

    pub fn disable_cache(&mut self) {
        self.cache = DependsCache::disabled();
        self.cache_store_set = true;
    }

    pub fn set_resolver(&mut self, resolver: ResolverContext) {
        self.resolver = resolver;
    }

    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        self.solver = Some(solver);
    }

    pub fn set_rollback_hook(&mut self, hook: RollbackHook) {
        self.rollback = Some(hook);
    }

    /// Offer a package that is not part of the transaction as a suggestion
    /// for unsatisfied dependencies
    pub fn add_available_package(&mut self, h: HeaderRef) {
        let mut provides = DependencySet::from_header(h.as_ref(), DepTag::Provides);
        provides.set_nopromote(self.config.no_promote);
        let files = FileList::from_header(h.as_ref());
        self.available.add(None, h, provides, files);
        self.available.make_index();
    }

    /// Elements in their current order
    pub fn elements(&self) -> &[TransactionElement] {
        &self.elements
    }

    pub fn element(&self, slot: usize) -> Option<&TransactionElement> {
        self.elements.get(slot)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn num_added(&self) -> usize {
        self.num_added
    }

    pub fn num_removed(&self) -> usize {
        self.num_removed
    }

    pub fn problems(&self) -> &ProblemSet {
        &self.problems
    }

    /// Missing-ok requirements that were let through
    pub fn skipped_hints(&self) -> &[SkippedHint] {
        &self.skipped_hints
    }

    /// The package database, opening it on first use
    ///
    /// A read-only open that fails leaves the transaction without a
    /// database. A failed read-write open is an error.
    pub(crate) fn database(&mut self) -> Result<Option<Rc<dyn PackageDatabase>>> {
        if self.db_opened {
            return Ok(self.db.clone());
        }
        self.db_opened = true;

        let Some(path) = self.config.db_path.clone() else {
            return Ok(None);
        };
        let path = path.to_string_lossy().to_string();

        match RpmDb::open(&path, self.config.db_mode) {
            Ok(db) => {
                debug!("Opened package database {}", path);
                let db = Rc::new(db);
                if self.config.cache_depends && !self.cache_store_set {
                    let store: Rc<dyn CacheStore> = db.clone();
                    self.cache = DependsCache::new(Some(store));
                }
                let db: Rc<dyn PackageDatabase> = db;
                self.db = Some(db);
                Ok(self.db.clone())
            }
            Err(e) if self.config.db_mode == DbMode::ReadWrite => {
                Err(Error::DatabaseOpen(format!("{}: {}", path, e)))
            }
            Err(e) => {
                warn!("Cannot open package database {}: {}", path, e);
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for TransactionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSet")
            .field("elements", &self.elements)
            .field("num_added", &self.num_added)
            .field("num_removed", &self.num_removed)
            .field("problems", &self.problems.len())
            .finish()
    }
}
