// src/lib.rs

//! rpmts: RPM transaction sets
//!
//! Collects packages to install and erase, checks that their dependencies
//! hold against each other and the installed package database, and orders
//! them so every package follows what it requires.
//!
//! # Architecture
//!
//! - Headers: packages are seen through the [`header::Header`] tag trait
//! - Dependencies: name/flags/EVR triples compared with rpm version rules
//! - Available lists: capability indexes over added, erased and suggested packages
//! - Database: installed headers in SQLite, iterated by indexed tag
//! - Probes: rpmlib features, system information, file access and ELF sonames
//!
//! # Example
//!
//! ```no_run
//! use rpmts::{HeaderBuilder, OrderOutcome, TransactionConfig, TransactionSet};
//! use std::rc::Rc;
//!
//! let mut ts = TransactionSet::new(TransactionConfig::default());
//! let a = HeaderBuilder::new("A", "1", "1").requires("B >= 2").build()?;
//! let b = HeaderBuilder::new("B", "2", "1").provides("B = 2").build()?;
//! ts.add_install_element(Rc::new(a), None, false, vec![])?;
//! ts.add_install_element(Rc::new(b), None, false, vec![])?;
//! assert_eq!(ts.check()?, 0);
//! assert_eq!(ts.order(), OrderOutcome::Ordered);
//! # Ok::<(), rpmts::Error>(())
//! ```

pub mod al;
pub mod cache;
pub mod config;
pub mod db;
pub mod ds;
mod error;
pub mod fi;
pub mod header;
pub mod manifest;
pub mod probe;
pub mod transaction;
pub mod version;

pub use config::{DbMode, TransactionConfig};
pub use db::{PackageDatabase, RpmDb};
pub use ds::{DepTag, Dependency, DependencySet, SenseFlags, Verdict};
pub use error::{Error, Result};
pub use header::{Header, HeaderBuilder, HeaderRef, MemoryHeader, Tag, TagValue};
pub use manifest::Manifest;
pub use transaction::{
    AddOutcome, OrderOutcome, Problem, ProblemKind, ProblemSet, SolveOutcome, SolvedPackage,
    Solver, TransactionElement, TransactionSet,
};
pub use version::{Evr, rpmvercmp};
