// src/config.rs

//! Transaction configuration
//!
//! Everything that changes how a transaction set checks and orders its
//! elements. Loadable from TOML; every field has a default.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// How the installed package database may be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DbMode {
    /// Open read-only; failure to open is not fatal
    #[default]
    ReadOnly,
    /// Open for writing; failure to open is an error
    ReadWrite,
    /// Never open the database
    Disabled,
}

/// A `(successor, predecessor)` package name pair never turned into an
/// ordering edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Whiteout {
    pub successor: String,
    pub predecessor: String,
}

impl Whiteout {
    /// Parse `"successor>predecessor"`
    pub fn parse(s: &str) -> Option<Self> {
        let (successor, predecessor) = s.split_once('>')?;
        let successor = successor.trim();
        let predecessor = predecessor.trim();
        if successor.is_empty() || predecessor.is_empty() {
            return None;
        }
        Some(Self {
            successor: successor.to_string(),
            predecessor: predecessor.to_string(),
        })
    }
}

/// Transaction set configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Root filesystem path (usually "/")
    pub root: PathBuf,
    /// Installed package database, opened on first use
    pub db_path: Option<PathBuf>,
    pub db_mode: DbMode,
    /// Transaction color; zero disables multilib handling
    pub color: u32,
    /// Never consult the solver callback
    pub no_suggest: bool,
    /// Do not assume a missing epoch matches a present one
    pub no_promote: bool,
    /// Obsoletes without a version match any installed provider
    pub legacy_unversioned_obsoletes: bool,
    /// Emit packages in presentation order whenever the graph allows it
    pub anaconda_order: bool,
    /// `"pkgA>pkgB"` pairs whose dependency edges are ignored while ordering
    pub dependency_whiteout: Vec<String>,
    /// System-info provides, a file or a directory of files
    pub sysinfo_path: PathBuf,
    pub cache_depends: bool,
    /// Values for `%{name}` dependency probes
    pub macros: HashMap<String, String>,
    /// Loop-breaking passes allowed before ordering gives up
    pub max_rescans: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            db_path: None,
            db_mode: DbMode::ReadOnly,
            color: 0,
            no_suggest: false,
            no_promote: true,
            legacy_unversioned_obsoletes: true,
            anaconda_order: false,
            dependency_whiteout: Vec::new(),
            sysinfo_path: PathBuf::from("/etc/rpm/sysinfo"),
            cache_depends: true,
            macros: HashMap::new(),
            max_rescans: 10,
        }
    }
}

impl TransactionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_db(mut self, db_path: impl Into<PathBuf>, mode: DbMode) -> Self {
        self.db_path = Some(db_path.into());
        self.db_mode = mode;
        self
    }

    /// Parsed whiteout pairs; malformed entries are skipped
    pub fn whiteouts(&self) -> Vec<Whiteout> {
        self.dependency_whiteout
            .iter()
            .filter_map(|entry| {
                let parsed = Whiteout::parse(entry);
                if parsed.is_none() {
                    warn!("ignoring malformed dependency whiteout \"{}\"", entry);
                }
                parsed
            })
            .collect()
    }

    /// Map an absolute path into the configured root
    pub fn rooted(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}
