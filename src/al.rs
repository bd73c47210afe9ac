// src/al.rs

//! Available lists
//!
//! An available list indexes the capabilities of a group of candidate
//! packages so a dependency can be mapped to the packages that satisfy it.
//! Transactions keep one for added packages, one for packages being erased
//! (while ordering) and one for packages that could be suggested to fix an
//! unsatisfied dependency.
//!
//! Provides are looked up through a sorted name index that must be rebuilt
//! with [`AvailableList::make_index`] after packages are added. File paths
//! go through a directory index that is kept current on every add.

use crate::ds::{Dependency, DependencySet};
use crate::fi::FileList;
use std::collections::BTreeMap;
use tracing::debug;

/// Slot of a package in an available list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlKey(pub usize);

#[derive(Debug)]
struct AvailablePackage<K> {
    key: K,
    provides: DependencySet,
    files: FileList,
}

#[derive(Debug)]
struct ProvideEntry {
    name: String,
    pkg: AlKey,
    ix: usize,
}

#[derive(Debug)]
struct FileEntry {
    basename: String,
    pkg: AlKey,
    color: u32,
}

/// Capability index over candidate packages
#[derive(Debug)]
pub struct AvailableList<K> {
    packages: Vec<Option<AvailablePackage<K>>>,
    tscolor: u32,
    provides: Vec<ProvideEntry>,
    indexed: bool,
    dirs: BTreeMap<String, Vec<FileEntry>>,
}

impl<K: Clone> AvailableList<K> {
    /// Create an empty list for a transaction of the given color
    pub fn new(tscolor: u32) -> Self {
        Self {
            packages: Vec::new(),
            tscolor,
            provides: Vec::new(),
            indexed: false,
            dirs: BTreeMap::new(),
        }
    }

    /// Number of slots, including deleted ones
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.iter().all(Option::is_none)
    }

    /// Register a package's provides and files
    ///
    /// With `existing` set the package replaces the one in that slot, which
    /// must be live. Returns `None` when the slot cannot be reused.
    pub fn add(
        &mut self,
        existing: Option<AlKey>,
        key: K,
        provides: DependencySet,
        files: FileList,
    ) -> Option<AlKey> {
        let pkg = match existing {
            Some(slot) => {
                if !matches!(self.packages.get(slot.0), Some(Some(_))) {
                    return None;
                }
                self.del(slot);
                slot
            }
            None => {
                self.packages.push(None);
                AlKey(self.packages.len() - 1)
            }
        };

        for ix in 0..files.len() {
            let (Some(dir), Some(base)) = (files.dirname(ix), files.basename(ix)) else {
                continue;
            };
            self.dirs.entry(dir.to_string()).or_default().push(FileEntry {
                basename: base.to_string(),
                pkg,
                color: files.color(ix),
            });
        }

        self.packages[pkg.0] = Some(AvailablePackage {
            key,
            provides,
            files,
        });
        self.indexed = false;
        Some(pkg)
    }

    /// Drop a package from the list
    pub fn del(&mut self, pkg: AlKey) {
        let Some(slot) = self.packages.get_mut(pkg.0) else {
            return;
        };
        if slot.take().is_none() {
            return;
        }
        for entries in self.dirs.values_mut() {
            entries.retain(|e| e.pkg != pkg);
        }
        self.dirs.retain(|_, entries| !entries.is_empty());
        self.indexed = false;
    }

    /// Retrieval key stored with a package
    pub fn key(&self, pkg: AlKey) -> Option<&K> {
        self.packages
            .get(pkg.0)
            .and_then(Option::as_ref)
            .map(|p| &p.key)
    }

    /// Rebuild the provides index
    pub fn make_index(&mut self) {
        let mut entries = Vec::new();
        for (slot, pkg) in self.packages.iter().enumerate() {
            let Some(pkg) = pkg else { continue };
            for (ix, provide) in pkg.provides.iter().enumerate() {
                if self.tscolor != 0 && provide.color != 0 && provide.color & self.tscolor == 0 {
                    continue;
                }
                entries.push(ProvideEntry {
                    name: provide.name.clone(),
                    pkg: AlKey(slot),
                    ix,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.provides = entries;
        self.indexed = true;
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    fn file_satisfies(&self, dep: &Dependency) -> Vec<AlKey> {
        let mut found = Vec::new();
        let Some(slash) = dep.name.rfind('/') else {
            return found;
        };
        let (dir, base) = dep.name.split_at(slash + 1);
        let Some(entries) = self.dirs.get(dir) else {
            return found;
        };
        for entry in entries.iter().filter(|e| e.basename == base) {
            if self.tscolor != 0 && entry.color != 0 && entry.color & self.tscolor == 0 {
                continue;
            }
            if !found.contains(&entry.pkg) {
                found.push(entry.pkg);
            }
        }
        found
    }

    /// Every package satisfying `dep`
    ///
    /// Absolute paths are matched against file lists first. Provides added
    /// since the last [`make_index`](Self::make_index) are not visible.
    pub fn all_satisfies_depend(&self, dep: &Dependency) -> Vec<AlKey> {
        if dep.name.starts_with('/') {
            let found = self.file_satisfies(dep);
            if !found.is_empty() {
                return found;
            }
        }

        let mut found: Vec<AlKey> = Vec::new();
        let start = self
            .provides
            .partition_point(|e| e.name.as_str() < dep.name.as_str());
        for entry in self.provides[start..]
            .iter()
            .take_while(|e| e.name == dep.name)
        {
            let Some(Some(pkg)) = self.packages.get(entry.pkg.0) else {
                continue;
            };
            let Some(provide) = pkg.provides.get(entry.ix) else {
                continue;
            };
            if found.last() == Some(&entry.pkg) {
                continue;
            }
            if provide.overlaps(dep, pkg.provides.nopromote()) {
                debug!("{} satisfied by {} (slot {})", dep, provide, entry.pkg.0);
                found.push(entry.pkg);
            }
        }
        found
    }

    /// First package satisfying `dep`
    pub fn satisfies_depend(&self, dep: &Dependency) -> Option<AlKey> {
        self.all_satisfies_depend(dep).into_iter().next()
    }

    /// Files registered for a package
    pub fn files(&self, pkg: AlKey) -> Option<&FileList> {
        self.packages
            .get(pkg.0)
            .and_then(Option::as_ref)
            .map(|p| &p.files)
    }
}
