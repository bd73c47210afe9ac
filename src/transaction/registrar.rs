// src/transaction/registrar.rs

//! Adding install and erase elements
//!
//! Installs are deduplicated by name against the packages already added:
//! an equal or newer package already present wins, an older one is
//! replaced in place so its slot index stays valid. With upgrade semantics
//! the installed instances of the same name are queued for erasure, and
//! the package's Obsoletes erase whatever installed packages they match.

use super::element::{ChainReason, ElementKind, PackageKey, TransactionElement, chain};
use super::TransactionSet;
use crate::al::AlKey;
use crate::db::PackageDatabase;
use crate::ds::{Dependency, SenseFlags, any_matches_dep};
use crate::error::{Error, Result};
use crate::fi::Relocation;
use crate::header::{Header, HeaderRef, Tag, headers_identical};
use std::rc::Rc;
use tracing::{debug, warn};

/// Result of registering an install element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended at this slot
    Added(usize),
    /// Took over the slot of an older package with the same name
    Replaced(usize),
    /// An equal or newer package with the same name is already added
    Skipped,
}

impl AddOutcome {
    pub fn slot(self) -> Option<usize> {
        match self {
            AddOutcome::Added(slot) | AddOutcome::Replaced(slot) => Some(slot),
            AddOutcome::Skipped => None,
        }
    }
}

/// Installed packages of different colors can coexist
fn colors_disjoint(tscolor: u32, hcolor: u32, ohcolor: u32) -> bool {
    tscolor != 0 && hcolor != 0 && ohcolor != 0 && hcolor & ohcolor == 0
}

impl TransactionSet {
    /// Add a package to install
    ///
    /// Fails when a binary package has no arch or os, or when the added
    /// packages index cannot take it.
    pub fn add_install_element(
        &mut self,
        h: HeaderRef,
        key: PackageKey,
        upgrade: bool,
        relocations: Vec<Relocation>,
    ) -> Result<AddOutcome> {
        let tscolor = self.config.color;
        let nopromote = self.config.no_promote;
        let is_source = h.is_source();

        let mut replace: Option<(usize, AlKey)> = None;

        if !is_source {
            let (Some(arch), Some(os)) = (h.arch(), h.os()) else {
                let tag = if h.arch().is_none() { Tag::Arch } else { Tag::Os };
                return Err(Error::MissingTag {
                    package: h.nevr(),
                    tag: tag.to_string(),
                });
            };

            let new_chk = Dependency::new(h.name(), SenseFlags::GE, h.evr());
            let old_chk = Dependency::new(h.name(), SenseFlags::LESS, h.evr());

            for (slot, p) in self.elements.iter().enumerate() {
                let Some(added_key) = p.added_key() else {
                    continue;
                };
                if p.is_source() {
                    continue;
                }
                if tscolor != 0 && (p.arch() != Some(arch) || p.os() != Some(os)) {
                    continue;
                }
                let Some(this) = p.this().get(0) else {
                    continue;
                };

                if new_chk.overlaps(this, nopromote) {
                    warn!(
                        "package {} was already added, skipping {}",
                        p.nevra(),
                        h.nevra()
                    );
                    return Ok(AddOutcome::Skipped);
                }

                if old_chk.overlaps(this, nopromote) {
                    debug!("package {} was already added, replacing with {}", p.nevra(), h.nevra());
                    replace = Some((slot, added_key));
                    break;
                }
            }
        }

        let placeholder = ElementKind::Added {
            added_key: AlKey(usize::MAX),
            relocations,
            pkg_file_size: h.size(),
        };
        let mut p = TransactionElement::new(h.clone(), placeholder, key.clone(), nopromote);

        let added_key = self
            .added
            .add(
                replace.map(|(_, k)| k),
                key,
                p.provides().clone(),
                p.files().clone(),
            )
            .ok_or_else(|| Error::AvailableListRejected(h.nevra()))?;
        p.set_added_key(added_key);

        let (pslot, outcome) = match replace {
            Some((slot, _)) => {
                self.elements[slot] = p;
                (slot, AddOutcome::Replaced(slot))
            }
            None => {
                self.elements.push(p);
                self.num_added += 1;
                let slot = self.elements.len() - 1;
                (slot, AddOutcome::Added(slot))
            }
        };

        if !is_source && let Some(db) = self.database()? {
            if upgrade {
                self.add_upgrade_erasures(db.as_ref(), &h, pslot, added_key)?;
            }
            self.add_obsolete_erasures(db.as_ref(), &h, pslot, added_key)?;
        }

        // Cached verdicts were decided against the previous element set
        self.cache.invalidate();
        Ok(outcome)
    }

    fn add_upgrade_erasures(
        &mut self,
        db: &dyn PackageDatabase,
        h: &HeaderRef,
        pslot: usize,
        added_key: AlKey,
    ) -> Result<()> {
        let tscolor = self.config.color;
        let hcolor = h.color();

        for installed in db.init_iterator(Tag::Name, Some(h.name()))? {
            let oh = installed.header;
            if colors_disjoint(tscolor, hcolor, oh.color()) {
                continue;
            }
            if headers_identical(h.as_ref(), oh.as_ref()) {
                continue;
            }

            let q = self.remove_package(oh.clone(), installed.offset, Some(added_key));
            chain(&mut self.elements, pslot, q, oh.as_ref(), ChainReason::Upgrades);
        }
        Ok(())
    }

    fn add_obsolete_erasures(
        &mut self,
        db: &dyn PackageDatabase,
        h: &HeaderRef,
        pslot: usize,
        added_key: AlKey,
    ) -> Result<()> {
        let tscolor = self.config.color;
        let hcolor = h.color();
        let nopromote = self.config.no_promote;
        let obsoletes = self.elements[pslot].obsoletes().clone();

        for obsolete in &obsoletes {
            if tscolor != 0 && obsolete.color != 0 && tscolor & obsolete.color == 0 {
                continue;
            }
            if obsolete.name == h.name() {
                continue;
            }

            let tag = if obsolete.name.starts_with('/') {
                Tag::Basenames
            } else {
                Tag::ProvideName
            };
            let mut mi = db.init_iterator(tag, Some(&obsolete.name))?;
            mi.prune(&self.removed_offsets);

            for installed in mi {
                let oh = installed.header;
                if colors_disjoint(tscolor, hcolor, oh.color()) {
                    continue;
                }

                // Obsoletes without a version predate versioned dependencies
                let matched = if !obsolete.is_versioned() {
                    self.config.legacy_unversioned_obsoletes || oh.name() == obsolete.name
                } else {
                    any_matches_dep(oh.as_ref(), obsolete, nopromote)
                };
                if !matched {
                    continue;
                }

                let q = self.remove_package(oh.clone(), installed.offset, Some(added_key));
                chain(&mut self.elements, pslot, q, oh.as_ref(), ChainReason::Obsoletes);
            }
        }
        Ok(())
    }

    /// Add an installed package to erase
    pub fn add_erase_element(&mut self, h: HeaderRef, db_offset: u32) -> Result<usize> {
        Ok(self.remove_package(h, db_offset, None))
    }

    /// Queue the installed instance at `db_offset` for erasure once
    ///
    /// Returns the slot of the erase element, which is the existing one
    /// when the instance was already queued.
    fn remove_package(&mut self, h: HeaderRef, db_offset: u32, depends_on: Option<AlKey>) -> usize {
        if let Err(pos) = self.removed_offsets.binary_search(&db_offset) {
            self.removed_offsets.insert(pos, db_offset);
        } else {
            // Every queued offset has exactly one erase element
            return self
                .elements
                .iter()
                .position(|te| te.db_offset() == Some(db_offset))
                .unwrap_or_else(|| {
                    unreachable!("db offset {} queued without an erase element", db_offset)
                });
        }

        debug!("erasing {} (db offset {})", h.nevra(), db_offset);
        let q = TransactionElement::new(
            Rc::clone(&h),
            ElementKind::Removed {
                depends_on,
                db_offset,
            },
            None,
            self.config.no_promote,
        );
        self.elements.push(q);
        self.num_removed += 1;
        self.cache.invalidate();
        self.elements.len() - 1
    }
}
