// src/transaction/element.rs

//! Transaction elements
//!
//! One element per package being installed or erased. An element is built
//! from the package header when it is registered and keeps the dependency
//! sets and file list the checker and orderer work from.

use crate::al::AlKey;
use crate::ds::{DepTag, DependencySet, SenseFlags};
use crate::fi::{FileList, Relocation};
use crate::header::{Header, HeaderRef};
use std::fmt;
use tracing::debug;

/// Caller-supplied retrieval key, typically a package file name
pub type PackageKey = Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Added,
    Removed,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Added => write!(f, "+"),
            ElementType::Removed => write!(f, "-"),
        }
    }
}

/// Per-type element data
#[derive(Debug, Clone)]
pub enum ElementKind {
    Added {
        /// Slot in the added-packages list
        added_key: AlKey,
        relocations: Vec<Relocation>,
        pkg_file_size: u64,
    },
    Removed {
        /// Added package whose upgrade or obsoletes caused the erase
        depends_on: Option<AlKey>,
        /// Installed instance being erased
        db_offset: u32,
    },
}

/// Why an installed package is being erased on behalf of an added one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainReason {
    Upgrades,
    Obsoletes,
}

impl fmt::Display for ChainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainReason::Upgrades => write!(f, "Upgrades"),
            ChainReason::Obsoletes => write!(f, "Obsoletes"),
        }
    }
}

/// Identity of the package on the other end of an upgrade/obsoletes chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub reason: ChainReason,
    pub nevra: String,
    pub pkgid: Option<String>,
    pub hdrid: Option<String>,
}

impl ChainLink {
    fn of(h: &dyn Header, reason: ChainReason) -> Self {
        Self {
            reason,
            nevra: h.nevra(),
            pkgid: h.pkgid().map(str::to_string),
            hdrid: h.hdrid().map(str::to_string),
        }
    }
}

pub struct TransactionElement {
    name: String,
    epoch: Option<u32>,
    version: String,
    release: String,
    arch: Option<String>,
    os: Option<String>,
    nevr: String,
    nevra: String,
    color: u32,
    hdrid: Option<String>,
    pkgid: Option<String>,
    is_source: bool,
    key: PackageKey,
    header: Option<HeaderRef>,

    this: DependencySet,
    provides: DependencySet,
    requires: DependencySet,
    conflicts: DependencySet,
    obsoletes: DependencySet,
    files: FileList,

    kind: ElementKind,

    depth: usize,
    npreds: usize,
    degree: usize,
    tree: Option<usize>,
    parent: Option<usize>,

    flinks: Vec<ChainLink>,
    blinks: Vec<ChainLink>,
}

impl TransactionElement {
    pub fn new(h: HeaderRef, kind: ElementKind, key: PackageKey, nopromote: bool) -> Self {
        let set = |tag: DepTag| {
            let mut ds = DependencySet::from_header(h.as_ref(), tag);
            ds.set_nopromote(nopromote);
            ds
        };
        let mut this = DependencySet::this(h.as_ref(), DepTag::Provides, SenseFlags::EQUAL);
        this.set_nopromote(nopromote);

        let mut files = FileList::from_header(h.as_ref());
        if let ElementKind::Added { relocations, .. } = &kind
            && !relocations.is_empty()
        {
            files.relocate(relocations);
        }

        Self {
            name: h.name().to_string(),
            epoch: h.epoch(),
            version: h.version().to_string(),
            release: h.release().to_string(),
            arch: h.arch().map(str::to_string),
            os: h.os().map(str::to_string),
            nevr: h.nevr(),
            nevra: h.nevra(),
            color: h.color(),
            hdrid: h.hdrid().map(str::to_string),
            pkgid: h.pkgid().map(str::to_string),
            is_source: h.is_source(),
            key,
            this,
            provides: set(DepTag::Provides),
            requires: set(DepTag::Requires),
            conflicts: set(DepTag::Conflicts),
            obsoletes: set(DepTag::Obsoletes),
            files,
            kind,
            depth: 0,
            npreds: 0,
            degree: 0,
            tree: None,
            parent: None,
            flinks: Vec::new(),
            blinks: Vec::new(),
            header: Some(h),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self.kind {
            ElementKind::Added { .. } => ElementType::Added,
            ElementKind::Removed { .. } => ElementType::Removed,
        }
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    pub fn os(&self) -> Option<&str> {
        self.os.as_deref()
    }

    pub fn nevr(&self) -> &str {
        &self.nevr
    }

    pub fn nevra(&self) -> &str {
        &self.nevra
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn hdrid(&self) -> Option<&str> {
        self.hdrid.as_deref()
    }

    pub fn pkgid(&self) -> Option<&str> {
        self.pkgid.as_deref()
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn header(&self) -> Option<&HeaderRef> {
        self.header.as_ref()
    }

    /// Release the retained header
    pub fn drop_header(&mut self) {
        self.header = None;
    }

    /// `N = [E:]V-R` of the package itself
    pub fn this(&self) -> &DependencySet {
        &self.this
    }

    pub fn provides(&self) -> &DependencySet {
        &self.provides
    }

    pub fn requires(&self) -> &DependencySet {
        &self.requires
    }

    pub fn conflicts(&self) -> &DependencySet {
        &self.conflicts
    }

    pub fn obsoletes(&self) -> &DependencySet {
        &self.obsoletes
    }

    pub fn files(&self) -> &FileList {
        &self.files
    }

    pub fn added_key(&self) -> Option<AlKey> {
        match self.kind {
            ElementKind::Added { added_key, .. } => Some(added_key),
            ElementKind::Removed { .. } => None,
        }
    }

    pub(crate) fn set_added_key(&mut self, key: AlKey) {
        if let ElementKind::Added { added_key, .. } = &mut self.kind {
            *added_key = key;
        }
    }

    pub fn depends_on(&self) -> Option<AlKey> {
        match self.kind {
            ElementKind::Removed { depends_on, .. } => depends_on,
            ElementKind::Added { .. } => None,
        }
    }

    pub fn db_offset(&self) -> Option<u32> {
        match self.kind {
            ElementKind::Removed { db_offset, .. } => Some(db_offset),
            ElementKind::Added { .. } => None,
        }
    }

    pub fn relocations(&self) -> &[Relocation] {
        match &self.kind {
            ElementKind::Added { relocations, .. } => relocations,
            ElementKind::Removed { .. } => &[],
        }
    }

    pub fn pkg_file_size(&self) -> u64 {
        match self.kind {
            ElementKind::Added { pkg_file_size, .. } => pkg_file_size,
            ElementKind::Removed { .. } => 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn npreds(&self) -> usize {
        self.npreds
    }

    pub fn set_npreds(&mut self, npreds: usize) {
        self.npreds = npreds;
    }

    /// Number of successors
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn set_degree(&mut self, degree: usize) {
        self.degree = degree;
    }

    pub fn tree(&self) -> Option<usize> {
        self.tree
    }

    pub fn set_tree(&mut self, tree: Option<usize>) {
        self.tree = tree;
    }

    /// Slot of the element that first unblocked this one while ordering
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<usize>) {
        self.parent = parent;
    }

    /// Packages this element erases
    pub fn flinks(&self) -> &[ChainLink] {
        &self.flinks
    }

    /// Packages erasing this element
    pub fn blinks(&self) -> &[ChainLink] {
        &self.blinks
    }
}

impl fmt::Debug for TransactionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionElement")
            .field("type", &self.element_type())
            .field("nevra", &self.nevra)
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("npreds", &self.npreds)
            .field("tree", &self.tree)
            .finish()
    }
}

/// Record that added element `p` erases removed element `q`
///
/// A pair that is already linked is left alone.
pub fn chain(
    elements: &mut [TransactionElement],
    p: usize,
    q: usize,
    erased: &dyn Header,
    reason: ChainReason,
) {
    // One link per installing package, whatever the reason
    if elements[q].blinks.iter().any(|l| l.nevra == elements[p].nevra) {
        return;
    }
    let forward = ChainLink::of(erased, reason);
    let back = ChainLink {
        reason,
        nevra: elements[p].nevra.clone(),
        pkgid: elements[p].pkgid.clone(),
        hdrid: elements[p].hdrid.clone(),
    };
    debug!("{} {} {}", elements[p].nevra, reason, forward.nevra);
    elements[p].flinks.push(forward);
    elements[q].blinks.push(back);
}
