// src/ds/mod.rs

//! Dependency sets
//!
//! A dependency set is the ordered list of name/EVR/flags triples that make
//! up one package's Provides, Requires, Conflicts or Obsoletes. This module
//! also implements the range-overlap comparison that decides whether a
//! provided capability satisfies a requirement.

use crate::error::{Error, Result};
use crate::header::{Header, Tag};
use crate::version::{Evr, rpmvercmp};
use bitflags::bitflags;
use std::cmp::Ordering;
use std::fmt;

bitflags! {
    /// Relational operator and context bits carried by a dependency
    #[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
    pub struct SenseFlags: u32 {
        const LESS = 1 << 1;
        const GREATER = 1 << 2;
        const EQUAL = 1 << 3;

        const PREREQ = 1 << 6;     // legacy prereq dependency
        const INTERP = 1 << 8;     // interpreter used by scriptlet
        const SCRIPT_PRE = (1 << 9) | Self::PREREQ.bits();
        const SCRIPT_POST = (1 << 10) | Self::PREREQ.bits();
        const SCRIPT_PREUN = (1 << 11) | Self::PREREQ.bits();
        const SCRIPT_POSTUN = (1 << 12) | Self::PREREQ.bits();
        const SCRIPT_VERIFY = 1 << 13;
        const FIND_REQUIRES = 1 << 14;
        const FIND_PROVIDES = 1 << 15;
        const TRIGGERIN = 1 << 16;
        const TRIGGERUN = 1 << 17;
        const TRIGGERPOSTUN = 1 << 18;
        const MISSINGOK = 1 << 19; // suggests/enhances hint
        const SCRIPT_PREP = 1 << 20;
        const SCRIPT_BUILD = 1 << 21;
        const SCRIPT_INSTALL = 1 << 22;
        const SCRIPT_CLEAN = 1 << 23;
        const RPMLIB = (1 << 24) | Self::PREREQ.bits();
        const CONFIG = 1 << 28;

        const LE = Self::LESS.bits() | Self::EQUAL.bits();
        const GE = Self::GREATER.bits() | Self::EQUAL.bits();
    }
}

impl SenseFlags {
    /// The relational bits only
    pub const SENSEMASK: Self = Self::LESS.union(Self::GREATER).union(Self::EQUAL);

    const ALL_REQUIRES_MASK: u32 = Self::INTERP.bits()
        | Self::SCRIPT_PRE.bits()
        | Self::SCRIPT_POST.bits()
        | Self::SCRIPT_PREUN.bits()
        | Self::SCRIPT_POSTUN.bits()
        | Self::SCRIPT_VERIFY.bits()
        | Self::FIND_REQUIRES.bits()
        | Self::SCRIPT_PREP.bits()
        | Self::SCRIPT_BUILD.bits()
        | Self::SCRIPT_INSTALL.bits()
        | Self::SCRIPT_CLEAN.bits()
        | Self::RPMLIB.bits();

    const INSTALL_ONLY_MASK: u32 = (Self::SCRIPT_PRE.bits()
        | Self::SCRIPT_POST.bits()
        | Self::RPMLIB.bits())
        & !Self::PREREQ.bits();

    const ERASE_ONLY_MASK: u32 =
        (Self::SCRIPT_PREUN.bits() | Self::SCRIPT_POSTUN.bits()) & !Self::PREREQ.bits();

    pub fn sense(self) -> Self {
        self & Self::SENSEMASK
    }

    /// A bare `PreReq:` without any script context
    pub fn is_legacy_prereq(self) -> bool {
        self.bits() & Self::ALL_REQUIRES_MASK == Self::PREREQ.bits()
    }

    /// Needed by %pre/%post (or an rpmlib feature) of an install
    pub fn is_install_prereq(self) -> bool {
        self.bits() & Self::INSTALL_ONLY_MASK != 0
    }

    /// Needed by %preun/%postun of an erase
    pub fn is_erase_prereq(self) -> bool {
        self.bits() & Self::ERASE_ONLY_MASK != 0
    }

    /// Operator text in rpm order: `<`, `>`, `=`
    pub fn operator(self) -> String {
        let mut op = String::new();
        if self.contains(Self::LESS) {
            op.push('<');
        }
        if self.contains(Self::GREATER) {
            op.push('>');
        }
        if self.contains(Self::EQUAL) {
            op.push('=');
        }
        op
    }

    /// Parse a relational operator such as `>=` or `=<`
    pub fn from_operator(op: &str) -> Option<Self> {
        let flags = match op {
            "<" => Self::LESS,
            "<=" | "=<" => Self::LE,
            "=" | "==" => Self::EQUAL,
            ">=" | "=>" => Self::GE,
            ">" => Self::GREATER,
            "!=" => Self::LESS | Self::GREATER,
            _ => return None,
        };
        Some(flags)
    }

    /// Label used when describing which kind of requirement an edge came from
    pub fn identify(self) -> &'static str {
        if self.is_legacy_prereq() {
            return "PreReq:";
        }
        let f = self.bits() & !Self::PREREQ.bits();
        let has = |flag: Self| f & flag.bits() & !Self::PREREQ.bits() != 0;
        if has(Self::SCRIPT_PRE) {
            "Requires(pre):"
        } else if has(Self::SCRIPT_POST) {
            "Requires(post):"
        } else if has(Self::SCRIPT_PREUN) {
            "Requires(preun):"
        } else if has(Self::SCRIPT_POSTUN) {
            "Requires(postun):"
        } else if has(Self::SCRIPT_VERIFY) {
            "Requires(verify):"
        } else if has(Self::FIND_REQUIRES) {
            "Requires(auto):"
        } else {
            "Requires:"
        }
    }
}

/// Which header relation a dependency set was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DepTag {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
    Name,
}

impl DepTag {
    /// Single character prefix used in DNEVR strings
    pub fn prefix(self) -> char {
        match self {
            DepTag::Provides => 'P',
            DepTag::Requires => 'R',
            DepTag::Conflicts => 'C',
            DepTag::Obsoletes => 'O',
            DepTag::Name => 'N',
        }
    }

    /// Header tags holding (names, versions, flags, colors)
    fn header_tags(self) -> Option<(Tag, Tag, Tag, Tag)> {
        match self {
            DepTag::Provides => Some((
                Tag::ProvideName,
                Tag::ProvideVersion,
                Tag::ProvideFlags,
                Tag::ProvideColors,
            )),
            DepTag::Requires => Some((
                Tag::RequireName,
                Tag::RequireVersion,
                Tag::RequireFlags,
                Tag::RequireColors,
            )),
            DepTag::Conflicts => Some((
                Tag::ConflictName,
                Tag::ConflictVersion,
                Tag::ConflictFlags,
                Tag::ConflictColors,
            )),
            DepTag::Obsoletes => Some((
                Tag::ObsoleteName,
                Tag::ObsoleteVersion,
                Tag::ObsoleteFlags,
                Tag::ObsoleteColors,
            )),
            DepTag::Name => None,
        }
    }
}

/// Result of resolving a single dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Satisfied,
    Unsatisfied,
}

impl Verdict {
    /// Integer form stored in the depends cache
    pub fn as_rc(self) -> i32 {
        match self {
            Verdict::Satisfied => 0,
            Verdict::Unsatisfied => 1,
        }
    }

    pub fn from_rc(rc: i32) -> Option<Self> {
        match rc {
            0 => Some(Verdict::Satisfied),
            1 => Some(Verdict::Unsatisfied),
            _ => None,
        }
    }
}

/// One name/EVR/flags triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    /// Empty when the dependency carries no version
    pub evr: String,
    pub flags: SenseFlags,
    pub color: u32,
}

impl Dependency {
    pub fn new(name: impl Into<String>, flags: SenseFlags, evr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evr: evr.into(),
            flags,
            color: 0,
        }
    }

    /// Unversioned dependency on a name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, SenseFlags::empty(), "")
    }

    /// Parse `name [op evr]`, e.g. `"glibc >= 2.17"`
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [name] => Ok(Self::named(*name)),
            [name, op, evr] => {
                let flags = SenseFlags::from_operator(op).ok_or_else(|| {
                    Error::ParseError(format!("Unknown operator '{}' in '{}'", op, s))
                })?;
                Ok(Self::new(*name, flags, *evr))
            }
            _ => Err(Error::ParseError(format!(
                "Malformed dependency '{}'",
                s
            ))),
        }
    }

    pub fn with_flags(mut self, extra: SenseFlags) -> Self {
        self.flags |= extra;
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// True when both a relation and a version are present
    pub fn is_versioned(&self) -> bool {
        !self.flags.sense().is_empty() && !self.evr.is_empty()
    }

    /// Do the ranges described by `self` and `other` overlap?
    ///
    /// Different names never overlap. When either side is unversioned the
    /// answer is yes. `nopromote` controls what happens when only `self`
    /// carries a non-zero epoch: with promotion the missing epoch is
    /// assumed equal, without it `self` is newer.
    pub fn overlaps(&self, other: &Dependency, nopromote: bool) -> bool {
        if self.name != other.name {
            return false;
        }
        self.evr_overlaps(other, nopromote)
    }

    /// Range comparison ignoring the names
    pub fn evr_overlaps(&self, other: &Dependency, nopromote: bool) -> bool {
        let a_flags = self.flags;
        let b_flags = other.flags;

        if a_flags.sense().is_empty() || b_flags.sense().is_empty() {
            return true;
        }
        if self.evr.is_empty() || other.evr.is_empty() {
            return true;
        }

        let a = Evr::parse(&self.evr);
        let b = Evr::parse(&other.evr);

        let mut sense = match (a.epoch.as_deref(), b.epoch.as_deref()) {
            (Some(ae), Some(be)) => rpmvercmp(ae, be),
            (Some(_), None) if a.epoch_num() > 0 => {
                if nopromote {
                    Ordering::Greater
                } else {
                    tracing::debug!(
                        "The \"{}\" dependency needs an epoch (assuming same epoch as \"{}\")",
                        other,
                        self.evr
                    );
                    Ordering::Equal
                }
            }
            (None, Some(_)) if b.epoch_num() > 0 => Ordering::Less,
            _ => Ordering::Equal,
        };

        if sense == Ordering::Equal {
            sense = rpmvercmp(&a.version, &b.version);
            if sense == Ordering::Equal {
                if let (Some(ar), Some(br)) = (a.release.as_deref(), b.release.as_deref()) {
                    if !ar.is_empty() && !br.is_empty() {
                        sense = rpmvercmp(ar, br);
                    }
                }
            }
        }

        let has = |f: SenseFlags, bit: SenseFlags| f.contains(bit);
        match sense {
            Ordering::Less => {
                has(a_flags, SenseFlags::GREATER) || has(b_flags, SenseFlags::LESS)
            }
            Ordering::Greater => {
                has(a_flags, SenseFlags::LESS) || has(b_flags, SenseFlags::GREATER)
            }
            Ordering::Equal => {
                (has(a_flags, SenseFlags::EQUAL) && has(b_flags, SenseFlags::EQUAL))
                    || (has(a_flags, SenseFlags::LESS) && has(b_flags, SenseFlags::LESS))
                    || (has(a_flags, SenseFlags::GREATER) && has(b_flags, SenseFlags::GREATER))
            }
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.flags.sense().is_empty() {
            write!(f, " {}", self.flags.operator())?;
        }
        if !self.evr.is_empty() {
            write!(f, " {}", self.evr)?;
        }
        Ok(())
    }
}

/// An ordered set of dependencies sharing one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySet {
    tag: DepTag,
    entries: Vec<Dependency>,
    nopromote: bool,
}

impl DependencySet {
    pub fn new(tag: DepTag) -> Self {
        Self {
            tag,
            entries: Vec::new(),
            nopromote: true,
        }
    }

    /// Read the dependency arrays for `tag` out of a header
    ///
    /// Missing version or flag arrays yield unversioned entries, which is
    /// how headers predating versioned dependencies are represented.
    pub fn from_header(h: &dyn Header, tag: DepTag) -> Self {
        let mut ds = Self::new(tag);
        let Some((name_tag, version_tag, flags_tag, color_tag)) = tag.header_tags() else {
            return ds;
        };

        let names = h.get_strings(name_tag);
        let versions = h.get_strings(version_tag);
        let flags = h.get_ints(flags_tag);
        let colors = h.get_ints(color_tag);

        for (i, name) in names.iter().enumerate() {
            ds.entries.push(Dependency {
                name: name.clone(),
                evr: versions.get(i).cloned().unwrap_or_default(),
                flags: SenseFlags::from_bits_retain(flags.get(i).copied().unwrap_or(0)),
                color: colors.get(i).copied().unwrap_or(0),
            });
        }
        ds
    }

    /// Single-entry set describing the package itself: `N [E:]V-R`
    pub fn this(h: &dyn Header, tag: DepTag, flags: SenseFlags) -> Self {
        let mut ds = Self::new(tag);
        ds.entries
            .push(Dependency::new(h.name(), flags, h.evr()));
        ds
    }

    pub fn from_entries(tag: DepTag, entries: Vec<Dependency>) -> Self {
        Self {
            tag,
            entries,
            nopromote: true,
        }
    }

    pub fn tag(&self) -> DepTag {
        self.tag
    }

    pub fn push(&mut self, dep: Dependency) {
        self.entries.push(dep);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ix: usize) -> Option<&Dependency> {
        self.entries.get(ix)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
        self.entries.iter()
    }

    pub fn nopromote(&self) -> bool {
        self.nopromote
    }

    pub fn set_nopromote(&mut self, nopromote: bool) {
        self.nopromote = nopromote;
    }

    /// Formatted dependency with its tag prefix, e.g. `R foo >= 1.0`
    pub fn dnevr(&self, ix: usize) -> Option<String> {
        self.entries
            .get(ix)
            .map(|dep| format!("{} {}", self.tag.prefix(), dep))
    }

    /// Index of the first entry that satisfies `dep`
    pub fn search(&self, dep: &Dependency) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.overlaps(dep, self.nopromote))
    }

    /// Does any same-named entry of this (provides) set satisfy `req`?
    ///
    /// An unversioned requirement is satisfied by any same-named entry.
    pub fn any_matches(&self, req: &Dependency) -> bool {
        if !req.is_versioned() {
            return self.entries.iter().any(|entry| entry.name == req.name);
        }
        self.search(req).is_some()
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Log how a dependency was resolved
pub fn notify(tag: DepTag, dep: &Dependency, source: Option<&str>, verdict: Verdict) {
    tracing::debug!(
        "{:>9}: {:<45} {} {}",
        tag.to_string(),
        dep.to_string(),
        if verdict == Verdict::Satisfied { "YES" } else { "NO " },
        source.unwrap_or("")
    );
}

/// Does an installed header provide `req`?
///
/// Unversioned requirements always match. Otherwise each same-named
/// Provides entry is compared; a header whose provides carry no versions
/// matches any versioned requirement.
pub fn any_matches_dep(h: &dyn Header, req: &Dependency, nopromote: bool) -> bool {
    if !req.is_versioned() {
        return true;
    }
    let mut provides = DependencySet::from_header(h, DepTag::Provides);
    provides.set_nopromote(nopromote);
    provides
        .iter()
        .filter(|p| p.name == req.name)
        .any(|p| p.overlaps(req, nopromote))
}

/// Compare a requirement against the package's own `N = [E:]V-R`
pub fn header_matches_dep(h: &dyn Header, req: &Dependency, nopromote: bool) -> bool {
    let this = Dependency::new(h.name(), SenseFlags::EQUAL, h.evr());
    this.overlaps(req, nopromote)
}
