// src/header/mod.rs

//! Package headers
//!
//! The transaction code never looks at the binary header format. It only
//! needs tag lookup, which the [`Header`] trait provides. [`MemoryHeader`]
//! is a tag map that round-trips through JSON for the SQLite store, and
//! [`HeaderBuilder`] assembles one from package metadata.

use crate::ds::{DepTag, Dependency, SenseFlags};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use strum_macros::{Display, EnumString};

/// Header tags understood by the transaction code
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
pub enum Tag {
    Name,
    Epoch,
    Version,
    Release,
    Arch,
    Os,
    SourceRpm,
    Size,
    HdrId,
    PkgId,
    ProvideName,
    ProvideVersion,
    ProvideFlags,
    ProvideColors,
    RequireName,
    RequireVersion,
    RequireFlags,
    RequireColors,
    ConflictName,
    ConflictVersion,
    ConflictFlags,
    ConflictColors,
    ObsoleteName,
    ObsoleteVersion,
    ObsoleteFlags,
    ObsoleteColors,
    Basenames,
    Dirnames,
    DirIndexes,
    FileDigests,
    FileColors,
}

/// Typed tag data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagValue {
    Int32(Vec<u32>),
    Int64(Vec<u64>),
    String(String),
    StringArray(Vec<String>),
    Bin(Vec<u8>),
}

/// Tag access to a package header
pub trait Header: fmt::Debug {
    fn get_tag(&self, tag: Tag) -> Option<&TagValue>;

    fn set_tag(&mut self, tag: Tag, value: TagValue);

    fn tag_list(&self) -> Vec<Tag>;

    fn is_entry(&self, tag: Tag) -> bool {
        self.get_tag(tag).is_some()
    }

    /// Scalar string, or the first element of a string array
    fn get_string(&self, tag: Tag) -> Option<&str> {
        match self.get_tag(tag)? {
            TagValue::String(s) => Some(s.as_str()),
            TagValue::StringArray(v) => v.first().map(String::as_str),
            _ => None,
        }
    }

    fn get_strings(&self, tag: Tag) -> &[String] {
        match self.get_tag(tag) {
            Some(TagValue::StringArray(v)) => v,
            Some(TagValue::String(s)) => std::slice::from_ref(s),
            _ => &[],
        }
    }

    fn get_ints(&self, tag: Tag) -> &[u32] {
        match self.get_tag(tag) {
            Some(TagValue::Int32(v)) => v,
            _ => &[],
        }
    }

    fn name(&self) -> &str {
        self.get_string(Tag::Name).unwrap_or("")
    }

    fn epoch(&self) -> Option<u32> {
        self.get_ints(Tag::Epoch).first().copied()
    }

    fn version(&self) -> &str {
        self.get_string(Tag::Version).unwrap_or("")
    }

    fn release(&self) -> &str {
        self.get_string(Tag::Release).unwrap_or("")
    }

    fn arch(&self) -> Option<&str> {
        self.get_string(Tag::Arch)
    }

    fn os(&self) -> Option<&str> {
        self.get_string(Tag::Os)
    }

    /// `[E:]V-R`
    fn evr(&self) -> String {
        match self.epoch() {
            Some(e) => format!("{}:{}-{}", e, self.version(), self.release()),
            None => format!("{}-{}", self.version(), self.release()),
        }
    }

    fn nevr(&self) -> String {
        format!("{}-{}", self.name(), self.evr())
    }

    fn nevra(&self) -> String {
        match self.arch() {
            Some(arch) => format!("{}.{}", self.nevr(), arch),
            None => self.nevr(),
        }
    }

    /// Multilib color: union of the per-file colors
    fn color(&self) -> u32 {
        self.get_ints(Tag::FileColors)
            .iter()
            .fold(0, |acc, c| acc | c)
            & 0x0f
    }

    fn hdrid(&self) -> Option<&str> {
        self.get_string(Tag::HdrId)
    }

    fn pkgid(&self) -> Option<&str> {
        self.get_string(Tag::PkgId)
    }

    /// Source packages are the ones without a SOURCERPM tag
    fn is_source(&self) -> bool {
        !self.is_entry(Tag::SourceRpm)
    }

    fn size(&self) -> u64 {
        match self.get_tag(Tag::Size) {
            Some(TagValue::Int64(v)) => v.first().copied().unwrap_or(0),
            Some(TagValue::Int32(v)) => v.first().copied().map(u64::from).unwrap_or(0),
            _ => 0,
        }
    }
}

pub type HeaderRef = Rc<dyn Header>;

/// Are two headers the same build?
///
/// Header ids decide when both carry one. A header id on only one side
/// means they differ; with neither, the `N = [E:]V-R` identities are compared.
pub fn headers_identical(first: &dyn Header, second: &dyn Header) -> bool {
    match (first.hdrid(), second.hdrid()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => {
            let a = Dependency::new(first.name(), SenseFlags::EQUAL, first.evr());
            let b = Dependency::new(second.name(), SenseFlags::EQUAL, second.evr());
            a.overlaps(&b, true)
        }
        _ => false,
    }
}

/// Header held as a tag map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryHeader {
    tags: BTreeMap<Tag, TagValue>,
}

impl MemoryHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Copy the tags of any header into a map
    pub fn copy_of(h: &dyn Header) -> Self {
        let mut copy = Self::new();
        for tag in h.tag_list() {
            if let Some(value) = h.get_tag(tag) {
                copy.tags.insert(tag, value.clone());
            }
        }
        copy
    }

    pub fn remove_tag(&mut self, tag: Tag) -> Option<TagValue> {
        self.tags.remove(&tag)
    }
}

impl Header for MemoryHeader {
    fn get_tag(&self, tag: Tag) -> Option<&TagValue> {
        self.tags.get(&tag)
    }

    fn set_tag(&mut self, tag: Tag, value: TagValue) {
        self.tags.insert(tag, value);
    }

    fn tag_list(&self) -> Vec<Tag> {
        self.tags.keys().copied().collect()
    }
}

struct FileSpec {
    path: String,
    color: u32,
    digest: String,
}

/// Builds a [`MemoryHeader`] from package metadata
///
/// Arch and OS default to `x86_64`/`linux`. Binary packages get a
/// SOURCERPM tag; call [`HeaderBuilder::source`] for a source package.
/// Dependency strings are parsed when the header is built.
pub struct HeaderBuilder {
    name: String,
    epoch: Option<u32>,
    version: String,
    release: String,
    arch: Option<String>,
    os: Option<String>,
    source: bool,
    deps: Vec<(DepTag, Result<Dependency>)>,
    files: Vec<FileSpec>,
    size: Option<u64>,
    hdrid: Option<String>,
    pkgid: Option<String>,
}

impl HeaderBuilder {
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            epoch: None,
            version: version.to_string(),
            release: release.to_string(),
            arch: Some("x86_64".to_string()),
            os: Some("linux".to_string()),
            source: false,
            deps: Vec::new(),
            files: Vec::new(),
            size: None,
            hdrid: None,
            pkgid: None,
        }
    }

    pub fn epoch(mut self, epoch: u32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }

    pub fn without_arch(mut self) -> Self {
        self.arch = None;
        self
    }

    pub fn os(mut self, os: &str) -> Self {
        self.os = Some(os.to_string());
        self
    }

    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    pub fn provides(self, dep: &str) -> Self {
        self.dep(DepTag::Provides, dep)
    }

    pub fn requires(self, dep: &str) -> Self {
        self.dep(DepTag::Requires, dep)
    }

    pub fn conflicts(self, dep: &str) -> Self {
        self.dep(DepTag::Conflicts, dep)
    }

    pub fn obsoletes(self, dep: &str) -> Self {
        self.dep(DepTag::Obsoletes, dep)
    }

    /// Requirement with explicit flags, e.g. a `%post` prerequisite
    pub fn requires_with(mut self, name: &str, flags: SenseFlags, evr: &str) -> Self {
        self.deps
            .push((DepTag::Requires, Ok(Dependency::new(name, flags, evr))));
        self
    }

    pub fn dep(mut self, tag: DepTag, dep: &str) -> Self {
        self.deps.push((tag, Dependency::parse(dep)));
        self
    }

    pub fn file(self, path: &str) -> Self {
        self.colored_file(path, 0)
    }

    pub fn colored_file(mut self, path: &str, color: u32) -> Self {
        let digest = hex::encode(Sha256::digest(path.as_bytes()));
        self.files.push(FileSpec {
            path: path.to_string(),
            color,
            digest,
        });
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn hdrid(mut self, hdrid: &str) -> Self {
        self.hdrid = Some(hdrid.to_string());
        self
    }

    pub fn pkgid(mut self, pkgid: &str) -> Self {
        self.pkgid = Some(pkgid.to_string());
        self
    }

    pub fn build(self) -> Result<MemoryHeader> {
        if self.name.is_empty() {
            return Err(Error::ParseError("Package name is empty".to_string()));
        }

        let mut h = MemoryHeader::new();
        h.set_tag(Tag::Name, TagValue::String(self.name.clone()));
        if let Some(epoch) = self.epoch {
            h.set_tag(Tag::Epoch, TagValue::Int32(vec![epoch]));
        }
        h.set_tag(Tag::Version, TagValue::String(self.version.clone()));
        h.set_tag(Tag::Release, TagValue::String(self.release.clone()));
        if let Some(arch) = self.arch {
            h.set_tag(Tag::Arch, TagValue::String(arch));
        }
        if let Some(os) = self.os {
            h.set_tag(Tag::Os, TagValue::String(os));
        }
        if !self.source {
            h.set_tag(
                Tag::SourceRpm,
                TagValue::String(format!("{}-{}-{}.src.rpm", self.name, self.version, self.release)),
            );
        }
        if let Some(size) = self.size {
            h.set_tag(Tag::Size, TagValue::Int64(vec![size]));
        }
        if let Some(pkgid) = self.pkgid {
            h.set_tag(Tag::PkgId, TagValue::String(pkgid));
        }

        let mut deps = Vec::with_capacity(self.deps.len() + 1);
        for (tag, dep) in self.deps {
            deps.push((tag, dep?));
        }

        // Every package provides itself
        if !deps
            .iter()
            .any(|(tag, d)| *tag == DepTag::Provides && d.name == self.name)
        {
            deps.push((
                DepTag::Provides,
                Dependency::new(&self.name, SenseFlags::EQUAL, h.evr()),
            ));
        }

        for tag in [
            DepTag::Provides,
            DepTag::Requires,
            DepTag::Conflicts,
            DepTag::Obsoletes,
        ] {
            let set: Vec<Dependency> = deps
                .iter()
                .filter(|(t, _)| *t == tag)
                .map(|(_, d)| d.clone())
                .collect();
            if !set.is_empty() {
                write_deps(&mut h, tag, &set);
            }
        }

        if !self.files.is_empty() {
            write_files(&mut h, &self.files);
        }

        let hdrid = match self.hdrid {
            Some(id) => id,
            None => hex::encode(Sha256::digest(h.to_json()?.as_bytes())),
        };
        h.set_tag(Tag::HdrId, TagValue::String(hdrid));

        Ok(h)
    }
}

fn write_deps(h: &mut MemoryHeader, tag: DepTag, deps: &[Dependency]) {
    let (n, v, f, c) = match tag {
        DepTag::Provides => (
            Tag::ProvideName,
            Tag::ProvideVersion,
            Tag::ProvideFlags,
            Tag::ProvideColors,
        ),
        DepTag::Requires => (
            Tag::RequireName,
            Tag::RequireVersion,
            Tag::RequireFlags,
            Tag::RequireColors,
        ),
        DepTag::Conflicts => (
            Tag::ConflictName,
            Tag::ConflictVersion,
            Tag::ConflictFlags,
            Tag::ConflictColors,
        ),
        DepTag::Obsoletes => (
            Tag::ObsoleteName,
            Tag::ObsoleteVersion,
            Tag::ObsoleteFlags,
            Tag::ObsoleteColors,
        ),
        DepTag::Name => return,
    };

    h.set_tag(
        n,
        TagValue::StringArray(deps.iter().map(|d| d.name.clone()).collect()),
    );
    h.set_tag(
        v,
        TagValue::StringArray(deps.iter().map(|d| d.evr.clone()).collect()),
    );
    h.set_tag(
        f,
        TagValue::Int32(deps.iter().map(|d| d.flags.bits()).collect()),
    );
    if deps.iter().any(|d| d.color != 0) {
        h.set_tag(c, TagValue::Int32(deps.iter().map(|d| d.color).collect()));
    }
}

fn write_files(h: &mut MemoryHeader, files: &[FileSpec]) {
    let mut dirnames: Vec<String> = Vec::new();
    let mut basenames = Vec::with_capacity(files.len());
    let mut dirindexes = Vec::with_capacity(files.len());

    for file in files {
        let (dir, base) = match file.path.rfind('/') {
            Some(slash) => (&file.path[..=slash], &file.path[slash + 1..]),
            None => ("", file.path.as_str()),
        };
        let index = match dirnames.iter().position(|d| d == dir) {
            Some(index) => index,
            None => {
                dirnames.push(dir.to_string());
                dirnames.len() - 1
            }
        };
        basenames.push(base.to_string());
        dirindexes.push(index as u32);
    }

    h.set_tag(Tag::Basenames, TagValue::StringArray(basenames));
    h.set_tag(Tag::Dirnames, TagValue::StringArray(dirnames));
    h.set_tag(Tag::DirIndexes, TagValue::Int32(dirindexes));
    h.set_tag(
        Tag::FileDigests,
        TagValue::StringArray(files.iter().map(|f| f.digest.clone()).collect()),
    );
    h.set_tag(
        Tag::FileColors,
        TagValue::Int32(files.iter().map(|f| f.color).collect()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::DependencySet;

    #[test]
    fn test_builder_identity() {
        let h = HeaderBuilder::new("bash", "5.2", "1").epoch(1).build().unwrap();
        assert_eq!(h.name(), "bash");
        assert_eq!(h.evr(), "1:5.2-1");
        assert_eq!(h.nevra(), "bash-1:5.2-1.x86_64");
        assert!(!h.is_source());
        assert!(h.hdrid().is_some());
    }

    #[test]
    fn test_builder_adds_self_provide() {
        let h = HeaderBuilder::new("B", "2", "1")
            .provides("libB.so.1")
            .build()
            .unwrap();
        let provides = DependencySet::from_header(&h, DepTag::Provides);
        assert_eq!(provides.len(), 2);
        assert_eq!(provides.get(1).unwrap().to_string(), "B = 2-1");
    }

    #[test]
    fn test_builder_keeps_explicit_self_provide() {
        let h = HeaderBuilder::new("B", "2", "1")
            .provides("B = 2")
            .build()
            .unwrap();
        let provides = DependencySet::from_header(&h, DepTag::Provides);
        assert_eq!(provides.len(), 1);
        assert_eq!(provides.get(0).unwrap().evr, "2");
    }

    #[test]
    fn test_builder_rejects_bad_dependency() {
        let result = HeaderBuilder::new("A", "1", "1").requires("B >> 2").build();
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn test_source_package() {
        let h = HeaderBuilder::new("A", "1", "1").source().build().unwrap();
        assert!(h.is_source());
    }

    #[test]
    fn test_files_and_color() {
        let h = HeaderBuilder::new("glibc", "2.38", "1")
            .colored_file("/lib64/libc.so.6", 2)
            .file("/usr/share/doc/glibc/README")
            .file("/lib64/ld-linux-x86-64.so.2")
            .build()
            .unwrap();
        assert_eq!(h.color(), 2);
        assert_eq!(h.get_strings(Tag::Dirnames).len(), 2);
        assert_eq!(h.get_ints(Tag::DirIndexes), &[0, 1, 0]);
    }

    #[test]
    fn test_identical_headers() {
        let a = HeaderBuilder::new("A", "1", "1").build().unwrap();
        let b = HeaderBuilder::new("A", "1", "1").build().unwrap();
        let c = HeaderBuilder::new("A", "1", "2").build().unwrap();
        assert!(headers_identical(&a, &b));
        assert!(!headers_identical(&a, &c));

        let mut d = a.clone();
        d.remove_tag(Tag::HdrId);
        assert!(!headers_identical(&a, &d));
        let mut e = b.clone();
        e.remove_tag(Tag::HdrId);
        assert!(headers_identical(&d, &e));
    }

    #[test]
    fn test_json_round_trip() {
        let h = HeaderBuilder::new("A", "1", "1")
            .requires("B >= 2")
            .build()
            .unwrap();
        let back = MemoryHeader::from_json(&h.to_json().unwrap()).unwrap();
        assert_eq!(h, back);
    }
}
