// src/fi.rs

//! File lists
//!
//! The per-package file list as stored in a header: compressed into
//! basenames, a directory table and per-file directory indexes, plus file
//! digests and multilib colors.

use crate::header::{Header, Tag};
use serde::{Deserialize, Serialize};

/// Path prefix substitution applied when a package is installed elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub old_path: String,
    pub new_path: String,
}

impl Relocation {
    pub fn new(old_path: &str, new_path: &str) -> Self {
        Self {
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    basenames: Vec<String>,
    dirnames: Vec<String>,
    dirindexes: Vec<u32>,
    digests: Vec<String>,
    colors: Vec<u32>,
}

impl FileList {
    pub fn from_header(h: &dyn Header) -> Self {
        let basenames = h.get_strings(Tag::Basenames).to_vec();
        let count = basenames.len();
        let mut colors = h.get_ints(Tag::FileColors).to_vec();
        colors.resize(count, 0);
        let mut digests = h.get_strings(Tag::FileDigests).to_vec();
        digests.resize(count, String::new());

        Self {
            basenames,
            dirnames: h.get_strings(Tag::Dirnames).to_vec(),
            dirindexes: h.get_ints(Tag::DirIndexes).to_vec(),
            digests,
            colors,
        }
    }

    pub fn len(&self) -> usize {
        self.basenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basenames.is_empty()
    }

    pub fn basename(&self, ix: usize) -> Option<&str> {
        self.basenames.get(ix).map(String::as_str)
    }

    /// Directory of file `ix`, with its trailing slash
    pub fn dirname(&self, ix: usize) -> Option<&str> {
        let dx = *self.dirindexes.get(ix)? as usize;
        self.dirnames.get(dx).map(String::as_str)
    }

    pub fn path(&self, ix: usize) -> Option<String> {
        Some(format!("{}{}", self.dirname(ix)?, self.basename(ix)?))
    }

    pub fn color(&self, ix: usize) -> u32 {
        self.colors.get(ix).copied().unwrap_or(0)
    }

    pub fn digest(&self, ix: usize) -> Option<&str> {
        self.digests
            .get(ix)
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }

    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.len()).filter_map(|ix| self.path(ix))
    }

    /// Rewrite directory names according to the relocation table
    ///
    /// The longest matching prefix wins. Directories no relocation applies
    /// to are left alone.
    pub fn relocate(&mut self, relocations: &[Relocation]) {
        for dir in &mut self.dirnames {
            let best = relocations
                .iter()
                .filter(|r| {
                    let old = r.old_path.trim_end_matches('/');
                    dir.starts_with(old)
                        && matches!(dir.as_bytes().get(old.len()), Some(b'/') | None)
                })
                .max_by_key(|r| r.old_path.trim_end_matches('/').len());
            if let Some(r) = best {
                let old = r.old_path.trim_end_matches('/');
                let new = r.new_path.trim_end_matches('/');
                *dir = format!("{}{}", new, &dir[old.len()..]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;

    fn sample() -> FileList {
        let h = HeaderBuilder::new("tool", "1.0", "1")
            .file("/opt/tool/bin/tool")
            .colored_file("/opt/tool/lib/libtool.so.1", 2)
            .file("/etc/tool.conf")
            .build()
            .unwrap();
        FileList::from_header(&h)
    }

    #[test]
    fn test_paths() {
        let fi = sample();
        assert_eq!(fi.len(), 3);
        assert_eq!(fi.path(0).unwrap(), "/opt/tool/bin/tool");
        assert_eq!(fi.basename(1).unwrap(), "libtool.so.1");
        assert_eq!(fi.dirname(2).unwrap(), "/etc/");
        assert_eq!(fi.color(1), 2);
        assert!(fi.digest(0).is_some());
        assert!(fi.path(3).is_none());
    }

    #[test]
    fn test_relocate_longest_prefix() {
        let mut fi = sample();
        fi.relocate(&[
            Relocation::new("/opt", "/usr/local"),
            Relocation::new("/opt/tool/lib", "/usr/lib64"),
        ]);
        assert_eq!(fi.path(0).unwrap(), "/usr/local/tool/bin/tool");
        assert_eq!(fi.path(1).unwrap(), "/usr/lib64/libtool.so.1");
        assert_eq!(fi.path(2).unwrap(), "/etc/tool.conf");
    }

    #[test]
    fn test_relocate_requires_component_boundary() {
        let mut fi = sample();
        fi.relocate(&[Relocation::new("/op", "/srv")]);
        assert_eq!(fi.path(0).unwrap(), "/opt/tool/bin/tool");
    }
}
