// src/probe/mod.rs

//! Resolver context
//!
//! Dependencies that no package provides can still be satisfied by the
//! system itself: a macro that is defined, a file that is accessible, a
//! packaging feature the resolver supports, a CPU flag, a sysconf value,
//! a kernel release or a shared object on disk. [`ResolverContext`] runs
//! those probes in a fixed order. The synthetic provides sets it builds
//! are computed once and reused for every dependency in the run.

pub mod elf;
pub mod sysinfo;

pub use elf::{FileProbe, HostProbe};

use crate::config::TransactionConfig;
use crate::ds::{Dependency, DependencySet};
use nix::unistd::AccessFlags;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Answer from the system probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Satisfied(&'static str),
    Unsatisfied(&'static str),
    /// No probe claimed the dependency
    Continue,
}

/// Synthetic namespaces; a matching prefix decides the dependency alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Rpmlib,
    Cpuinfo,
    Getconf,
    Uname,
}

impl Namespace {
    fn of(name: &str) -> Option<Self> {
        if name.starts_with("rpmlib(") {
            Some(Self::Rpmlib)
        } else if name.starts_with("cpuinfo(") {
            Some(Self::Cpuinfo)
        } else if name.starts_with("getconf(") {
            Some(Self::Getconf)
        } else if name.starts_with("uname(") {
            Some(Self::Uname)
        } else {
            None
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Rpmlib => "(rpmlib provides)",
            Self::Cpuinfo => "(cpuinfo provides)",
            Self::Getconf => "(getconf provides)",
            Self::Uname => "(uname provides)",
        }
    }
}

/// Argument of `func(arg)`, if `name` has that shape
fn call_arg<'a>(name: &'a str, func: &str) -> Option<&'a str> {
    name.strip_prefix(func)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Mode for the `rwx(path)` access form, e.g. `r-x(/usr/bin/env)`
fn rwx_mode(name: &str) -> Option<(AccessFlags, &str)> {
    let bytes = name.as_bytes();
    if bytes.len() < 5 || bytes[3] != b'(' {
        return None;
    }
    let mut mode = AccessFlags::empty();
    for (i, (set, flag)) in [(b'r', AccessFlags::R_OK), (b'w', AccessFlags::W_OK), (b'x', AccessFlags::X_OK)]
        .into_iter()
        .enumerate()
    {
        match bytes[i] {
            b'-' => {}
            c if c == set => mode |= flag,
            _ => return None,
        }
    }
    let path = name[4..].strip_suffix(')')?;
    if mode.is_empty() {
        mode = AccessFlags::F_OK;
    }
    Some((mode, path))
}

/// Per-run state for the system probes
pub struct ResolverContext {
    root: PathBuf,
    macros: HashMap<String, String>,
    sysinfo_path: PathBuf,
    files: Box<dyn FileProbe>,
    sysinfo: OnceCell<Option<DependencySet>>,
    rpmlib: OnceCell<DependencySet>,
    cpuinfo: OnceCell<DependencySet>,
    getconf: OnceCell<DependencySet>,
    uname: OnceCell<DependencySet>,
}

impl ResolverContext {
    pub fn new(config: &TransactionConfig) -> Self {
        Self {
            root: config.root.clone(),
            macros: config.macros.clone(),
            sysinfo_path: config.sysinfo_path.clone(),
            files: Box::new(HostProbe),
            sysinfo: OnceCell::new(),
            rpmlib: OnceCell::new(),
            cpuinfo: OnceCell::new(),
            getconf: OnceCell::new(),
            uname: OnceCell::new(),
        }
    }

    /// Replace the filesystem used by the probes
    pub fn with_file_probe(mut self, files: Box<dyn FileProbe>) -> Self {
        self.files = files;
        self
    }

    fn rooted(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Run the system probes in order; the first one to answer wins
    pub fn probe(&self, dep: &Dependency) -> ProbeOutcome {
        let name = dep.name.as_str();

        if let Some(outcome) = self.probe_macro(name) {
            return outcome;
        }
        if let Some(outcome) = self.probe_access(name) {
            return outcome;
        }
        if let Some(sysinfo) = self.sysinfo_set()
            && sysinfo.search(dep).is_some()
        {
            return ProbeOutcome::Satisfied("(sysinfo provides)");
        }
        if let Some(ns) = Namespace::of(name) {
            let ds = self.namespace_set(ns);
            return if ds.search(dep).is_some() {
                ProbeOutcome::Satisfied(ns.source())
            } else {
                ProbeOutcome::Unsatisfied(ns.source())
            };
        }
        if let Some(path) = call_arg(name, "soname") {
            return self.probe_soname(path, dep);
        }

        ProbeOutcome::Continue
    }

    /// `%{name}`, `%{?name}` and `%{!?name}`
    fn probe_macro(&self, name: &str) -> Option<ProbeOutcome> {
        let body = name.strip_prefix("%{")?.strip_suffix('}')?;
        let (negate, conditional, macro_name) = if let Some(rest) = body.strip_prefix("!?") {
            (true, true, rest)
        } else if let Some(rest) = body.strip_prefix('?') {
            (false, true, rest)
        } else {
            (false, false, body)
        };

        let expansion = match self.macros.get(macro_name) {
            Some(value) => value.trim().to_string(),
            // An undefined macro expands to itself unless it is conditional
            None if conditional => String::new(),
            None => name.to_string(),
        };
        let mut set = !expansion.is_empty() && expansion.parse::<i64>().map_or(true, |v| v != 0);
        if negate {
            set = self.macros.get(macro_name).is_none();
        }

        Some(if set {
            ProbeOutcome::Satisfied("(macro probe)")
        } else {
            ProbeOutcome::Unsatisfied("(macro probe)")
        })
    }

    fn probe_access(&self, name: &str) -> Option<ProbeOutcome> {
        let (mode, path) = [
            ("exists", AccessFlags::F_OK),
            ("executable", AccessFlags::X_OK),
            ("readable", AccessFlags::R_OK),
            ("writable", AccessFlags::W_OK),
        ]
        .into_iter()
        .find_map(|(func, mode)| call_arg(name, func).map(|path| (mode, path)))
        .or_else(|| rwx_mode(name))?;

        let ok = self.files.access(&self.rooted(path), mode);
        Some(if ok {
            ProbeOutcome::Satisfied("(access probe)")
        } else {
            ProbeOutcome::Unsatisfied("(access probe)")
        })
    }

    fn sysinfo_set(&self) -> Option<&DependencySet> {
        self.sysinfo
            .get_or_init(|| {
                let path = self.rooted(&self.sysinfo_path.to_string_lossy());
                sysinfo::sysinfo_provides(self.files.as_ref(), &path)
            })
            .as_ref()
    }

    fn namespace_set(&self, ns: Namespace) -> &DependencySet {
        match ns {
            Namespace::Rpmlib => self.rpmlib.get_or_init(sysinfo::rpmlib_provides),
            Namespace::Cpuinfo => self.cpuinfo.get_or_init(|| {
                let text = self
                    .files
                    .read_to_string(Path::new("/proc/cpuinfo"))
                    .unwrap_or_default();
                sysinfo::cpuinfo_provides(&text)
            }),
            Namespace::Getconf => self.getconf.get_or_init(sysinfo::getconf_provides),
            Namespace::Uname => self.uname.get_or_init(sysinfo::uname_provides),
        }
    }

    fn probe_soname(&self, path: &str, dep: &Dependency) -> ProbeOutcome {
        const SOURCE: &str = "(soname probe)";
        if !path.starts_with('/') {
            return ProbeOutcome::Unsatisfied(SOURCE);
        }
        let Some(soname) = self.files.elf_soname(&self.rooted(path)) else {
            return ProbeOutcome::Unsatisfied(SOURCE);
        };
        debug!("{} exports {}", path, soname);
        let provide = Dependency::named(soname);
        if provide.evr_overlaps(dep, true) {
            ProbeOutcome::Satisfied(SOURCE)
        } else {
            ProbeOutcome::Unsatisfied(SOURCE)
        }
    }
}

impl std::fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverContext")
            .field("root", &self.root)
            .field("sysinfo_path", &self.sysinfo_path)
            .finish()
    }
}
