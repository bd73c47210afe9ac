// src/probe/sysinfo.rs
//! Synthetic provides describing the running system
//!
//! Builders for the dependency sets behind the `rpmlib(...)`,
//! `cpuinfo(...)`, `getconf(...)` and `uname(...)` namespaces, plus the
//! administrator-maintained sysinfo provides.

use super::elf::FileProbe;
use crate::ds::{DepTag, Dependency, DependencySet, SenseFlags};
use std::path::Path;
use tracing::{debug, warn};

/// Package format features this resolver understands
const RPMLIB_FEATURES: &[(&str, &str)] = &[
    ("rpmlib(VersionedDependencies)", "3.0.3-1"),
    ("rpmlib(CompressedFileNames)", "3.0.4-1"),
    ("rpmlib(PayloadIsBzip2)", "3.0.5-1"),
    ("rpmlib(PayloadFilesHavePrefix)", "4.0-1"),
    ("rpmlib(ExplicitPackageProvide)", "4.0-1"),
    ("rpmlib(HeaderLoadSortsTags)", "4.0.1-1"),
    ("rpmlib(ScriptletInterpreterArgs)", "4.0.3-1"),
    ("rpmlib(PartialHardlinkSets)", "4.0.4-1"),
    ("rpmlib(ConcurrentAccess)", "4.1-1"),
    ("rpmlib(BuiltinLuaScripts)", "4.2.2-1"),
    ("rpmlib(HeaderTagTypeInt64)", "4.4.3-1"),
    ("rpmlib(PayloadIsLzma)", "4.4.6-1"),
    ("rpmlib(FileDigestParameterized)", "4.4.6-1"),
    ("rpmlib(PayloadIsXz)", "5.2-1"),
];

pub fn rpmlib_provides() -> DependencySet {
    let entries = RPMLIB_FEATURES
        .iter()
        .map(|(name, evr)| Dependency::new(*name, SenseFlags::EQUAL | SenseFlags::RPMLIB, *evr))
        .collect();
    DependencySet::from_entries(DepTag::Provides, entries)
}

/// Parse provides text, one dependency per line
///
/// Blank lines and `#` comments are skipped, as are lines that do not
/// parse.
pub fn parse_provides(text: &str, origin: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Dependency::parse(line) {
            Ok(dep) => deps.push(dep),
            Err(e) => warn!("{}: skipping \"{}\": {}", origin, line, e),
        }
    }
    deps
}

/// Load sysinfo provides from a file, or from the `Providename` file when
/// `path` is a directory. `None` when nothing is there.
pub fn sysinfo_provides(files: &dyn FileProbe, path: &Path) -> Option<DependencySet> {
    let origin = path.display().to_string();
    let text = match files.list_dir(path) {
        Some(names) => {
            if !names.iter().any(|n| n == "Providename") {
                return None;
            }
            files.read_to_string(&path.join("Providename"))?
        }
        None => files.read_to_string(path)?,
    };
    let deps = parse_provides(&text, &origin);
    debug!("Loaded {} sysinfo provides from {}", deps.len(), origin);
    Some(DependencySet::from_entries(DepTag::Provides, deps))
}

/// A value usable as an EVR: non-empty and free of whitespace
fn evr_value(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        None
    } else {
        Some(value)
    }
}

fn namespaced(ns: &str, key: &str, value: Option<&str>) -> Dependency {
    let name = format!("{}({})", ns, key);
    match value.and_then(evr_value) {
        Some(evr) => Dependency::new(name, SenseFlags::EQUAL, evr),
        None => Dependency::named(name),
    }
}

/// Provides for the first processor listed in `/proc/cpuinfo`
///
/// Keys are lowercased with spaces turned into underscores. Each entry of
/// the `flags` line becomes its own unversioned `cpuinfo(flag)` provide.
pub fn cpuinfo_provides(text: &str) -> DependencySet {
    let mut ds = DependencySet::new(DepTag::Provides);
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        if key.is_empty() {
            continue;
        }
        if key == "flags" {
            for flag in value.split_whitespace() {
                ds.push(Dependency::named(format!("cpuinfo({})", flag)));
            }
        } else {
            ds.push(namespaced("cpuinfo", &key, Some(value)));
        }
    }
    ds
}

const GETCONF_VARS: &[(&str, libc::c_int)] = &[
    ("PAGE_SIZE", libc::_SC_PAGESIZE),
    ("PAGESIZE", libc::_SC_PAGESIZE),
    ("NPROCESSORS_CONF", libc::_SC_NPROCESSORS_CONF),
    ("NPROCESSORS_ONLN", libc::_SC_NPROCESSORS_ONLN),
    ("CLK_TCK", libc::_SC_CLK_TCK),
    ("ARG_MAX", libc::_SC_ARG_MAX),
    ("CHILD_MAX", libc::_SC_CHILD_MAX),
    ("OPEN_MAX", libc::_SC_OPEN_MAX),
    ("NGROUPS_MAX", libc::_SC_NGROUPS_MAX),
    ("LINE_MAX", libc::_SC_LINE_MAX),
    ("PHYS_PAGES", libc::_SC_PHYS_PAGES),
];

/// `getconf(NAME) = value` for the sysconf variables that are defined
pub fn getconf_provides() -> DependencySet {
    let mut ds = DependencySet::new(DepTag::Provides);
    for (name, var) in GETCONF_VARS {
        // SAFETY: sysconf only reads the configuration variable
        let value = unsafe { libc::sysconf(*var) };
        if value < 0 {
            continue;
        }
        ds.push(namespaced("getconf", name, Some(&value.to_string())));
    }
    ds
}

/// `uname(field) = value` for the fields of uname(2)
pub fn uname_provides() -> DependencySet {
    let mut ds = DependencySet::new(DepTag::Provides);
    let uts = match nix::sys::utsname::uname() {
        Ok(uts) => uts,
        Err(e) => {
            warn!("uname failed: {}", e);
            return ds;
        }
    };
    let fields = [
        ("sysname", uts.sysname()),
        ("nodename", uts.nodename()),
        ("release", uts.release()),
        ("version", uts.version()),
        ("machine", uts.machine()),
    ];
    for (field, value) in fields {
        ds.push(namespaced("uname", field, value.to_str()));
    }
    ds
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model name\t: Intel(R) Xeon(R) CPU
flags\t\t: fpu vme sse2 avx2

processor\t: 1
vendor_id\t: GenuineIntel
";

    #[test]
    fn test_rpmlib_provides() {
        let ds = rpmlib_provides();
        let dep = Dependency::parse("rpmlib(PayloadIsXz) <= 5.2-1").unwrap();
        assert!(ds.search(&dep).is_some());
        let dep = Dependency::parse("rpmlib(PayloadIsZstd) <= 5.4.18-1").unwrap();
        assert!(ds.search(&dep).is_none());
    }

    #[test]
    fn test_cpuinfo_first_processor_only() {
        let ds = cpuinfo_provides(CPUINFO);
        let names: Vec<String> = ds.iter().map(|d| d.to_string()).collect();
        assert!(names.contains(&"cpuinfo(processor) = 0".to_string()));
        assert!(names.contains(&"cpuinfo(cpu_family) = 6".to_string()));
        assert!(names.contains(&"cpuinfo(model_name)".to_string()));
        assert!(names.contains(&"cpuinfo(sse2)".to_string()));
        assert!(!names.contains(&"cpuinfo(processor) = 1".to_string()));
    }

    #[test]
    fn test_parse_provides_skips_junk() {
        let deps = parse_provides("# comment\n\nfoo = 1.0\nbar >> 2\nbaz\n", "test");
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].to_string(), "foo = 1.0");
        assert_eq!(deps[1].name, "baz");
    }

    #[test]
    fn test_getconf_has_pagesize() {
        let ds = getconf_provides();
        assert!(ds.iter().any(|d| d.name == "getconf(PAGESIZE)"));
    }

    #[test]
    fn test_uname_has_sysname() {
        let ds = uname_provides();
        assert!(ds.iter().any(|d| d.name == "uname(sysname)"));
    }
}
