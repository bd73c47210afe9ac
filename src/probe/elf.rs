// src/probe/elf.rs
//! Host filesystem access for dependency probes
//!
//! `access(2)` checks, whole-file reads and ELF soname extraction, behind
//! the [`FileProbe`] trait so tests can substitute a fake filesystem.

use goblin::Object;
use goblin::elf::Elf;
use nix::unistd::AccessFlags;
use std::path::Path;
use tracing::debug;

/// Filesystem operations the resolver probes need
pub trait FileProbe {
    /// Does `access(2)` succeed for `path` with `mode`?
    fn access(&self, path: &Path, mode: AccessFlags) -> bool;

    fn read_to_string(&self, path: &Path) -> Option<String>;

    /// Names of the regular files in a directory
    fn list_dir(&self, path: &Path) -> Option<Vec<String>>;

    /// DT_SONAME of the shared object at `path`
    fn elf_soname(&self, path: &Path) -> Option<String>;
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl FileProbe for HostProbe {
    fn access(&self, path: &Path, mode: AccessFlags) -> bool {
        nix::unistd::access(path, mode).is_ok()
    }

    fn read_to_string(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn list_dir(&self, path: &Path) -> Option<Vec<String>> {
        let entries = std::fs::read_dir(path).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Some(names)
    }

    fn elf_soname(&self, path: &Path) -> Option<String> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        soname_of(&bytes)
    }
}

/// Extract the soname from an in-memory ELF image
pub fn soname_of(bytes: &[u8]) -> Option<String> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => soname_from_elf(&elf),
        Ok(_) => None,
        Err(e) => {
            debug!("Failed to parse ELF object: {}", e);
            None
        }
    }
}

fn soname_from_elf(elf: &Elf<'_>) -> Option<String> {
    let soname = elf.soname?;
    // Match the find-provides convention for 64-bit objects
    if elf.is_64 {
        Some(format!("{}()(64bit)", soname))
    } else {
        Some(soname.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_soname_of_garbage() {
        assert_eq!(soname_of(b"not an elf file"), None);
        assert_eq!(soname_of(&[]), None);
    }

    #[test]
    fn test_host_access() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("present");
        std::fs::write(&file, "x").unwrap();

        assert!(HostProbe.access(&file, AccessFlags::F_OK));
        assert!(!HostProbe.access(&dir.path().join("absent"), AccessFlags::F_OK));
    }

    #[test]
    fn test_host_list_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Providename"), "foo\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let names = HostProbe.list_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["Providename".to_string()]);
        assert!(HostProbe.list_dir(&dir.path().join("absent")).is_none());
    }

    #[test]
    fn test_host_soname_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(HostProbe.elf_soname(&dir.path().join("libnone.so")), None);
    }
}
