// src/manifest.rs
//! Transaction manifests
//!
//! A manifest describes packages in TOML so a transaction can be assembled
//! without package files:
//!
//! ```toml
//! [[install]]
//! name = "A"
//! version = "1"
//! release = "1"
//! requires = ["B >= 2"]
//!
//! [[erase]]
//! name = "oldpkg"
//! ```
//!
//! `[[available]]` entries use the same fields as `[[install]]` and are
//! offered as suggestions for unsatisfied dependencies.

use crate::ds::{Dependency, SenseFlags};
use crate::error::{Error, Result};
use crate::header::{HeaderBuilder, MemoryHeader};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A package described in a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default = "default_os")]
    pub os: String,

    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    /// Requirements needed by the package's %pre script
    #[serde(default)]
    pub requires_pre: Vec<String>,
    /// Weak requirements; nothing is reported when they are missing
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub obsoletes: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,

    /// Erase installed packages of the same name
    #[serde(default)]
    pub upgrade: bool,
    #[serde(default)]
    pub source: bool,
    /// Retrieval key, e.g. the package file name
    #[serde(default)]
    pub key: Option<String>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

fn default_os() -> String {
    "linux".to_string()
}

impl PackageSpec {
    pub fn to_header(&self) -> Result<MemoryHeader> {
        let mut b = HeaderBuilder::new(&self.name, &self.version, &self.release)
            .arch(&self.arch)
            .os(&self.os);
        if let Some(epoch) = self.epoch {
            b = b.epoch(epoch);
        }
        if self.source {
            b = b.source();
        }
        for dep in &self.provides {
            b = b.provides(dep);
        }
        for dep in &self.requires {
            b = b.requires(dep);
        }
        for (deps, flag) in [
            (&self.requires_pre, SenseFlags::SCRIPT_PRE),
            (&self.hints, SenseFlags::MISSINGOK),
        ] {
            for dep in deps {
                let d = Dependency::parse(dep)?;
                b = b.requires_with(&d.name, d.flags | flag, &d.evr);
            }
        }
        for dep in &self.conflicts {
            b = b.conflicts(dep);
        }
        for dep in &self.obsoletes {
            b = b.obsoletes(dep);
        }
        for path in &self.files {
            b = b.file(path);
        }
        b.build()
    }
}

/// An installed package to erase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraseSpec {
    pub name: String,
    /// Only erase instances with this version
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub install: Vec<PackageSpec>,
    #[serde(default)]
    pub erase: Vec<EraseSpec>,
    #[serde(default)]
    pub available: Vec<PackageSpec>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for spec in self.install.iter().chain(&self.available) {
            if spec.name.is_empty() || spec.version.is_empty() {
                return Err(Error::ParseError(
                    "package entries need a name and a version".to_string(),
                ));
            }
        }
        if let Some(erase) = self.erase.iter().find(|e| e.name.is_empty()) {
            return Err(Error::ParseError(format!(
                "erase entry without a name: {:?}",
                erase
            )));
        }
        Ok(())
    }
}
