// src/transaction/check.rs

//! Dependency checking
//!
//! Every added package must have its Requires satisfied and its Conflicts
//! unsatisfied. Every erased package must not leave an installed package
//! with a dangling requirement. Unsatisfied dependencies are collected as
//! problems; only a resolver error stops the check.
//!
//! Single dependencies are decided by [`TransactionSet::unsatisfied_depend`],
//! which tries in order: the depends cache, the system probes, the added
//! packages, the installed database and finally the solver callback.

use super::TransactionSet;
use super::element::{ElementType, PackageKey};
use super::problems::{Problem, ProblemSet};
use crate::db::PackageDatabase;
use crate::ds::{
    DepTag, Dependency, DependencySet, SenseFlags, Verdict, any_matches_dep, header_matches_dep,
    notify,
};
use crate::error::Result;
use crate::header::{HeaderRef, Tag};
use crate::probe::ProbeOutcome;
use tracing::{debug, info};

/// A package the solver wants added before retrying a dependency
#[derive(Debug, Clone)]
pub struct SolvedPackage {
    pub header: HeaderRef,
    pub key: PackageKey,
    pub upgrade: bool,
}

/// Answer from the solver callback
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    /// Treat the dependency as satisfied
    Satisfied,
    /// No help; the dependency stays unsatisfied
    Declined,
    /// Add these packages and resolve the dependency once more
    Retry(Vec<SolvedPackage>),
}

/// Hook consulted for unsatisfied requirements of added packages
pub trait Solver {
    fn solve(&mut self, dep: &Dependency) -> SolveOutcome;
}

impl<F> Solver for F
where
    F: FnMut(&Dependency) -> SolveOutcome,
{
    fn solve(&mut self, dep: &Dependency) -> SolveOutcome {
        self(dep)
    }
}

/// A missing-ok requirement that nothing satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedHint {
    /// NEVRA of the requiring package, when known
    pub package: Option<String>,
    pub dependency: String,
}

impl TransactionSet {
    /// Check the dependencies of every element
    ///
    /// Returns the number of problems found; they are available from
    /// [`problems`](Self::problems) afterwards. An error means the check
    /// could not be completed.
    pub fn check(&mut self) -> Result<usize> {
        info!("Checking dependencies of {} elements", self.elements.len());
        self.added.make_index();
        self.problems = ProblemSet::new();
        self.skipped_hints.clear();

        // Elements added by the solver are checked too
        let mut i = 0;
        while i < self.elements.len() {
            let p = &self.elements[i];
            i += 1;
            if p.is_source() {
                continue;
            }

            let nevra = p.nevra().to_string();
            let provides = p.provides().clone();

            match p.element_type() {
                ElementType::Added => {
                    let requires = p.requires().clone();
                    let conflicts = p.conflicts().clone();
                    self.check_package_deps(&nevra, Some(&requires), Some(&conflicts), None, true)?;

                    // The first installed conflict is enough for this package
                    let before = self.problems.len();
                    for provide in &provides {
                        self.check_dependent_conflicts(&provide.name)?;
                        if self.problems.len() > before {
                            break;
                        }
                    }
                }
                ElementType::Removed => {
                    let paths: Vec<String> = p.files().paths().collect();
                    for provide in &provides {
                        self.check_dependent_packages(&provide.name)?;
                    }
                    for path in &paths {
                        self.check_dependent_packages(path)?;
                    }
                }
            }
        }

        info!("Dependency check found {} problems", self.problems.len());
        Ok(self.problems.len())
    }

    /// Check one package's requirements and conflicts
    ///
    /// With `dep_name` set only entries of that name are checked.
    fn check_package_deps(
        &mut self,
        nevra: &str,
        requires: Option<&DependencySet>,
        conflicts: Option<&DependencySet>,
        dep_name: Option<&str>,
        adding: bool,
    ) -> Result<()> {
        let tscolor = self.config.color;
        let wanted = |dep: &Dependency| {
            if dep_name.is_some_and(|name| dep.name != name) {
                return false;
            }
            !(tscolor != 0 && dep.color != 0 && tscolor & dep.color == 0)
        };

        for req in requires.into_iter().flatten().filter(|d| wanted(*d)) {
            if self.resolve(req, DepTag::Requires, adding, Some(nevra))? == Verdict::Satisfied {
                continue;
            }
            let suggested = self
                .available
                .all_satisfies_depend(req)
                .into_iter()
                .filter_map(|k| self.available.key(k).map(|h| h.nevra()))
                .collect();
            self.problems.push(Problem::new(
                nevra,
                &format!("{} {}", DepTag::Requires.prefix(), req),
                adding,
                suggested,
            ));
        }

        for conflict in conflicts.into_iter().flatten().filter(|d| wanted(*d)) {
            if self.resolve(conflict, DepTag::Conflicts, adding, Some(nevra))? == Verdict::Unsatisfied {
                continue;
            }
            self.problems.push(Problem::new(
                nevra,
                &format!("{} {}", DepTag::Conflicts.prefix(), conflict),
                adding,
                Vec::new(),
            ));
        }
        Ok(())
    }

    /// Does any installed package conflict with `name`?
    fn check_dependent_conflicts(&mut self, name: &str) -> Result<()> {
        let Some(db) = self.database()? else {
            return Ok(());
        };
        let mut mi = db.init_iterator(Tag::ConflictName, Some(name))?;
        mi.prune(&self.removed_offsets);

        for installed in mi {
            let mut conflicts = DependencySet::from_header(installed.header.as_ref(), DepTag::Conflicts);
            conflicts.set_nopromote(self.config.no_promote);
            let nevra = installed.header.nevra();
            self.check_package_deps(&nevra, None, Some(&conflicts), Some(name), false)?;
        }
        Ok(())
    }

    /// Does any installed package that stays still require `name`?
    fn check_dependent_packages(&mut self, name: &str) -> Result<()> {
        let Some(db) = self.database()? else {
            return Ok(());
        };
        let mut mi = db.init_iterator(Tag::RequireName, Some(name))?;
        mi.prune(&self.removed_offsets);

        for installed in mi {
            let mut requires = DependencySet::from_header(installed.header.as_ref(), DepTag::Requires);
            requires.set_nopromote(self.config.no_promote);
            let nevra = installed.header.nevra();
            self.check_package_deps(&nevra, Some(&requires), None, Some(name), false)?;
        }
        Ok(())
    }

    /// Decide whether `dep` is satisfied in the context of this transaction
    ///
    /// `adding` is true for dependencies of packages being added; only
    /// those may consult the solver.
    pub fn unsatisfied_depend(
        &mut self,
        dep: &Dependency,
        tag: DepTag,
        adding: bool,
    ) -> Result<Verdict> {
        self.resolve(dep, tag, adding, None)
    }

    fn resolve(
        &mut self,
        dep: &Dependency,
        tag: DepTag,
        adding: bool,
        package: Option<&str>,
    ) -> Result<Verdict> {
        let key = dep.to_string();
        let mut retrying = false;
        let mut cacheable = true;

        let verdict = loop {
            if let Some(verdict) = self.cache.lookup(&key) {
                notify(tag, dep, Some("(cached)"), verdict);
                if verdict == Verdict::Unsatisfied && self.skip_missing_ok(tag, dep, &key, package) {
                    return Ok(Verdict::Satisfied);
                }
                return Ok(verdict);
            }

            match self.resolver.probe(dep) {
                ProbeOutcome::Satisfied(source) => {
                    notify(tag, dep, Some(source), Verdict::Satisfied);
                    break Verdict::Satisfied;
                }
                ProbeOutcome::Unsatisfied(source) => {
                    notify(tag, dep, Some(source), Verdict::Unsatisfied);
                    break Verdict::Unsatisfied;
                }
                ProbeOutcome::Continue => {}
            }

            if self.added.satisfies_depend(dep).is_some() {
                // Added packages only answer within this transaction
                if self.config.no_promote {
                    cacheable = false;
                }
                notify(tag, dep, Some("(added provide)"), Verdict::Satisfied);
                break Verdict::Satisfied;
            }

            if let Some(db) = self.database()? {
                if !self.removed_offsets.is_empty() {
                    cacheable = false;
                }
                if let Some(source) = self.search_database(db.as_ref(), dep)? {
                    notify(tag, dep, Some(source), Verdict::Satisfied);
                    break Verdict::Satisfied;
                }
            }

            if adding && !retrying && !self.config.no_suggest {
                let outcome = match self.solver.as_mut() {
                    Some(solver) => solver.solve(dep),
                    None => SolveOutcome::Declined,
                };
                match outcome {
                    SolveOutcome::Satisfied => {
                        notify(tag, dep, Some("(solver)"), Verdict::Satisfied);
                        break Verdict::Satisfied;
                    }
                    SolveOutcome::Declined => {}
                    SolveOutcome::Retry(packages) => {
                        debug!("solver added {} packages for {}", packages.len(), dep);
                        for pkg in packages {
                            self.add_install_element(pkg.header, pkg.key, pkg.upgrade, Vec::new())?;
                        }
                        self.added.make_index();
                        retrying = true;
                        continue;
                    }
                }
            }

            if self.skip_missing_ok(tag, dep, &key, package) {
                cacheable = false;
                break Verdict::Satisfied;
            }

            notify(tag, dep, None, Verdict::Unsatisfied);
            break Verdict::Unsatisfied;
        };

        if cacheable {
            self.cache.store(&key, verdict);
        }
        Ok(verdict)
    }

    /// Let an unsatisfied missing-ok requirement through as a skipped hint
    fn skip_missing_ok(
        &mut self,
        tag: DepTag,
        dep: &Dependency,
        key: &str,
        package: Option<&str>,
    ) -> bool {
        if tag != DepTag::Requires || !dep.flags.contains(SenseFlags::MISSINGOK) {
            return false;
        }
        notify(tag, dep, Some("(hint skipped)"), Verdict::Satisfied);
        self.skipped_hints.push(SkippedHint {
            package: package.map(str::to_string),
            dependency: key.to_string(),
        });
        true
    }

    /// Look for an installed package satisfying `dep`, skipping instances
    /// queued for erasure
    fn search_database(
        &self,
        db: &dyn PackageDatabase,
        dep: &Dependency,
    ) -> Result<Option<&'static str>> {
        let nopromote = self.config.no_promote;

        if dep.name.starts_with('/') {
            let mut mi = db.init_iterator(Tag::Basenames, Some(&dep.name))?;
            mi.prune(&self.removed_offsets);
            if mi.next().is_some() {
                return Ok(Some("(db files)"));
            }
        }

        let mut mi = db.init_iterator(Tag::ProvideName, Some(&dep.name))?;
        mi.prune(&self.removed_offsets);
        for installed in mi {
            if any_matches_dep(installed.header.as_ref(), dep, nopromote) {
                return Ok(Some("(db provides)"));
            }
        }

        let mut mi = db.init_iterator(Tag::Name, Some(&dep.name))?;
        mi.prune(&self.removed_offsets);
        for installed in mi {
            if header_matches_dep(installed.header.as_ref(), dep, nopromote) {
                return Ok(Some("(db package)"));
            }
        }

        Ok(None)
    }
}
