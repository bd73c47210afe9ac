// src/transaction/problems.rs

//! Dependency problems found by a transaction check
//!
//! Problems are collected, not thrown: a check keeps going after the first
//! unsatisfied dependency so the caller sees all of them at once.

use std::fmt;

/// What kind of dependency went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// A requirement nothing satisfies
    Requires,
    /// A conflict that something satisfies
    Conflicts,
}

/// An unsatisfied dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// NEVRA of the package owning the dependency
    pub package: String,
    /// Dependency with its tag prefix, e.g. `R foo >= 1.0`
    pub dependency: String,
    pub kind: ProblemKind,
    /// Packages outside the transaction that would satisfy it
    pub suggested: Vec<String>,
    /// False when the dependency belongs to an installed package
    pub adding: bool,
}

impl Problem {
    pub fn new(package: &str, dependency: &str, adding: bool, suggested: Vec<String>) -> Self {
        let kind = if dependency.starts_with('C') {
            ProblemKind::Conflicts
        } else {
            ProblemKind::Requires
        };
        Self {
            package: package.to_string(),
            dependency: dependency.to_string(),
            kind,
            suggested,
            adding,
        }
    }

    /// The dependency without its tag prefix
    pub fn dependency_text(&self) -> &str {
        self.dependency
            .get(2..)
            .filter(|_| self.dependency.as_bytes().get(1) == Some(&b' '))
            .unwrap_or(&self.dependency)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = if self.adding { "" } else { "(installed) " };
        match self.kind {
            ProblemKind::Requires => write!(
                f,
                "{} is needed by {}{}",
                self.dependency_text(),
                installed,
                self.package
            )?,
            ProblemKind::Conflicts => write!(
                f,
                "{} conflicts with {}{}",
                self.dependency_text(),
                installed,
                self.package
            )?,
        }
        if !self.suggested.is_empty() {
            write!(f, " (suggested: {})", self.suggested.join(", "))?;
        }
        Ok(())
    }
}

/// Append-only list of problems
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.problems.iter()
    }
}

impl<'a> IntoIterator for &'a ProblemSet {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}

impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for problem in &self.problems {
            writeln!(f, "\t{}", problem)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_display() {
        let p = Problem::new("A-1-1.x86_64", "R B >= 2", true, vec![]);
        assert_eq!(p.kind, ProblemKind::Requires);
        assert_eq!(p.to_string(), "B >= 2 is needed by A-1-1.x86_64");
    }

    #[test]
    fn test_installed_conflict_display() {
        let p = Problem::new(
            "C-1-1.x86_64",
            "C B < 2",
            false,
            vec!["B-3-1.x86_64".to_string()],
        );
        assert_eq!(p.kind, ProblemKind::Conflicts);
        assert_eq!(
            p.to_string(),
            "B < 2 conflicts with (installed) C-1-1.x86_64 (suggested: B-3-1.x86_64)"
        );
    }

    #[test]
    fn test_problem_set_is_ordered() {
        let mut set = ProblemSet::new();
        set.push(Problem::new("A", "R x", true, vec![]));
        set.push(Problem::new("B", "R y", true, vec![]));
        let pkgs: Vec<&str> = set.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(pkgs, vec!["A", "B"]);
        assert_eq!(set.to_string(), "\tx is needed by A\n\ty is needed by B\n");
    }
}
