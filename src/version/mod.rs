// src/version/mod.rs

//! RPM version comparison
//!
//! Implements the rpmvercmp segment algorithm and the parsing of
//! `[epoch:]version[-release]` strings used throughout dependency
//! comparison.

use std::cmp::Ordering;
use std::fmt;

/// Compare two version (or release) strings segment by segment.
///
/// Non-alphanumeric characters only separate segments. A numeric segment
/// is always newer than an alphabetic one, numeric segments compare by
/// magnitude (leading zeros ignored) and alphabetic segments compare
/// bytewise. When one string runs out of segments first it is older.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < one.len() || j < two.len() {
        while i < one.len() && !one[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let is_num = one[i].is_ascii_digit();
        let seg1 = take_segment(one, &mut i, is_num);
        let seg2 = take_segment(two, &mut j, is_num);

        // Segments of different kinds: numbers beat letters
        if seg2.is_empty() {
            return if is_num {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if is_num {
            let s1 = strip_leading_zeros(seg1);
            let s2 = strip_leading_zeros(seg2);
            s1.len().cmp(&s2.len()).then_with(|| s1.cmp(s2))
        } else {
            seg1.cmp(seg2)
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }

    let rest1 = i < one.len();
    let rest2 = j < two.len();
    match (rest1, rest2) {
        (false, false) => Ordering::Equal,
        (false, true) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn take_segment<'a>(s: &'a [u8], pos: &mut usize, numeric: bool) -> &'a [u8] {
    let start = *pos;
    while *pos < s.len()
        && if numeric {
            s[*pos].is_ascii_digit()
        } else {
            s[*pos].is_ascii_alphabetic()
        }
    {
        *pos += 1;
    }
    &s[start..*pos]
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|&&c| c == b'0').count();
    &s[n..]
}

/// A parsed epoch-version-release triple
///
/// The epoch is kept as text so that "absent" and "present but empty"
/// can be told apart the way dependency comparison requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Evr {
    pub epoch: Option<String>,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    /// Parse an EVR string
    ///
    /// Format: [epoch:]version[-release]
    /// - "1.2.3" → epoch=None, version="1.2.3", release=None
    /// - "2:1.2.3-4.el8" → epoch="2", version="1.2.3", release="4.el8"
    /// - ":1.0-1" → epoch="0" (an empty epoch reads as zero)
    ///
    /// The epoch is only split off when the text before the colon is all
    /// digits; the release starts after the last dash.
    pub fn parse(s: &str) -> Self {
        let digits = s.bytes().take_while(|c| c.is_ascii_digit()).count();
        let (epoch, rest) = if s[digits..].starts_with(':') {
            let e = &s[..digits];
            let e = if e.is_empty() { "0" } else { e };
            (Some(e.to_string()), &s[digits + 1..])
        } else {
            (None, s)
        };

        let (version, release) = match rest.rfind('-') {
            Some(dash) => (
                rest[..dash].to_string(),
                Some(rest[dash + 1..].to_string()),
            ),
            None => (rest.to_string(), None),
        };

        Self {
            epoch,
            version,
            release,
        }
    }

    /// Numeric epoch, treating absent or malformed epochs as zero
    pub fn epoch_num(&self) -> u64 {
        self.epoch
            .as_deref()
            .and_then(|e| e.parse().ok())
            .unwrap_or(0)
    }

    /// Full comparison where a missing component sorts before a present one
    pub fn compare(&self, other: &Evr) -> Ordering {
        compare_values(self.epoch.as_deref(), other.epoch.as_deref())
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| compare_values(self.release.as_deref(), other.release.as_deref()))
    }
}

fn compare_values(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(a), Some(b)) => rpmvercmp(a, b),
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}
