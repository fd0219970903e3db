//! Version parsing and comparison
//!
//! Implements the ebuild version grammar (`1.2.3b_alpha4-r5`, `-scm`
//! markers) and its total order:
//! - numeric components compare as integers, except that a component
//!   written with a leading zero compares as a fractional tail
//! - a letter suffix attaches after all numeric components
//! - `_alpha < _beta < _pre < _rc < (nothing) < _p`, each with an
//!   optional integer index
//! - an absent revision is revision 0
//! - `-scm` is greater than any numeric counterpart of the same stem

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One numeric version component, kept as written so that the
/// leading-zero fractional rule can be applied during comparison.
#[derive(Debug, Clone)]
struct NumericPart {
    raw: String,
}

impl NumericPart {
    fn has_leading_zero(&self) -> bool {
        self.raw.len() > 1 && self.raw.starts_with('0')
    }

    fn is_all_zeros(&self) -> bool {
        self.raw.bytes().all(|b| b == b'0')
    }

    /// Integer comparison of digit strings without parsing: strip
    /// leading zeros, then longer wins, then lexicographic.
    fn int_cmp(&self, other: &NumericPart) -> Ordering {
        let a = self.raw.trim_start_matches('0');
        let b = other.raw.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }

    /// Fractional comparison: strip trailing zeros, compare as strings.
    fn frac_cmp(&self, other: &NumericPart) -> Ordering {
        let a = self.raw.trim_end_matches('0');
        let b = other.raw.trim_end_matches('0');
        a.cmp(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl SuffixKind {
    /// Rank in the suffix order; the gap at 4 is the rank of "no
    /// suffix", so `_p` sorts above a plain version.
    fn rank(self) -> u8 {
        match self {
            SuffixKind::Alpha => 0,
            SuffixKind::Beta => 1,
            SuffixKind::Pre => 2,
            SuffixKind::Rc => 3,
            SuffixKind::P => 5,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SuffixKind::Alpha => "alpha",
            SuffixKind::Beta => "beta",
            SuffixKind::Pre => "pre",
            SuffixKind::Rc => "rc",
            SuffixKind::P => "p",
        }
    }
}

const NO_SUFFIX_RANK: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Suffix {
    kind: SuffixKind,
    index: Option<u64>,
}

/// A parsed package version, e.g. `1.2.3b_alpha4-r5`
///
/// Equality and ordering are over the normalized tuple, not the source
/// text: `1.0-r0` equals `1.0`. The source text is retained and printed
/// back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSpec {
    text: String,
    parts: Vec<NumericPart>,
    letter: Option<char>,
    suffixes: Vec<Suffix>,
    revision: Option<u64>,
    scm: bool,
}

impl VersionSpec {
    pub fn new(s: impl AsRef<str>) -> Result<Self> {
        let text = s.as_ref();
        let bad = || Error::BadVersionSpec(text.to_string());

        let mut rest = text;
        let mut revision = None;

        // -r<int> revision, always last
        if let Some(pos) = rest.rfind("-r") {
            let tail = &rest[pos + 2..];
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                revision = Some(tail.parse::<u64>().map_err(|_| bad())?);
                rest = &rest[..pos];
            }
        }

        // -scm marker, or a bare "scm" version
        let mut scm = false;
        if rest == "scm" {
            return Ok(Self {
                text: text.to_string(),
                parts: Vec::new(),
                letter: None,
                suffixes: Vec::new(),
                revision,
                scm: true,
            });
        }
        if let Some(head) = rest.strip_suffix("-scm") {
            scm = true;
            rest = head;
        }

        // numeric components
        let mut parts = Vec::new();
        let mut chars = rest.char_indices().peekable();
        loop {
            let start = match chars.peek() {
                Some(&(i, c)) if c.is_ascii_digit() => i,
                _ => return Err(bad()),
            };
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            parts.push(NumericPart {
                raw: rest[start..end].to_string(),
            });
            match chars.peek() {
                Some(&(_, '.')) => {
                    chars.next();
                }
                _ => break,
            }
        }

        // optional single letter glued to the last component
        let mut letter = None;
        if let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_lowercase() {
                letter = Some(c);
                chars.next();
            }
        }

        // _alpha / _beta / _pre / _rc / _p suffixes
        let mut suffixes = Vec::new();
        while let Some(&(i, '_')) = chars.peek() {
            chars.next();
            let tail = &rest[i + 1..];
            let kind = if tail.starts_with("alpha") {
                SuffixKind::Alpha
            } else if tail.starts_with("beta") {
                SuffixKind::Beta
            } else if tail.starts_with("pre") {
                SuffixKind::Pre
            } else if tail.starts_with("rc") {
                SuffixKind::Rc
            } else if tail.starts_with('p') {
                SuffixKind::P
            } else {
                return Err(bad());
            };
            for _ in 0..kind.as_str().len() {
                chars.next();
            }
            let mut digits = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let index = if digits.is_empty() {
                None
            } else {
                Some(digits.parse::<u64>().map_err(|_| bad())?)
            };
            suffixes.push(Suffix { kind, index });
        }

        if chars.next().is_some() {
            return Err(bad());
        }

        Ok(Self {
            text: text.to_string(),
            parts,
            letter,
            suffixes,
            revision,
            scm,
        })
    }

    /// The version as written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Is this an scm version, or something pretending to be one?
    pub fn is_scm(&self) -> bool {
        self.scm || (self.parts.len() == 1 && self.parts[0].raw == "9999")
    }

    /// The version used by the `~>` operator as an exclusive upper
    /// bound: everything after the second-to-last numeric component is
    /// dropped and that component is incremented, so `5.3.1` becomes
    /// `5.4` and `1.2.3_alpha4-r5` becomes `1.3`.
    pub fn bump(&self) -> VersionSpec {
        let mut parts: Vec<u64> = self
            .parts
            .iter()
            .map(|p| p.raw.trim_start_matches('0').parse::<u64>().unwrap_or(0))
            .collect();
        if parts.is_empty() {
            parts.push(0);
        }
        if parts.len() > 1 {
            parts.pop();
        }
        *parts.last_mut().unwrap() += 1;
        let text = parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        VersionSpec::new(text).expect("bumped version is well formed")
    }

    /// This version without its revision part.
    pub fn remove_revision(&self) -> VersionSpec {
        if self.revision.is_none() {
            return self.clone();
        }
        let mut v = self.clone();
        v.revision = None;
        let pos = v.text.rfind("-r").expect("revision came from the text");
        v.text.truncate(pos);
        v
    }

    /// The revision part only, `r0` if absent.
    pub fn revision_only(&self) -> String {
        format!("r{}", self.revision.unwrap_or(0))
    }

    fn suffix_key_at(&self, i: usize) -> (u8, u64) {
        match self.suffixes.get(i) {
            Some(s) => (s.kind.rank(), s.index.unwrap_or(0)),
            None => (NO_SUFFIX_RANK, 0),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for VersionSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<VersionSpec> for String {
    fn from(v: VersionSpec) -> String {
        v.text
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        // numeric components, pairwise
        let max = self.parts.len().max(other.parts.len());
        for i in 0..max {
            match (self.parts.get(i), other.parts.get(i)) {
                (Some(a), Some(b)) => {
                    let ord = if i == 0 || (!a.has_leading_zero() && !b.has_leading_zero()) {
                        a.int_cmp(b)
                    } else {
                        a.frac_cmp(b)
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                // an scm marker outranks any deeper numeric tail
                (None, Some(_)) => {
                    return if self.scm {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    };
                }
                (Some(_), None) => {
                    return if other.scm {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                }
                (None, None) => unreachable!(),
            }
        }

        if self.scm != other.scm {
            return if self.scm {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        // letter: absent sorts below present
        let ord = match (self.letter, other.letter) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(&b),
        };
        if ord != Ordering::Equal {
            return ord;
        }

        // suffix list, missing entries ranking as "no suffix"
        let max = self.suffixes.len().max(other.suffixes.len());
        for i in 0..max {
            let ord = self.suffix_key_at(i).cmp(&other.suffix_key_at(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }

        self.revision
            .unwrap_or(0)
            .cmp(&other.revision.unwrap_or(0))
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionSpec {}

impl Hash for VersionSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for part in &self.parts {
            if part.is_all_zeros() {
                (1u8, "").hash(state);
            } else if part.has_leading_zero() {
                (1u8, part.raw.trim_end_matches('0')).hash(state);
            } else {
                (0u8, part.raw.as_str()).hash(state);
            }
        }
        self.letter.hash(state);
        for i in 0..self.suffixes.len() {
            self.suffix_key_at(i).hash(state);
        }
        self.revision.unwrap_or(0).hash(state);
        self.scm.hash(state);
    }
}

/// Comparison operator attached to a version constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionOperator {
    /// `=`
    Equal,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `~`: equal disregarding revision
    IgnoreRevision,
    /// `=` with a trailing `*`: component prefix match
    PrefixEqual,
    /// `~>`: at least the operand, below its bump
    Bumped,
}

impl VersionOperator {
    /// Does `candidate` satisfy this operator against `operand`?
    pub fn matches(self, candidate: &VersionSpec, operand: &VersionSpec) -> bool {
        match self {
            VersionOperator::Equal => candidate == operand,
            VersionOperator::Greater => candidate > operand,
            VersionOperator::GreaterEqual => candidate >= operand,
            VersionOperator::Less => candidate < operand,
            VersionOperator::LessEqual => candidate <= operand,
            VersionOperator::IgnoreRevision => {
                candidate.remove_revision() == operand.remove_revision()
            }
            VersionOperator::PrefixEqual => Self::prefix_matches(candidate, operand),
            VersionOperator::Bumped => candidate >= operand && *candidate < operand.bump(),
        }
    }

    fn prefix_matches(candidate: &VersionSpec, operand: &VersionSpec) -> bool {
        if operand.parts.len() > candidate.parts.len() {
            return false;
        }
        for i in 0..operand.parts.len() {
            let a = &operand.parts[i];
            let b = &candidate.parts[i];
            let ord = if i == 0 || (!a.has_leading_zero() && !b.has_leading_zero()) {
                a.int_cmp(b)
            } else {
                a.frac_cmp(b)
            };
            if ord != Ordering::Equal {
                return false;
            }
        }
        // a letter, suffix or revision in the operand anchors the match
        // to the same component depth
        if operand.letter.is_some() || !operand.suffixes.is_empty() {
            if operand.parts.len() != candidate.parts.len() || operand.letter != candidate.letter {
                return false;
            }
            if operand.suffixes.len() > candidate.suffixes.len() {
                return false;
            }
            for (a, b) in operand.suffixes.iter().zip(candidate.suffixes.iter()) {
                if a != b {
                    return false;
                }
            }
        }
        match operand.revision {
            Some(r) => candidate.revision.unwrap_or(0) == r,
            None => true,
        }
    }
}

impl FromStr for VersionOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(VersionOperator::Equal),
            ">" => Ok(VersionOperator::Greater),
            ">=" => Ok(VersionOperator::GreaterEqual),
            "<" => Ok(VersionOperator::Less),
            "<=" => Ok(VersionOperator::LessEqual),
            "~" => Ok(VersionOperator::IgnoreRevision),
            "=*" => Ok(VersionOperator::PrefixEqual),
            "~>" => Ok(VersionOperator::Bumped),
            other => Err(Error::BadVersionOperator(other.to_string())),
        }
    }
}

impl fmt::Display for VersionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionOperator::Equal => "=",
            VersionOperator::Greater => ">",
            VersionOperator::GreaterEqual => ">=",
            VersionOperator::Less => "<",
            VersionOperator::LessEqual => "<=",
            VersionOperator::IgnoreRevision => "~",
            VersionOperator::PrefixEqual => "=*",
            VersionOperator::Bumped => "~>",
        };
        f.write_str(s)
    }
}

/// One `(operator, version)` constraint inside a package dep spec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRequirement {
    pub operator: VersionOperator,
    pub version: VersionSpec,
}

impl VersionRequirement {
    pub fn new(operator: VersionOperator, version: VersionSpec) -> Self {
        Self { operator, version }
    }

    pub fn matches(&self, candidate: &VersionSpec) -> bool {
        self.operator.matches(candidate, &self.version)
    }
}

/// How multiple version requirements combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionRequirementsMode {
    #[default]
    And,
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(s: &str) -> VersionSpec {
        VersionSpec::new(s).unwrap()
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(VersionSpec::new("").is_err());
        assert!(VersionSpec::new("x.y").is_err());
        assert!(VersionSpec::new("1.").is_err());
        assert!(VersionSpec::new("1..2").is_err());
        assert!(VersionSpec::new("1.2_omega").is_err());
        assert!(VersionSpec::new("1.2ab").is_err());
        assert!(VersionSpec::new("1.2-r").is_err());
    }

    #[test]
    fn test_parse_accepts_full_grammar() {
        assert!(VersionSpec::new("1").is_ok());
        assert!(VersionSpec::new("1.2.3b_alpha4-r5").is_ok());
        assert!(VersionSpec::new("20240101").is_ok());
        assert!(VersionSpec::new("1.2_beta_p1").is_ok());
        assert!(VersionSpec::new("scm").is_ok());
        assert!(VersionSpec::new("1.2-scm").is_ok());
        assert!(VersionSpec::new("1.2-scm-r3").is_ok());
    }

    #[test]
    fn test_total_order_scenario() {
        // ascending reference order
        let sorted = [
            "1.0", "1.0-r1", "1.0.1", "1.1_alpha", "1.1_alpha1", "1.1_pre", "1.1", "2.0-scm",
        ];
        for pair in sorted.windows(2) {
            assert!(
                v(pair[0]) < v(pair[1]),
                "{} should be < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_letter_attaches_to_preceding_component() {
        assert!(v("1.2a") > v("1.2"));
        assert!(v("1.2a") < v("1.3"));
        assert!(v("1.2a") < v("1.2.1"));
        assert!(v("1.2b") > v("1.2a"));
    }

    #[test]
    fn test_leading_zero_fractional_compare() {
        assert!(v("1.02") < v("1.1"));
        assert!(v("1.010") == v("1.01"));
        assert!(v("1.2") < v("1.10"));
    }

    #[test]
    fn test_scm_greater_than_same_stem() {
        assert!(v("1-scm") > v("1.999.999"));
        assert!(v("1.2-scm") > v("1.2_p1"));
        assert!(v("scm") > v("9999"));
        assert!(v("2.0-scm") < v("3.0"));
        assert!(v("1.2-scm-r3") > v("1.2-scm"));
    }

    #[test]
    fn test_suffix_ranks() {
        assert!(v("1.1_alpha") < v("1.1_beta"));
        assert!(v("1.1_beta") < v("1.1_pre"));
        assert!(v("1.1_pre") < v("1.1_rc"));
        assert!(v("1.1_rc") < v("1.1"));
        assert!(v("1.1") < v("1.1_p"));
        assert!(v("1.1_alpha") < v("1.1_alpha1"));
    }

    #[test]
    fn test_equality_is_normalized() {
        assert_eq!(v("1.0-r0"), v("1.0"));
        assert_eq!(v("1.1_alpha0"), v("1.1_alpha"));
        assert!(v("1.0") != v("1.0.0"));
        assert!(v("1.0") < v("1.0.0"));
    }

    #[test]
    fn test_trichotomy() {
        let versions = [
            "1.0", "1.0-r1", "1.0.1", "1.1_alpha", "1.1", "1.2a", "1.02", "2.0-scm", "scm",
        ];
        for a in &versions {
            for b in &versions {
                let (a, b) = (v(a), v(b));
                let relations =
                    [a < b, a == b, a > b].iter().filter(|&&r| r).count();
                assert_eq!(relations, 1, "exactly one relation for {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_bump() {
        assert_eq!(v("5.3.1").bump(), v("5.4"));
        assert_eq!(v("1.2.3_alpha4-r5").bump(), v("1.3"));
        assert_eq!(v("5").bump(), v("6"));
    }

    #[test]
    fn test_revision_split() {
        assert_eq!(v("1.0-r3").remove_revision(), v("1.0"));
        assert_eq!(v("1.0-r3").revision_only(), "r3");
        assert_eq!(v("1.0").revision_only(), "r0");
        assert_eq!(v("1.0").remove_revision(), v("1.0"));
    }

    #[test]
    fn test_is_scm() {
        assert!(v("scm").is_scm());
        assert!(v("1.2-scm").is_scm());
        assert!(v("9999").is_scm());
        assert!(!v("1.2").is_scm());
    }

    #[test]
    fn test_operator_matching() {
        use VersionOperator::*;
        assert!(Equal.matches(&v("1.2.3"), &v("1.2.3")));
        assert!(!Equal.matches(&v("1.2.3-r1"), &v("1.2.3-r2")));
        assert!(IgnoreRevision.matches(&v("1.2.3-r7"), &v("1.2.3")));
        assert!(PrefixEqual.matches(&v("1.2.3"), &v("1.2")));
        assert!(!PrefixEqual.matches(&v("1.3"), &v("1.2")));
        assert!(!PrefixEqual.matches(&v("1.20"), &v("1.2")));
        assert!(Bumped.matches(&v("5.3.9"), &v("5.3.1")));
        assert!(!Bumped.matches(&v("5.4"), &v("5.3.1")));
    }

    #[test]
    fn test_operator_parse_round_trip() {
        for s in ["=", ">", ">=", "<", "<=", "~", "=*", "~>"] {
            let op: VersionOperator = s.parse().unwrap();
            assert_eq!(op.to_string(), s);
        }
        assert!("==".parse::<VersionOperator>().is_err());
    }
}
