//! Mask reasons
//!
//! A candidate package may be disallowed for several reasons at once:
//! keyword acceptance, profile or repository masks, user masks, license
//! acceptance, an unknown recipe dialect, or association with a masked
//! virtual target. Reasons are computed on demand and collected into a
//! small bitset; an empty set means the candidate is visible.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single reason a candidate is disallowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskReason {
    /// No accepted keyword in the candidate's KEYWORDS
    Keyword,
    /// Matched by the user's package.mask and not unmasked
    UserMask,
    /// Matched by the active profile's package.mask chain
    ProfileMask,
    /// Masked by the repository itself
    RepositoryMask,
    /// Unknown or forbidden recipe dialect
    Eapi,
    /// License not in the accepted set
    License,
    /// A virtual whose target is itself masked
    ByAssociation,
}

impl MaskReason {
    pub const ALL: [MaskReason; 7] = [
        MaskReason::Keyword,
        MaskReason::UserMask,
        MaskReason::ProfileMask,
        MaskReason::RepositoryMask,
        MaskReason::Eapi,
        MaskReason::License,
        MaskReason::ByAssociation,
    ];

    fn bit(self) -> u8 {
        match self {
            MaskReason::Keyword => 1 << 0,
            MaskReason::UserMask => 1 << 1,
            MaskReason::ProfileMask => 1 << 2,
            MaskReason::RepositoryMask => 1 << 3,
            MaskReason::Eapi => 1 << 4,
            MaskReason::License => 1 << 5,
            MaskReason::ByAssociation => 1 << 6,
        }
    }
}

impl fmt::Display for MaskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MaskReason::Keyword => "keyword",
            MaskReason::UserMask => "user mask",
            MaskReason::ProfileMask => "profile mask",
            MaskReason::RepositoryMask => "repository mask",
            MaskReason::Eapi => "EAPI",
            MaskReason::License => "license",
            MaskReason::ByAssociation => "by association",
        };
        f.write_str(s)
    }
}

/// The union of mask reasons for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskReasons(u8);

impl MaskReasons {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, reason: MaskReason) {
        self.0 |= reason.bit();
    }

    pub fn contains(self, reason: MaskReason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: MaskReasons) -> MaskReasons {
        MaskReasons(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = MaskReason> {
        MaskReason::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<MaskReason> for MaskReasons {
    fn from_iter<I: IntoIterator<Item = MaskReason>>(iter: I) -> Self {
        let mut reasons = MaskReasons::none();
        for r in iter {
            reasons.insert(r);
        }
        reasons
    }
}

impl fmt::Display for MaskReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("not masked");
        }
        let mut first = true;
        for reason in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_means_visible() {
        let reasons = MaskReasons::none();
        assert!(reasons.is_empty());
        assert!(!reasons.contains(MaskReason::Keyword));
    }

    #[test]
    fn test_insert_and_union() {
        let mut a = MaskReasons::none();
        a.insert(MaskReason::Keyword);
        let mut b = MaskReasons::none();
        b.insert(MaskReason::License);
        let u = a.union(b);
        assert!(u.contains(MaskReason::Keyword));
        assert!(u.contains(MaskReason::License));
        assert!(!u.contains(MaskReason::UserMask));
    }

    #[test]
    fn test_display_joins_reasons() {
        let reasons: MaskReasons = [MaskReason::Keyword, MaskReason::ProfileMask]
            .into_iter()
            .collect();
        assert_eq!(reasons.to_string(), "keyword, profile mask");
    }
}
