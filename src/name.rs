//! Validated name scalars
//!
//! Every identifier the resolver handles is a validated newtype with a
//! total order: category and package names, slots, repositories,
//! keywords, USE flags and set names. Construction checks the character
//! set; everything downstream can assume well-formed names.

use crate::error::{Error, NameKind, Result};
use crate::version::VersionSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn valid_name_first(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn valid_name_rest(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-')
}

fn validate_simple(s: &str, kind: NameKind) -> Result<()> {
    let mut chars = s.chars();
    let ok = match chars.next() {
        Some(c) => valid_name_first(c) && chars.all(valid_name_rest),
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Name {
            kind,
            value: s.to_string(),
        })
    }
}

macro_rules! name_newtype {
    ($(#[$doc:meta])* $name:ident, $validate:expr) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self> {
                let s = s.into();
                let validate: fn(&str) -> Result<()> = $validate;
                validate(&s)?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(n: $name) -> String {
                n.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

name_newtype!(
    /// A package category, e.g. `sys-apps`
    CategoryName,
    |s| validate_simple(s, NameKind::Category)
);

name_newtype!(
    /// A package name within a category, e.g. `coreutils`.
    ///
    /// Must not end in a hyphen followed by something that parses as a
    /// version, so `foo-1.2` is rejected as a name: the trailing part
    /// belongs to the version.
    PackageName,
    |s| {
        validate_simple(s, NameKind::Package)?;
        if let Some(pos) = s.rfind('-') {
            let tail = &s[pos + 1..];
            if tail.chars().next().is_some_and(|c| c.is_ascii_digit())
                && VersionSpec::new(tail).is_ok()
            {
                return Err(Error::Name {
                    kind: NameKind::Package,
                    value: s.to_string(),
                });
            }
        }
        Ok(())
    }
);

name_newtype!(
    /// A slot name, e.g. `0` or `3.11`
    SlotName,
    |s| validate_simple(s, NameKind::Slot)
);

name_newtype!(
    /// A repository name, e.g. `gentoo` or `installed`
    RepositoryName,
    |s| validate_simple(s, NameKind::Repository)
);

name_newtype!(
    /// A named package set, e.g. `world` or `system`
    SetName,
    |s| validate_simple(s, NameKind::Set)
);

name_newtype!(
    /// A USE flag name, e.g. `ssl`
    UseFlagName,
    |s| {
        let mut chars = s.chars();
        let ok = match chars.next() {
            Some(c) => {
                c.is_ascii_alphanumeric()
                    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '@' | '-'))
            }
            None => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Name {
                kind: NameKind::UseFlag,
                value: s.to_string(),
            })
        }
    }
);

name_newtype!(
    /// An architecture keyword, e.g. `amd64`, `~amd64`, `-*` or `**`
    KeywordName,
    |s| {
        if matches!(s, "*" | "**" | "-*") {
            return Ok(());
        }
        let body = s.strip_prefix(['~', '-']).unwrap_or(s);
        validate_simple(body, NameKind::Keyword)
    }
);

impl KeywordName {
    /// The architecture without any stability prefix.
    pub fn arch(&self) -> &str {
        self.0.trim_start_matches(['~', '-'])
    }

    /// Is this a `~arch` testing keyword?
    pub fn is_testing(&self) -> bool {
        self.0.starts_with('~') && self.0 != "~"
    }

    /// Is this a `-arch` or `-*` broken marker?
    pub fn is_broken(&self) -> bool {
        self.0.starts_with('-')
    }
}

/// A category plus package name, e.g. `sys-apps/coreutils`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedPackageName {
    pub category: CategoryName,
    pub package: PackageName,
}

impl QualifiedPackageName {
    pub fn new(category: CategoryName, package: PackageName) -> Self {
        Self { category, package }
    }
}

impl FromStr for QualifiedPackageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (cat, pkg) = s.split_once('/').ok_or_else(|| Error::Name {
            kind: NameKind::Package,
            value: s.to_string(),
        })?;
        if pkg.contains('/') {
            return Err(Error::Name {
                kind: NameKind::Package,
                value: s.to_string(),
            });
        }
        Ok(Self {
            category: cat.parse()?,
            package: pkg.parse()?,
        })
    }
}

impl TryFrom<String> for QualifiedPackageName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<QualifiedPackageName> for String {
    fn from(q: QualifiedPackageName) -> String {
        q.to_string()
    }
}

impl fmt::Display for QualifiedPackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

/// State of a USE flag for a given package view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseFlagState {
    Enabled,
    Disabled,
    Unspecified,
}

impl UseFlagState {
    pub fn is_enabled(self) -> bool {
        self == UseFlagState::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_category_name_valid() {
        assert!(CategoryName::new("sys-apps").is_ok());
        assert!(CategoryName::new("dev-libs").is_ok());
        assert!(CategoryName::new("_virtual").is_ok());
        assert!(CategoryName::new("x11+misc.old").is_ok());
    }

    #[test]
    fn test_category_name_invalid() {
        assert_matches!(
            CategoryName::new(""),
            Err(Error::Name {
                kind: NameKind::Category,
                ..
            })
        );
        assert!(CategoryName::new("-leading-dash").is_err());
        assert!(CategoryName::new("has space").is_err());
        assert!(CategoryName::new("has/slash").is_err());
    }

    #[test]
    fn test_package_name_rejects_version_tail() {
        assert!(PackageName::new("coreutils").is_ok());
        assert!(PackageName::new("gtk+").is_ok());
        assert!(PackageName::new("libcanberra-gtk3").is_ok());
        assert!(PackageName::new("foo-1.2").is_err());
        assert!(PackageName::new("foo-1").is_err());
        // not a parseable version tail, so fine as a name
        assert!(PackageName::new("foo-bar").is_ok());
    }

    #[test]
    fn test_qualified_name_round_trip() {
        let q: QualifiedPackageName = "app-editors/vim".parse().unwrap();
        assert_eq!(q.category.as_str(), "app-editors");
        assert_eq!(q.package.as_str(), "vim");
        assert_eq!(q.to_string(), "app-editors/vim");
    }

    #[test]
    fn test_qualified_name_needs_one_slash() {
        assert!("vim".parse::<QualifiedPackageName>().is_err());
        assert!("a/b/c".parse::<QualifiedPackageName>().is_err());
    }

    #[test]
    fn test_keyword_name_forms() {
        let k = KeywordName::new("~amd64").unwrap();
        assert!(k.is_testing());
        assert_eq!(k.arch(), "amd64");
        assert!(KeywordName::new("-*").unwrap().is_broken());
        assert!(KeywordName::new("**").is_ok());
        assert!(KeywordName::new("~").is_err());
    }

    #[test]
    fn test_name_ordering() {
        let a: QualifiedPackageName = "app-a/x".parse().unwrap();
        let b: QualifiedPackageName = "app-b/a".parse().unwrap();
        assert!(a < b);
    }
}
