//! Dep list entries
//!
//! Every planned action is one entry: an install, an already satisfied
//! dependency, a suggestion, a virtual, a weak block warning or a
//! masked target. Entries carry provenance tags and an
//! upgrade/downgrade/rebuild classification against the installed set.

use crate::dep_spec::{DepTag, PackageDepSpec};
use crate::mask::MaskReasons;
use crate::name::{RepositoryName, UseFlagName};
use crate::package_id::PackageId;
use crate::version::VersionSpec;
use std::fmt;
use std::sync::Arc;

/// What an entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepListEntryKind {
    /// A package to build and merge
    Package,
    /// A part of a package merged alongside its parent
    Subpackage,
    /// Suggested only, not scheduled
    Suggested,
    /// A virtual satisfied by an already installed provider
    Provided,
    /// A virtual name resolved through its provider mapping
    Virtual,
    /// Already installed and left alone
    AlreadyInstalled,
    /// A target whose candidates are all masked
    Masked,
    /// A weak block against an installed package
    Block,
}

impl DepListEntryKind {
    /// Entries of this kind get built and merged.
    pub fn is_installable(self) -> bool {
        matches!(self, DepListEntryKind::Package | DepListEntryKind::Subpackage)
    }
}

/// Classification against what is installed in the entry's slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeType {
    /// Nothing installed under this name
    New,
    /// Installed, but not in this slot
    NewSlot,
    Upgrade { from: VersionSpec },
    Downgrade { from: VersionSpec },
    /// Same version again: USE or repository changed
    Rebuild,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::New => f.write_str("N"),
            ChangeType::NewSlot => f.write_str("S"),
            ChangeType::Upgrade { from } => write!(f, "U {}", from),
            ChangeType::Downgrade { from } => write!(f, "D {}", from),
            ChangeType::Rebuild => f.write_str("R"),
        }
    }
}

/// One entry of the install plan
#[derive(Debug, Clone)]
pub struct DepListEntry {
    pub kind: DepListEntryKind,
    /// The chosen id; absent for masked or block entries that have no
    /// concrete candidate
    pub package_id: Option<Arc<PackageId>>,
    /// The spec that caused this entry
    pub spec: PackageDepSpec,
    /// Where an installable entry will be merged
    pub destination: Option<RepositoryName>,
    /// Why this entry is in the plan; grows as more constraints land on it
    pub tags: Vec<DepTag>,
    pub change: Option<ChangeType>,
    /// For masked entries: why the best candidate was rejected
    pub mask_reasons: MaskReasons,
    /// USE flags the resolver chose to override for this build
    pub use_overrides: Vec<(UseFlagName, bool)>,
}

impl fmt::Display for DepListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package_id {
            Some(id) => write!(f, "{}", id)?,
            None => write!(f, "{}", self.spec)?,
        }
        if let Some(change) = &self.change {
            write!(f, " [{}]", change)?;
        }
        Ok(())
    }
}
