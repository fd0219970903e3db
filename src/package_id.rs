//! Package identifiers and metadata
//!
//! A [`PackageId`] is a shared handle to a concrete
//! `(name, version, repository)` triple. The owning repository holds the
//! canonical `Arc` instance; metadata keys are filled in lazily through
//! a one-shot slot, so an id never changes once its metadata has been
//! observed.

use crate::dep_spec::DepSpec;
use crate::name::{KeywordName, QualifiedPackageName, RepositoryName, SlotName, UseFlagName};
use crate::version::VersionSpec;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Parsed metadata keys of a concrete package version
///
/// The dependency keys hold trees already parsed under the recipe's
/// dialect.
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    pub description: String,
    pub long_description: Option<String>,
    pub slot: SlotName,
    /// The recipe dialect identifier; may name a dialect the core does
    /// not know, which masks the package.
    pub eapi: String,
    pub homepage: DepSpec,
    pub license: DepSpec,
    pub src_uri: DepSpec,
    /// Flags the recipe recognizes, with an optional default state
    pub iuse: IndexMap<UseFlagName, Option<bool>>,
    pub keywords: BTreeSet<KeywordName>,
    pub build_depend: DepSpec,
    pub run_depend: DepSpec,
    pub post_depend: DepSpec,
    pub suggested_depend: DepSpec,
}

impl Default for PackageMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            long_description: None,
            slot: SlotName::new("0").expect("0 is a valid slot"),
            eapi: "pms-eapi-0".to_string(),
            homepage: DepSpec::empty(),
            license: DepSpec::empty(),
            src_uri: DepSpec::empty(),
            iuse: IndexMap::new(),
            keywords: BTreeSet::new(),
            build_depend: DepSpec::empty(),
            run_depend: DepSpec::empty(),
            post_depend: DepSpec::empty(),
            suggested_depend: DepSpec::empty(),
        }
    }
}

/// Handle to a concrete `(name, version, repository)` triple
///
/// Equality and ordering are structural on the triple; the metadata
/// slot does not participate.
#[derive(Debug)]
pub struct PackageId {
    name: QualifiedPackageName,
    version: VersionSpec,
    repository: RepositoryName,
    metadata: OnceLock<Arc<PackageMetadata>>,
}

impl PackageId {
    pub fn new(
        name: QualifiedPackageName,
        version: VersionSpec,
        repository: RepositoryName,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            version,
            repository,
            metadata: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &QualifiedPackageName {
        &self.name
    }

    pub fn version(&self) -> &VersionSpec {
        &self.version
    }

    pub fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// The metadata, if the owning repository has supplied it.
    pub fn metadata(&self) -> Option<&Arc<PackageMetadata>> {
        self.metadata.get()
    }

    /// One-shot metadata initialization; the first supplied value wins
    /// and later calls are no-ops, so an observed id never changes.
    pub fn supply_metadata(&self, metadata: Arc<PackageMetadata>) -> &Arc<PackageMetadata> {
        self.metadata.get_or_init(|| metadata)
    }

    /// The slot, if metadata is loaded.
    pub fn slot(&self) -> Option<&SlotName> {
        self.metadata.get().map(|m| &m.slot)
    }

    /// `cat/pkg-1.2::repo` form used in messages.
    pub fn canonical_form(&self) -> String {
        format!("{}-{}::{}", self.name, self.version, self.repository)
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.repository == other.repository
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.repository.hash(state);
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.repository.cmp(&other.repository))
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_form())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str, version: &str, repo: &str) -> Arc<PackageId> {
        PackageId::new(
            name.parse().unwrap(),
            VersionSpec::new(version).unwrap(),
            repo.parse().unwrap(),
        )
    }

    #[test]
    fn test_equality_is_on_the_triple() {
        let a = id("app-a/x", "1.0", "repo");
        let b = id("app-a/x", "1.0", "repo");
        let c = id("app-a/x", "1.0", "other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ordering_name_version_repository() {
        let older = id("app-a/x", "1.0", "repo");
        let newer = id("app-a/x", "2.0", "repo");
        let other = id("app-b/a", "0.1", "repo");
        assert!(older < newer);
        assert!(newer < other);
    }

    #[test]
    fn test_metadata_is_one_shot() {
        let pkg = id("app-a/x", "1.0", "repo");
        assert!(pkg.metadata().is_none());
        let first = Arc::new(PackageMetadata {
            description: "first".to_string(),
            ..Default::default()
        });
        pkg.supply_metadata(first);
        let second = Arc::new(PackageMetadata {
            description: "second".to_string(),
            ..Default::default()
        });
        pkg.supply_metadata(second);
        assert_eq!(pkg.metadata().unwrap().description, "first");
    }

    #[test]
    fn test_canonical_form() {
        let pkg = id("app-a/x", "1.2-r1", "repo");
        assert_eq!(pkg.to_string(), "app-a/x-1.2-r1::repo");
    }
}
