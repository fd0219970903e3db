//! Repository interface
//!
//! A repository is an abstract source of package ids, metadata, masks,
//! virtuals and USE state. The core never assumes an on-disk layout;
//! everything flows through this trait. Implementations must be cheap
//! to invalidate and reload.

pub mod cache;
pub mod fake;

pub use cache::{MemoryCache, MetadataCache, RawMetadata};
pub use fake::{FakeRepository, InstalledRepository};

use crate::dep_parser::{self, find_dialect};
use crate::dep_spec::PackageDepSpec;
use crate::error::Result;
use crate::name::{
    CategoryName, QualifiedPackageName, RepositoryName, UseFlagName, UseFlagState,
};
use crate::package_id::{PackageId, PackageMetadata};
use crate::version::VersionSpec;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// What a repository can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepositoryCapabilities {
    /// Packages from here can be built and merged
    pub installable: bool,
    /// Holds installed packages and can act as a merge destination
    pub installed: bool,
    /// Packages from here can be removed
    pub uninstallable: bool,
    /// Can be synchronized against a remote source tree
    pub syncable: bool,
    /// Keeps the world set
    pub holds_world: bool,
}

/// Abstract source of package ids and their metadata
pub trait Repository: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &RepositoryName;

    fn capabilities(&self) -> RepositoryCapabilities;

    fn category_names(&self) -> Vec<CategoryName>;

    fn has_category(&self, category: &CategoryName) -> bool {
        self.category_names().contains(category)
    }

    fn package_names(&self, category: &CategoryName) -> Vec<QualifiedPackageName>;

    fn version_specs(&self, package: &QualifiedPackageName) -> Vec<VersionSpec>;

    fn has_version(&self, package: &QualifiedPackageName, version: &VersionSpec) -> bool {
        self.version_specs(package).contains(version)
    }

    /// All ids for a package, in ascending version order.
    fn package_ids(&self, package: &QualifiedPackageName) -> Vec<Arc<PackageId>>;

    /// The id's metadata, loading and latching it on first access.
    fn metadata(&self, id: &Arc<PackageId>) -> Result<Arc<PackageMetadata>>;

    /// Masked by the repository's own mask entries?
    fn repository_masked(&self, id: &PackageId) -> bool;

    /// Masked by the repository's profile chain?
    fn profile_masked(&self, id: &PackageId) -> bool;

    /// The repository-level USE state for a flag, from profile defaults
    /// and recipe defaults.
    fn query_use(&self, flag: &UseFlagName, id: Option<&PackageId>) -> UseFlagState;

    fn query_use_mask(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool;

    fn query_use_force(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool;

    fn is_arch_flag(&self, flag: &UseFlagName) -> bool;

    fn is_expand_flag(&self, flag: &UseFlagName) -> bool;

    /// The USE_EXPAND variable names this repository's profile declares.
    fn expand_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn mirrors(&self, name: &str) -> Vec<String>;

    /// Virtual package names this repository maps to provider specs.
    fn virtuals(&self) -> BTreeMap<QualifiedPackageName, PackageDepSpec>;

    /// The profile-declared system set members, if any.
    fn system_packages(&self) -> Vec<PackageDepSpec> {
        Vec::new()
    }

    /// Profile directories, for the recipe invocation boundary.
    fn profile_directories(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Drop cached state so the next query rereads the source.
    fn invalidate(&self);

    /// For installed repositories: the filesystem root packages were
    /// merged to.
    fn installed_root(&self) -> Option<PathBuf> {
        None
    }

    /// For installed repositories: when the id was merged.
    fn installed_time(&self, _id: &PackageId) -> Option<DateTime<Utc>> {
        None
    }

    /// For installed repositories: the USE flags the id was built with.
    fn installed_use(&self, _id: &PackageId) -> Option<BTreeSet<UseFlagName>> {
        None
    }

    /// For world-holding repositories: the world set.
    fn world(&self) -> Option<BTreeSet<QualifiedPackageName>> {
        None
    }
}

/// Parse a raw key-value metadata map into typed metadata.
///
/// Dependency keys parse under the recipe's declared dialect. An
/// unknown dialect still yields metadata, with empty trees; the mask
/// engine turns the unknown name into an EAPI mask.
pub fn metadata_from_raw(raw: &RawMetadata) -> Result<PackageMetadata> {
    let eapi = raw
        .get("EAPI")
        .cloned()
        .unwrap_or_else(|| "pms-eapi-0".to_string());
    let mut metadata = PackageMetadata {
        eapi: eapi.clone(),
        ..Default::default()
    };

    let dialect = match find_dialect(&eapi) {
        Some(d) => d,
        None => return Ok(metadata),
    };

    if let Some(v) = raw.get("DESCRIPTION") {
        metadata.description = v.clone();
    }
    if let Some(v) = raw.get("LONG_DESCRIPTION") {
        metadata.long_description = Some(v.clone());
    }
    if let Some(v) = raw.get("SLOT") {
        metadata.slot = v.parse()?;
    }
    if let Some(v) = raw.get("HOMEPAGE") {
        metadata.homepage = dep_parser::parse_simple_uri(v, dialect)?;
    }
    if let Some(v) = raw.get("LICENSE") {
        metadata.license = dep_parser::parse_license(v, dialect)?;
    }
    if let Some(v) = raw.get("SRC_URI") {
        metadata.src_uri = dep_parser::parse_fetchable_uri(v, dialect)?;
    }
    if let Some(v) = raw.get("IUSE") {
        for token in v.split_whitespace() {
            let (flag, default) = match token.strip_prefix('+') {
                Some(f) => (f, Some(true)),
                None => match token.strip_prefix('-') {
                    Some(f) => (f, Some(false)),
                    None => (token, None),
                },
            };
            metadata.iuse.insert(flag.parse()?, default);
        }
    }
    if let Some(v) = raw.get("KEYWORDS") {
        for token in v.split_whitespace() {
            metadata.keywords.insert(token.parse()?);
        }
    }
    if let Some(v) = raw.get("DEPEND") {
        metadata.build_depend = dep_parser::parse_dependencies(v, dialect)?;
    }
    if let Some(v) = raw.get("RDEPEND") {
        metadata.run_depend = dep_parser::parse_dependencies(v, dialect)?;
    }
    if let Some(v) = raw.get("PDEPEND") {
        metadata.post_depend = dep_parser::parse_dependencies(v, dialect)?;
    }
    if let Some(v) = raw.get("SDEPEND") {
        metadata.suggested_depend = dep_parser::parse_dependencies(v, dialect)?;
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep_spec::DepSpec;

    #[test]
    fn test_metadata_from_raw_parses_keys() {
        let mut raw = RawMetadata::new();
        raw.insert("EAPI".to_string(), "pms-eapi-2".to_string());
        raw.insert("SLOT".to_string(), "2".to_string());
        raw.insert("DESCRIPTION".to_string(), "a thing".to_string());
        raw.insert("IUSE".to_string(), "+ssl -gtk X".to_string());
        raw.insert("KEYWORDS".to_string(), "amd64 ~arm64".to_string());
        raw.insert("DEPEND".to_string(), "ssl? ( dev-libs/openssl )".to_string());
        raw.insert("LICENSE".to_string(), "|| ( GPL-2 BSD )".to_string());

        let metadata = metadata_from_raw(&raw).unwrap();
        assert_eq!(metadata.slot.as_str(), "2");
        assert_eq!(metadata.iuse.len(), 3);
        assert_eq!(
            metadata.iuse.get(&"ssl".parse::<UseFlagName>().unwrap()),
            Some(&Some(true))
        );
        assert_eq!(metadata.keywords.len(), 2);
        assert!(matches!(metadata.build_depend, DepSpec::AllOf(ref c) if c.len() == 1));
    }

    #[test]
    fn test_metadata_from_raw_unknown_eapi() {
        let mut raw = RawMetadata::new();
        raw.insert("EAPI".to_string(), "eapi-from-the-future".to_string());
        raw.insert("DEPEND".to_string(), "not ( even ( parseable".to_string());

        // unknown dialect: keys stay unparsed rather than erroring
        let metadata = metadata_from_raw(&raw).unwrap();
        assert_eq!(metadata.eapi, "eapi-from-the-future");
        assert_eq!(metadata.build_depend, DepSpec::empty());
    }

    #[test]
    fn test_metadata_from_raw_bad_depend_errors() {
        let mut raw = RawMetadata::new();
        raw.insert("DEPEND".to_string(), "|| broken".to_string());
        assert!(metadata_from_raw(&raw).is_err());
    }
}
