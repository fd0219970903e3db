//! In-memory repositories
//!
//! [`FakeRepository`] is an installable repository populated through
//! code: the test suite's workhorse, and the shape a future on-disk
//! repository plugs into. [`InstalledRepository`] models the installed
//! package database: merge destination, world holder, recorded USE
//! state.

use crate::dep_spec::PackageDepSpec;
use crate::error::{Error, Result, ResultExt};
use crate::name::{
    CategoryName, QualifiedPackageName, RepositoryName, UseFlagName, UseFlagState,
};
use crate::package_id::{PackageId, PackageMetadata};
use crate::profile::Profile;
use crate::repository::cache::{MemoryCache, MetadataCache, RawMetadata};
use crate::repository::{metadata_from_raw, Repository, RepositoryCapabilities};
use crate::version::VersionSpec;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type PackageTable = BTreeMap<QualifiedPackageName, BTreeMap<VersionSpec, Arc<PackageId>>>;

/// An installable repository populated through code
#[derive(Debug)]
pub struct FakeRepository {
    name: RepositoryName,
    packages: RwLock<PackageTable>,
    masks: RwLock<Vec<PackageDepSpec>>,
    virtuals: RwLock<BTreeMap<QualifiedPackageName, PackageDepSpec>>,
    profile: RwLock<Profile>,
    cache: MemoryCache,
}

impl FakeRepository {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.parse()?,
            packages: RwLock::new(BTreeMap::new()),
            masks: RwLock::new(Vec::new()),
            virtuals: RwLock::new(BTreeMap::new()),
            profile: RwLock::new(Profile::new()),
            cache: MemoryCache::new(),
        })
    }

    /// Construct from a `profiles/` subtree; the repository takes its
    /// name from the profile's `repo_name`.
    pub fn from_profiles_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let profile = Profile::from_dir(dir)?;
        let name = profile
            .repo_name()
            .ok_or_else(|| {
                Error::RepositoryConfiguration("profiles subtree has no repo_name".to_string())
            })?
            .clone();
        Ok(Self {
            name,
            packages: RwLock::new(BTreeMap::new()),
            masks: RwLock::new(Vec::new()),
            virtuals: RwLock::new(BTreeMap::new()),
            profile: RwLock::new(profile),
            cache: MemoryCache::new(),
        })
    }

    /// Register a package version and return its canonical id.
    pub fn add_version(&self, category: &str, package: &str, version: &str) -> Result<Arc<PackageId>> {
        let name = QualifiedPackageName {
            category: category.parse()?,
            package: package.parse()?,
        };
        let version = VersionSpec::new(version)?;
        let id = PackageId::new(name.clone(), version.clone(), self.name.clone());
        self.packages
            .write()
            .entry(name)
            .or_default()
            .insert(version, id.clone());
        Ok(id)
    }

    /// Set one raw metadata key (recipe variable) for an id. Fails once
    /// the id's metadata has been observed; the latch is one-shot.
    pub fn set_key(&self, id: &PackageId, key: &str, value: &str) -> Result<()> {
        if id.metadata().is_some() {
            return Err(Error::Internal(format!(
                "metadata for {} already loaded",
                id
            )));
        }
        let cache_key = raw_key(id);
        let mut raw = self.cache.get(&cache_key).unwrap_or_default();
        raw.insert(key.to_string(), value.to_string());
        self.cache.put(&cache_key, raw);
        Ok(())
    }

    /// Convenience for several keys at once.
    pub fn set_keys(&self, id: &PackageId, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set_key(id, key, value)?;
        }
        Ok(())
    }

    pub fn add_mask(&self, spec: PackageDepSpec) {
        self.masks.write().push(spec);
    }

    pub fn add_virtual(&self, name: QualifiedPackageName, provider: PackageDepSpec) {
        self.virtuals.write().insert(name, provider);
    }

    pub fn set_profile(&self, profile: Profile) {
        *self.profile.write() = profile;
    }

    /// Mutate the repository profile in place.
    pub fn with_profile(&self, f: impl FnOnce(&mut Profile)) {
        f(&mut self.profile.write());
    }
}

fn raw_key(id: &PackageId) -> String {
    format!("{}-{}", id.name(), id.version())
}

impl Repository for FakeRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn capabilities(&self) -> RepositoryCapabilities {
        RepositoryCapabilities {
            installable: true,
            ..Default::default()
        }
    }

    fn category_names(&self) -> Vec<CategoryName> {
        let mut cats: Vec<CategoryName> = self
            .packages
            .read()
            .keys()
            .map(|q| q.category.clone())
            .collect();
        cats.extend(self.profile.read().categories().iter().cloned());
        cats.sort();
        cats.dedup();
        cats
    }

    fn package_names(&self, category: &CategoryName) -> Vec<QualifiedPackageName> {
        self.packages
            .read()
            .keys()
            .filter(|q| q.category == *category)
            .cloned()
            .collect()
    }

    fn version_specs(&self, package: &QualifiedPackageName) -> Vec<VersionSpec> {
        self.packages
            .read()
            .get(package)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn package_ids(&self, package: &QualifiedPackageName) -> Vec<Arc<PackageId>> {
        self.packages
            .read()
            .get(package)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn metadata(&self, id: &Arc<PackageId>) -> Result<Arc<PackageMetadata>> {
        if let Some(m) = id.metadata() {
            return Ok(m.clone());
        }
        let raw: RawMetadata = self.cache.get(&raw_key(id)).unwrap_or_default();
        let parsed =
            metadata_from_raw(&raw).with_context(|| format!("metadata for {}", id))?;
        Ok(id.supply_metadata(Arc::new(parsed)).clone())
    }

    fn repository_masked(&self, id: &PackageId) -> bool {
        self.masks.read().iter().any(|spec| spec.matches_basic(id))
    }

    fn profile_masked(&self, id: &PackageId) -> bool {
        self.profile.read().masked(id)
    }

    fn query_use(&self, flag: &UseFlagName, id: Option<&PackageId>) -> UseFlagState {
        let profile = self.profile.read();
        if profile.use_forced(flag, id) {
            return UseFlagState::Enabled;
        }
        if profile.use_masked(flag, id) {
            return UseFlagState::Disabled;
        }
        if let Some(enabled) = profile.use_default(flag) {
            return if enabled {
                UseFlagState::Enabled
            } else {
                UseFlagState::Disabled
            };
        }
        if let Some(default) = id
            .and_then(|id| id.metadata())
            .and_then(|m| m.iuse.get(flag).copied().flatten())
        {
            return if default {
                UseFlagState::Enabled
            } else {
                UseFlagState::Disabled
            };
        }
        UseFlagState::Unspecified
    }

    fn query_use_mask(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool {
        self.profile.read().use_masked(flag, id)
    }

    fn query_use_force(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool {
        self.profile.read().use_forced(flag, id)
    }

    fn is_arch_flag(&self, flag: &UseFlagName) -> bool {
        self.profile.read().is_arch_flag(flag)
    }

    fn is_expand_flag(&self, flag: &UseFlagName) -> bool {
        self.profile.read().is_expand_flag(flag)
    }

    fn expand_names(&self) -> Vec<String> {
        self.profile
            .read()
            .expand_names()
            .map(str::to_string)
            .collect()
    }

    fn mirrors(&self, name: &str) -> Vec<String> {
        self.profile.read().mirrors(name)
    }

    fn virtuals(&self) -> BTreeMap<QualifiedPackageName, PackageDepSpec> {
        self.virtuals.read().clone()
    }

    fn system_packages(&self) -> Vec<PackageDepSpec> {
        self.profile.read().system_packages().to_vec()
    }

    fn profile_directories(&self) -> Vec<PathBuf> {
        self.profile.read().directories().to_vec()
    }

    fn invalidate(&self) {
        debug!(repository = %self.name, "invalidating metadata cache");
        self.cache.clear();
    }
}

#[derive(Debug, Clone)]
struct InstalledRecord {
    installed_at: DateTime<Utc>,
    use_flags: BTreeSet<UseFlagName>,
}

/// The installed package database: merge destination and world holder
#[derive(Debug)]
pub struct InstalledRepository {
    name: RepositoryName,
    root: PathBuf,
    packages: RwLock<PackageTable>,
    records: RwLock<HashMap<(QualifiedPackageName, VersionSpec), InstalledRecord>>,
    world: RwLock<BTreeSet<QualifiedPackageName>>,
}

impl InstalledRepository {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            name: name.parse()?,
            root: root.into(),
            packages: RwLock::new(BTreeMap::new()),
            records: RwLock::new(HashMap::new()),
            world: RwLock::new(BTreeSet::new()),
        })
    }

    /// Record an installed package with default metadata.
    pub fn add_installed(
        &self,
        category: &str,
        package: &str,
        version: &str,
    ) -> Result<Arc<PackageId>> {
        self.add_installed_with(category, package, version, PackageMetadata::default(), &[])
    }

    /// Record an installed package with its metadata and the USE flags
    /// it was built with.
    pub fn add_installed_with(
        &self,
        category: &str,
        package: &str,
        version: &str,
        metadata: PackageMetadata,
        use_flags: &[&str],
    ) -> Result<Arc<PackageId>> {
        let name = QualifiedPackageName {
            category: category.parse()?,
            package: package.parse()?,
        };
        let version = VersionSpec::new(version)?;
        let id = PackageId::new(name.clone(), version.clone(), self.name.clone());
        id.supply_metadata(Arc::new(metadata));
        let flags = use_flags
            .iter()
            .map(|f| f.parse())
            .collect::<Result<BTreeSet<UseFlagName>>>()?;
        self.packages
            .write()
            .entry(name.clone())
            .or_default()
            .insert(version.clone(), id.clone());
        self.records.write().insert(
            (name, version),
            InstalledRecord {
                installed_at: Utc::now(),
                use_flags: flags,
            },
        );
        Ok(id)
    }

    pub fn add_to_world(&self, name: QualifiedPackageName) {
        self.world.write().insert(name);
    }

    pub fn remove_from_world(&self, name: &QualifiedPackageName) {
        self.world.write().remove(name);
    }
}

impl Repository for InstalledRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn capabilities(&self) -> RepositoryCapabilities {
        RepositoryCapabilities {
            installed: true,
            uninstallable: true,
            holds_world: true,
            ..Default::default()
        }
    }

    fn category_names(&self) -> Vec<CategoryName> {
        let mut cats: Vec<CategoryName> = self
            .packages
            .read()
            .keys()
            .map(|q| q.category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    fn package_names(&self, category: &CategoryName) -> Vec<QualifiedPackageName> {
        self.packages
            .read()
            .keys()
            .filter(|q| q.category == *category)
            .cloned()
            .collect()
    }

    fn version_specs(&self, package: &QualifiedPackageName) -> Vec<VersionSpec> {
        self.packages
            .read()
            .get(package)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn package_ids(&self, package: &QualifiedPackageName) -> Vec<Arc<PackageId>> {
        self.packages
            .read()
            .get(package)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn metadata(&self, id: &Arc<PackageId>) -> Result<Arc<PackageMetadata>> {
        match id.metadata() {
            Some(m) => Ok(m.clone()),
            None => Ok(id.supply_metadata(Arc::new(PackageMetadata::default())).clone()),
        }
    }

    fn repository_masked(&self, _id: &PackageId) -> bool {
        false
    }

    fn profile_masked(&self, _id: &PackageId) -> bool {
        false
    }

    fn query_use(&self, flag: &UseFlagName, id: Option<&PackageId>) -> UseFlagState {
        let Some(id) = id else {
            return UseFlagState::Unspecified;
        };
        let records = self.records.read();
        match records.get(&(id.name().clone(), id.version().clone())) {
            Some(record) => {
                if record.use_flags.contains(flag) {
                    UseFlagState::Enabled
                } else {
                    UseFlagState::Disabled
                }
            }
            None => UseFlagState::Unspecified,
        }
    }

    fn query_use_mask(&self, _flag: &UseFlagName, _id: Option<&PackageId>) -> bool {
        false
    }

    fn query_use_force(&self, _flag: &UseFlagName, _id: Option<&PackageId>) -> bool {
        false
    }

    fn is_arch_flag(&self, _flag: &UseFlagName) -> bool {
        false
    }

    fn is_expand_flag(&self, _flag: &UseFlagName) -> bool {
        false
    }

    fn mirrors(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    fn virtuals(&self) -> BTreeMap<QualifiedPackageName, PackageDepSpec> {
        BTreeMap::new()
    }

    fn invalidate(&self) {}

    fn installed_root(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn installed_time(&self, id: &PackageId) -> Option<DateTime<Utc>> {
        self.records
            .read()
            .get(&(id.name().clone(), id.version().clone()))
            .map(|r| r.installed_at)
    }

    fn installed_use(&self, id: &PackageId) -> Option<BTreeSet<UseFlagName>> {
        self.records
            .read()
            .get(&(id.name().clone(), id.version().clone()))
            .map(|r| r.use_flags.clone())
    }

    fn world(&self) -> Option<BTreeSet<QualifiedPackageName>> {
        Some(self.world.read().clone())
    }
}
