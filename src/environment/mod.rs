//! Environment
//!
//! Global policy: the ordered repositories, the user's USE flags,
//! keywords, masks and licenses, named sets, the world set and default
//! merge destinations. The mask engine lives here: it combines
//! repository, profile, user, keyword, license and dialect sources
//! into one reasons bitmap per candidate.

pub mod config;
pub mod sets;

pub use config::{EnvironmentConfig, ExternalPaths};

use crate::database::PackageDatabase;
use crate::dep_parser::{find_dialect, parse_package_dep_spec, NATIVE};
use crate::dep_spec::{DepSpec, PackageDepSpec};
use crate::error::{Error, Result};
use crate::mask::{MaskReason, MaskReasons};
use crate::name::{
    KeywordName, QualifiedPackageName, SetName, UseFlagName, UseFlagState,
};
use crate::package_id::{PackageId, PackageMetadata};
use crate::query::{execute_query, Query};
use crate::repository::Repository;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// User USE flag choices: global plus per-package
#[derive(Debug, Clone, Default)]
pub struct UseConfig {
    global: IndexMap<UseFlagName, bool>,
    per_package: Vec<(PackageDepSpec, UseFlagName, bool)>,
}

/// User keyword acceptance: global plus per-package
#[derive(Debug, Clone, Default)]
pub struct KeywordConfig {
    accepted: BTreeSet<KeywordName>,
    per_package: Vec<(PackageDepSpec, Vec<KeywordName>)>,
}

/// User license acceptance; an empty configuration accepts everything
#[derive(Debug, Clone, Default)]
pub struct LicenseConfig {
    accepted: Vec<String>,
    per_package: Vec<(PackageDepSpec, Vec<String>)>,
}

/// Global policy for one resolution run
#[derive(Debug, Default)]
pub struct Environment {
    database: PackageDatabase,
    use_config: UseConfig,
    keyword_config: KeywordConfig,
    license_config: LicenseConfig,
    package_mask: Vec<PackageDepSpec>,
    package_unmask: Vec<PackageDepSpec>,
    sets: BTreeMap<SetName, DepSpec>,
    world: BTreeSet<QualifiedPackageName>,
    paths: ExternalPaths,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from a loaded user configuration, reading
    /// tool paths from the process environment.
    pub fn from_config(config: &EnvironmentConfig) -> Result<Self> {
        let mut env = Environment {
            paths: ExternalPaths::from_env(),
            ..Default::default()
        };
        if let Some(root) = &config.root {
            env.paths.root = root.clone();
        }
        if let Some(arch) = &config.arch {
            env.keyword_config.accepted.insert(arch.parse()?);
        }
        for flag in &config.use_flags.enabled {
            env.use_config.global.insert(flag.parse()?, true);
        }
        for flag in &config.use_flags.disabled {
            env.use_config.global.insert(flag.parse()?, false);
        }
        for entry in &config.use_flags.package {
            let spec = parse_package_dep_spec(&entry.spec, &NATIVE)?;
            for flag in &entry.enabled {
                env.use_config
                    .per_package
                    .push((spec.clone(), flag.parse()?, true));
            }
            for flag in &entry.disabled {
                env.use_config
                    .per_package
                    .push((spec.clone(), flag.parse()?, false));
            }
        }
        for keyword in &config.keywords.accept {
            env.keyword_config.accepted.insert(keyword.parse()?);
        }
        for entry in &config.keywords.package {
            let spec = parse_package_dep_spec(&entry.spec, &NATIVE)?;
            let keywords = entry
                .accept
                .iter()
                .map(|k| k.parse())
                .collect::<Result<Vec<KeywordName>>>()?;
            env.keyword_config.per_package.push((spec, keywords));
        }
        env.license_config.accepted = config.licenses.accept.clone();
        for entry in &config.licenses.package {
            let spec = parse_package_dep_spec(&entry.spec, &NATIVE)?;
            env.license_config
                .per_package
                .push((spec, entry.accept.clone()));
        }
        for spec in &config.mask {
            env.package_mask.push(parse_package_dep_spec(spec, &NATIVE)?);
        }
        for spec in &config.unmask {
            env.package_unmask
                .push(parse_package_dep_spec(spec, &NATIVE)?);
        }
        for name in &config.world {
            env.world.insert(name.parse()?);
        }
        for (name, lines) in &config.sets {
            let tree = sets::parse_set_lines(lines.iter().map(String::as_str))?;
            env.sets.insert(name.parse()?, tree);
        }
        Ok(env)
    }

    pub fn add_repository(&mut self, repository: Arc<dyn Repository>) {
        self.database.add_repository(repository);
    }

    pub fn database(&self) -> &PackageDatabase {
        &self.database
    }

    pub fn paths(&self) -> &ExternalPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn add_use_flag(&mut self, flag: UseFlagName, enabled: bool) {
        self.use_config.global.insert(flag, enabled);
    }

    pub fn add_package_use(&mut self, spec: PackageDepSpec, flag: UseFlagName, enabled: bool) {
        self.use_config.per_package.push((spec, flag, enabled));
    }

    pub fn accept_keyword(&mut self, keyword: KeywordName) {
        self.keyword_config.accepted.insert(keyword);
    }

    pub fn add_package_keywords(&mut self, spec: PackageDepSpec, keywords: Vec<KeywordName>) {
        self.keyword_config.per_package.push((spec, keywords));
    }

    pub fn accept_license(&mut self, license: impl Into<String>) {
        self.license_config.accepted.push(license.into());
    }

    pub fn add_package_mask(&mut self, spec: PackageDepSpec) {
        self.package_mask.push(spec);
    }

    pub fn add_package_unmask(&mut self, spec: PackageDepSpec) {
        self.package_unmask.push(spec);
    }

    pub fn add_set(&mut self, name: SetName, contents: DepSpec) {
        self.sets.insert(name, contents);
    }

    pub fn world(&self) -> &BTreeSet<QualifiedPackageName> {
        &self.world
    }

    pub fn add_to_world(&mut self, name: QualifiedPackageName) {
        self.world.insert(name);
    }

    pub fn remove_from_world(&mut self, name: &QualifiedPackageName) {
        self.world.remove(name);
    }

    /// The id's metadata, through its owning repository.
    pub fn metadata(&self, id: &Arc<PackageId>) -> Result<Arc<PackageMetadata>> {
        self.database.fetch_repository(id.repository())?.metadata(id)
    }

    /// Evaluate a composable query over the repositories.
    pub fn query(&self, query: &Query) -> Result<Vec<Arc<PackageId>>> {
        execute_query(self, query)
    }

    /// Repositories that installable entries can be merged to.
    pub fn default_destinations(&self) -> Vec<Arc<dyn Repository>> {
        self.database
            .repositories()
            .iter()
            .filter(|r| r.capabilities().installed)
            .cloned()
            .collect()
    }

    /// The resolved state of a USE flag for a package view.
    ///
    /// Profile force and mask override the user; the user overrides
    /// profile and recipe defaults.
    pub fn query_use(&self, flag: &UseFlagName, id: Option<&PackageId>) -> UseFlagState {
        let repo = id.and_then(|id| self.database.fetch_repository(id.repository()).ok());
        if let (Some(repo), Some(id)) = (&repo, id) {
            if repo.query_use_force(flag, Some(id)) {
                return UseFlagState::Enabled;
            }
            if repo.query_use_mask(flag, Some(id)) {
                return UseFlagState::Disabled;
            }
        }
        if let Some(id) = id {
            let mut choice = None;
            for (spec, f, enabled) in &self.use_config.per_package {
                if f == flag && spec.matches_basic(id) {
                    choice = Some(*enabled);
                }
            }
            if let Some(enabled) = choice {
                return state_of(enabled);
            }
        }
        if let Some(enabled) = self.use_config.global.get(flag) {
            return state_of(*enabled);
        }
        if let (Some(repo), Some(id)) = (&repo, id) {
            let state = repo.query_use(flag, Some(id));
            if state != UseFlagState::Unspecified {
                return state;
            }
        }
        UseFlagState::Unspecified
    }

    /// Combine every mask source for a candidate into one bitmap.
    pub fn mask_reasons(&self, id: &Arc<PackageId>) -> Result<MaskReasons> {
        self.mask_reasons_inner(id, 0)
    }

    fn mask_reasons_inner(&self, id: &Arc<PackageId>, depth: usize) -> Result<MaskReasons> {
        let mut reasons = MaskReasons::none();
        let repo = self.database.fetch_repository(id.repository())?;
        if repo.capabilities().installed {
            // what is merged stays visible
            return Ok(reasons);
        }
        let metadata = repo.metadata(id)?;

        if !self.accepts_keywords(id, &metadata.keywords) {
            reasons.insert(MaskReason::Keyword);
        }
        if repo.profile_masked(id) {
            reasons.insert(MaskReason::ProfileMask);
        }
        if repo.repository_masked(id) {
            reasons.insert(MaskReason::RepositoryMask);
        }
        if self.package_mask.iter().any(|s| s.matches_basic(id))
            && !self.package_unmask.iter().any(|s| s.matches_basic(id))
        {
            reasons.insert(MaskReason::UserMask);
        }
        if !self.license_node_ok(&metadata.license, id) {
            reasons.insert(MaskReason::License);
        }
        if find_dialect(&metadata.eapi).is_none() {
            reasons.insert(MaskReason::Eapi);
        }
        if depth < 3 {
            if let Some(provider) = repo.virtuals().get(id.name()) {
                if self.virtual_target_masked(provider, depth)? {
                    reasons.insert(MaskReason::ByAssociation);
                }
            }
        }

        if !reasons.is_empty() {
            debug!(id = %id, reasons = %reasons, "candidate masked");
        }
        Ok(reasons)
    }

    fn virtual_target_masked(&self, provider: &PackageDepSpec, depth: usize) -> Result<bool> {
        let Some(name) = provider.package.clone() else {
            return Ok(false);
        };
        let mut any_candidate = false;
        for repo in self.database.repositories() {
            if !repo.capabilities().installable {
                continue;
            }
            for candidate in repo.package_ids(&name) {
                if !crate::query::match_package(self, provider, &candidate)? {
                    continue;
                }
                any_candidate = true;
                if self.mask_reasons_inner(&candidate, depth + 1)?.is_empty() {
                    return Ok(false);
                }
            }
        }
        Ok(any_candidate)
    }

    /// Does the candidate carry any keyword the configuration accepts?
    pub fn accepts_keywords(
        &self,
        id: &PackageId,
        keywords: &BTreeSet<KeywordName>,
    ) -> bool {
        let mut accepted = self.keyword_config.accepted.clone();
        for (spec, extra) in &self.keyword_config.per_package {
            if spec.matches_basic(id) {
                accepted.extend(extra.iter().cloned());
            }
        }
        if accepted.iter().any(|k| k.as_str() == "**") {
            return true;
        }
        for keyword in keywords {
            if keyword.is_broken() {
                continue;
            }
            if keyword.as_str() == "*" {
                return true;
            }
            if accepted.contains(keyword) {
                return true;
            }
            // accepting ~arch implies accepting arch
            if !keyword.is_testing() {
                if let Ok(testing) = KeywordName::new(format!("~{}", keyword.as_str())) {
                    if accepted.contains(&testing) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn license_node_ok(&self, spec: &DepSpec, id: &PackageId) -> bool {
        if self.license_config.accepted.is_empty() && self.license_config.per_package.is_empty() {
            return true;
        }
        match spec {
            DepSpec::AllOf(children) => children.iter().all(|c| self.license_node_ok(c, id)),
            DepSpec::AnyOf(children) => {
                children.is_empty() || children.iter().any(|c| self.license_node_ok(c, id))
            }
            DepSpec::Conditional(c) => {
                let active =
                    (self.query_use(&c.flag, Some(id)) == UseFlagState::Enabled) != c.inverse;
                if active {
                    c.children.iter().all(|ch| self.license_node_ok(ch, id))
                } else {
                    true
                }
            }
            DepSpec::License(name) => self.license_accepted(name, id),
            _ => true,
        }
    }

    fn license_accepted(&self, license: &str, id: &PackageId) -> bool {
        let global = self
            .license_config
            .accepted
            .iter()
            .any(|l| l == license || l == "*");
        if global {
            return true;
        }
        self.license_config
            .per_package
            .iter()
            .any(|(spec, accepted)| {
                spec.matches_basic(id) && accepted.iter().any(|l| l == license || l == "*")
            })
    }

    /// Resolve a named set. `system`, `world` and `everything` are
    /// built in; the rest come from configuration.
    pub fn set(&self, name: &SetName) -> Result<DepSpec> {
        match name.as_str() {
            "system" => {
                let mut children = Vec::new();
                for repo in self.database.repositories() {
                    for spec in repo.system_packages() {
                        children.push(DepSpec::Package(spec));
                    }
                }
                Ok(DepSpec::AllOf(children))
            }
            "world" => {
                let mut world = self.world.clone();
                for repo in self.database.repositories() {
                    if let Some(held) = repo.world() {
                        world.extend(held);
                    }
                }
                Ok(sets::world_to_tree(&world))
            }
            "everything" => {
                let mut names = BTreeSet::new();
                for repo in self.database.repositories() {
                    if !repo.capabilities().installed {
                        continue;
                    }
                    for category in repo.category_names() {
                        names.extend(repo.package_names(&category));
                    }
                }
                Ok(sets::world_to_tree(&names))
            }
            _ => self
                .sets
                .get(name)
                .cloned()
                .ok_or_else(|| Error::NoSuchSet(name.to_string())),
        }
    }
}

fn state_of(enabled: bool) -> UseFlagState {
    if enabled {
        UseFlagState::Enabled
    } else {
        UseFlagState::Disabled
    }
}
