//! Profiles
//!
//! A profile is the layered configuration a repository ships: package
//! masks (with downstream unmasking), forced and masked USE flags,
//! architecture flags, USE_EXPAND names, the system set and third-party
//! mirrors. Profiles load from a `profiles/` directory tree with a
//! `parent` chain, or are built in memory.

use crate::dep_parser::{parse_package_dep_spec, NATIVE};
use crate::dep_spec::{DepSpec, PackageDepSpec};
use crate::error::{Error, Result, ResultExt};
use crate::name::{CategoryName, RepositoryName, UseFlagName};
use crate::package_id::PackageId;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One package.mask line: a spec, or its downstream removal
#[derive(Debug, Clone)]
struct MaskEntry {
    spec: PackageDepSpec,
    removal: bool,
}

/// A loaded profile chain
#[derive(Debug, Clone, Default)]
pub struct Profile {
    masks: Vec<MaskEntry>,
    use_mask: BTreeSet<UseFlagName>,
    use_force: BTreeSet<UseFlagName>,
    package_use_mask: Vec<(PackageDepSpec, UseFlagName)>,
    package_use_force: Vec<(PackageDepSpec, UseFlagName)>,
    use_defaults: IndexMap<UseFlagName, bool>,
    arch_flags: BTreeSet<UseFlagName>,
    expand_names: BTreeSet<String>,
    system: Vec<PackageDepSpec>,
    mirrors: BTreeMap<String, Vec<String>>,
    repo_name: Option<RepositoryName>,
    categories: Vec<CategoryName>,
    info_vars: Vec<String>,
    info_pkgs: Vec<PackageDepSpec>,
    directories: Vec<PathBuf>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `profiles/` subtree: `repo_name`, `categories`,
    /// `package.mask`, `arch.list`, `thirdpartymirrors`, USE control
    /// files and the `parent` chain, parents first.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut profile = Profile::new();
        profile
            .load_dir(dir, &mut Vec::new())
            .with_context(|| format!("loading profile at {}", dir.display()))?;
        Ok(profile)
    }

    fn load_dir(&mut self, dir: &Path, seen: &mut Vec<PathBuf>) -> Result<()> {
        let canonical = dir
            .canonicalize()
            .map_err(|e| Error::RepositoryConfiguration(format!("{}: {}", dir.display(), e)))?;
        if seen.contains(&canonical) {
            return Err(Error::RepositoryConfiguration(format!(
                "profile parent cycle through {}",
                dir.display()
            )));
        }
        seen.push(canonical);

        for parent in read_lines(&dir.join("parent"))? {
            self.load_dir(&dir.join(parent), seen)?;
        }

        debug!(profile = %dir.display(), "loading profile directory");
        self.directories.push(dir.to_path_buf());

        if let Some(name) = read_lines(&dir.join("repo_name"))?.into_iter().next() {
            self.repo_name = Some(name.parse()?);
        }
        for line in read_lines(&dir.join("categories"))? {
            self.categories.push(line.parse()?);
        }
        for line in read_lines(&dir.join("package.mask"))? {
            match line.strip_prefix('-') {
                Some(spec) => self.add_unmask(parse_package_dep_spec(spec, &NATIVE)?),
                None => self.add_mask(parse_package_dep_spec(&line, &NATIVE)?),
            }
        }
        for line in read_lines(&dir.join("use.mask"))? {
            self.use_mask.insert(line.parse()?);
        }
        for line in read_lines(&dir.join("use.force"))? {
            self.use_force.insert(line.parse()?);
        }
        for line in read_lines(&dir.join("package.use.mask"))? {
            let (spec, flags) = split_spec_and_words(&line)?;
            for flag in flags {
                self.package_use_mask.push((spec.clone(), flag.parse()?));
            }
        }
        for line in read_lines(&dir.join("package.use.force"))? {
            let (spec, flags) = split_spec_and_words(&line)?;
            for flag in flags {
                self.package_use_force.push((spec.clone(), flag.parse()?));
            }
        }
        for line in read_lines(&dir.join("arch.list"))? {
            self.arch_flags.insert(line.parse()?);
        }
        for line in read_lines(&dir.join("use.expand"))? {
            self.expand_names.insert(line);
        }
        for line in read_lines(&dir.join("packages"))? {
            if let Some(spec) = line.strip_prefix('*') {
                self.system.push(parse_package_dep_spec(spec, &NATIVE)?);
            }
        }
        for line in read_lines(&dir.join("info_vars"))? {
            self.info_vars.push(line);
        }
        for line in read_lines(&dir.join("info_pkgs"))? {
            self.info_pkgs.push(parse_package_dep_spec(&line, &NATIVE)?);
        }
        for line in read_lines(&dir.join("thirdpartymirrors"))? {
            let mut words = line.split_whitespace();
            if let Some(name) = words.next() {
                self.mirrors
                    .entry(name.to_string())
                    .or_default()
                    .extend(words.map(str::to_string));
            }
        }
        Ok(())
    }

    pub fn add_mask(&mut self, spec: PackageDepSpec) {
        self.masks.push(MaskEntry {
            spec,
            removal: false,
        });
    }

    /// A `-spec` line: removes matching masks from earlier layers.
    pub fn add_unmask(&mut self, spec: PackageDepSpec) {
        self.masks.push(MaskEntry {
            spec,
            removal: true,
        });
    }

    pub fn add_use_mask(&mut self, flag: UseFlagName) {
        self.use_mask.insert(flag);
    }

    pub fn add_use_force(&mut self, flag: UseFlagName) {
        self.use_force.insert(flag);
    }

    pub fn add_package_use_mask(&mut self, spec: PackageDepSpec, flag: UseFlagName) {
        self.package_use_mask.push((spec, flag));
    }

    pub fn add_package_use_force(&mut self, spec: PackageDepSpec, flag: UseFlagName) {
        self.package_use_force.push((spec, flag));
    }

    pub fn set_use_default(&mut self, flag: UseFlagName, enabled: bool) {
        self.use_defaults.insert(flag, enabled);
    }

    pub fn add_arch_flag(&mut self, flag: UseFlagName) {
        self.arch_flags.insert(flag);
    }

    pub fn add_expand_name(&mut self, name: impl Into<String>) {
        self.expand_names.insert(name.into());
    }

    pub fn add_system_package(&mut self, spec: PackageDepSpec) {
        self.system.push(spec);
    }

    pub fn add_mirror(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.mirrors.entry(name.into()).or_default().push(url.into());
    }

    /// Is the id masked by this profile's package.mask chain? Mask
    /// entries apply in layer order; a removal entry drops matching
    /// masks recorded by earlier layers.
    pub fn masked(&self, id: &PackageId) -> bool {
        let mut masked = false;
        for entry in &self.masks {
            if entry.spec.matches_basic(id) {
                masked = !entry.removal;
            }
        }
        masked
    }

    pub fn use_masked(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool {
        if self.use_mask.contains(flag) {
            return true;
        }
        match id {
            Some(id) => self
                .package_use_mask
                .iter()
                .any(|(spec, f)| f == flag && spec.matches_basic(id)),
            None => false,
        }
    }

    pub fn use_forced(&self, flag: &UseFlagName, id: Option<&PackageId>) -> bool {
        if self.use_force.contains(flag) {
            return true;
        }
        match id {
            Some(id) => self
                .package_use_force
                .iter()
                .any(|(spec, f)| f == flag && spec.matches_basic(id)),
            None => false,
        }
    }

    pub fn use_default(&self, flag: &UseFlagName) -> Option<bool> {
        self.use_defaults.get(flag).copied()
    }

    pub fn is_arch_flag(&self, flag: &UseFlagName) -> bool {
        self.arch_flags.contains(flag)
    }

    pub fn is_expand_flag(&self, flag: &UseFlagName) -> bool {
        self.expand_names
            .iter()
            .any(|name| flag.as_str().starts_with(&format!("{}_", name.to_lowercase())))
    }

    pub fn expand_names(&self) -> impl Iterator<Item = &str> {
        self.expand_names.iter().map(String::as_str)
    }

    /// The system set as a dependency tree.
    pub fn system_set(&self) -> DepSpec {
        DepSpec::AllOf(
            self.system
                .iter()
                .map(|spec| DepSpec::Package(spec.clone()))
                .collect(),
        )
    }

    pub fn system_packages(&self) -> &[PackageDepSpec] {
        &self.system
    }

    pub fn mirrors(&self, name: &str) -> Vec<String> {
        self.mirrors.get(name).cloned().unwrap_or_default()
    }

    pub fn repo_name(&self) -> Option<&RepositoryName> {
        self.repo_name.as_ref()
    }

    pub fn categories(&self) -> &[CategoryName] {
        &self.categories
    }

    /// Variables worth reporting in a configuration summary.
    pub fn info_vars(&self) -> &[String] {
        &self.info_vars
    }

    /// Packages worth reporting in a configuration summary.
    pub fn info_pkgs(&self) -> &[PackageDepSpec] {
        &self.info_pkgs
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

/// Lines of a config file with `#` comments and blanks stripped; a
/// missing file reads as empty.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// `spec flag flag...` lines in package.use.* files
fn split_spec_and_words(line: &str) -> Result<(PackageDepSpec, Vec<String>)> {
    let mut words = line.split_whitespace();
    let spec_text = words
        .next()
        .ok_or_else(|| Error::Configuration(format!("empty entry in {:?}", line)))?;
    let spec = parse_package_dep_spec(spec_text, &NATIVE)?;
    Ok((spec, words.map(str::to_string).collect()))
}
