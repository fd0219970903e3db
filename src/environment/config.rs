//! User configuration
//!
//! The environment's user-level policy loads from a TOML file: USE
//! flags, accepted keywords and licenses, package masks, the world
//! list and user-defined sets. External tool locations come from
//! environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub root: Option<PathBuf>,
    pub arch: Option<String>,
    #[serde(rename = "use")]
    pub use_flags: UseSection,
    pub keywords: KeywordSection,
    pub licenses: LicenseSection,
    pub mask: Vec<String>,
    pub unmask: Vec<String>,
    pub world: Vec<String>,
    pub sets: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UseSection {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub package: Vec<PackageUseEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageUseEntry {
    pub spec: String,
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct KeywordSection {
    pub accept: Vec<String>,
    pub package: Vec<PackageKeywordEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageKeywordEntry {
    pub spec: String,
    pub accept: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LicenseSection {
    pub accept: Vec<String>,
    pub package: Vec<PackageLicenseEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageLicenseEntry {
    pub spec: String,
    pub accept: Vec<String>,
}

impl EnvironmentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }
}

/// Paths and tool locations read from the process environment
#[derive(Debug, Clone)]
pub struct ExternalPaths {
    /// `ROOT`: the filesystem root packages merge into
    pub root: PathBuf,
    /// `MARSH_TMPDIR`: scratch space for builds
    pub tmpdir: PathBuf,
    /// `MARSH_CONFIG_DIR`: where the user configuration lives
    pub config_dir: Option<PathBuf>,
    /// `MARSH_EBUILD_DIR`: the recipe driver scripts
    pub ebuild_dir: Option<PathBuf>,
    /// `MARSH_BASHRC_FILES`: extra shell fragments for recipe runs
    pub bashrc_files: Vec<PathBuf>,
    /// `MARSH_HOOK_DIRS`: hook script directories
    pub hook_dirs: Vec<PathBuf>,
    /// `MARSH_COMMAND`: how to re-invoke the front end
    pub command: Option<String>,
    /// `MARSH_EBUILD_LOG_LEVEL`: verbosity for recipe runs
    pub ebuild_log_level: Option<String>,
}

impl Default for ExternalPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            tmpdir: PathBuf::from("/var/tmp/marsh"),
            config_dir: None,
            ebuild_dir: None,
            bashrc_files: Vec::new(),
            hook_dirs: Vec::new(),
            command: None,
            ebuild_log_level: None,
        }
    }
}

impl ExternalPaths {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let path_list = |name: &str| {
            var(name)
                .map(|v| v.split_whitespace().map(PathBuf::from).collect())
                .unwrap_or_default()
        };
        Self {
            root: var("ROOT").map(PathBuf::from).unwrap_or_else(|| "/".into()),
            tmpdir: var("MARSH_TMPDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| "/var/tmp/marsh".into()),
            config_dir: var("MARSH_CONFIG_DIR").map(PathBuf::from),
            ebuild_dir: var("MARSH_EBUILD_DIR").map(PathBuf::from),
            bashrc_files: path_list("MARSH_BASHRC_FILES"),
            hook_dirs: path_list("MARSH_HOOK_DIRS"),
            command: var("MARSH_COMMAND"),
            ebuild_log_level: var("MARSH_EBUILD_LOG_LEVEL"),
        }
    }
}
