//! Recipe invocation boundary
//!
//! For each installable plan entry the core emits a structured record
//! with everything the recipe runner needs: the resolved USE map,
//! expanded variables, destination, roots, profile directories and
//! mirrors. Running the recipes is someone else's job.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::name::{
    CategoryName, QualifiedPackageName, RepositoryName, SlotName, UseFlagName,
};
use crate::resolver::{DepListEntry, ResolvedDepList};
use crate::version::VersionSpec;
use indexmap::IndexMap;
use std::path::PathBuf;

/// What the runner should do with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    FetchOnly,
    BuildAndInstall,
    MergeOnly,
}

/// One recipe invocation: the boundary record handed to the runner
#[derive(Debug, Clone)]
pub struct RecipeInvocation {
    pub name: QualifiedPackageName,
    pub category: CategoryName,
    pub version: VersionSpec,
    pub repository: RepositoryName,
    pub slot: SlotName,
    pub destination: RepositoryName,
    /// Every IUSE flag with its resolved state
    pub use_flags: IndexMap<UseFlagName, bool>,
    /// USE_EXPAND variable name to its enabled values
    pub expand_vars: IndexMap<String, Vec<String>>,
    pub root: PathBuf,
    pub build_root: PathBuf,
    pub profile_directories: Vec<PathBuf>,
    pub mirrors: Vec<String>,
    pub kind: InvocationKind,
}

/// Lower the installable entries of a plan into invocation records.
pub fn build_plan(
    env: &Environment,
    plan: &ResolvedDepList,
    kind: InvocationKind,
) -> Result<Vec<RecipeInvocation>> {
    plan.entries()
        .iter()
        .filter(|e| e.kind.is_installable())
        .map(|e| invocation_for(env, e, kind))
        .collect()
}

fn invocation_for(
    env: &Environment,
    entry: &DepListEntry,
    kind: InvocationKind,
) -> Result<RecipeInvocation> {
    let id = entry
        .package_id
        .as_ref()
        .ok_or_else(|| Error::Internal("installable entry without an id".to_string()))?;
    let destination = entry
        .destination
        .clone()
        .ok_or_else(|| Error::NoDestination(id.to_string()))?;
    let repo = env.database().fetch_repository(id.repository())?;
    let metadata = env.metadata(id)?;

    let mut use_flags = IndexMap::new();
    for flag in metadata.iuse.keys() {
        let enabled = entry
            .use_overrides
            .iter()
            .find(|(f, _)| f == flag)
            .map(|(_, e)| *e)
            .unwrap_or_else(|| env.query_use(flag, Some(id)).is_enabled());
        use_flags.insert(flag.clone(), enabled);
    }

    // group enabled expand-prefixed flags under their variable
    let expand_names = repo.expand_names();
    let mut expand_vars: IndexMap<String, Vec<String>> = IndexMap::new();
    for (flag, enabled) in &use_flags {
        if !enabled {
            continue;
        }
        if let Some((var, value)) = split_expand_flag(flag, &expand_names) {
            expand_vars.entry(var).or_default().push(value);
        }
    }

    let mut mirrors = repo.mirrors(id.name().category.as_str());
    mirrors.extend(repo.mirrors("*"));

    Ok(RecipeInvocation {
        name: id.name().clone(),
        category: id.name().category.clone(),
        version: id.version().clone(),
        repository: id.repository().clone(),
        slot: metadata.slot.clone(),
        destination,
        use_flags,
        expand_vars,
        root: env.root().to_path_buf(),
        build_root: env.paths().tmpdir.clone(),
        profile_directories: repo.profile_directories(),
        mirrors,
        kind,
    })
}

/// `video_cards_radeon` splits into `VIDEO_CARDS` and `radeon` when
/// `VIDEO_CARDS` is a declared expand variable.
fn split_expand_flag(flag: &UseFlagName, expand_names: &[String]) -> Option<(String, String)> {
    let s = flag.as_str();
    for name in expand_names {
        let prefix = format!("{}_", name.to_lowercase());
        if let Some(value) = s.strip_prefix(&prefix) {
            return Some((name.clone(), value.to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_expand_flag() {
        let names = vec!["VIDEO_CARDS".to_string(), "CPU_FLAGS_X86".to_string()];
        let flag: UseFlagName = "video_cards_radeon".parse().unwrap();
        let (var, value) = split_expand_flag(&flag, &names).unwrap();
        assert_eq!(var, "VIDEO_CARDS");
        assert_eq!(value, "radeon");

        let flag: UseFlagName = "cpu_flags_x86_sse4_2".parse().unwrap();
        let (var, value) = split_expand_flag(&flag, &names).unwrap();
        assert_eq!(var, "CPU_FLAGS_X86");
        assert_eq!(value, "sse4_2");

        let flag: UseFlagName = "ssl".parse().unwrap();
        assert!(split_expand_flag(&flag, &names).is_none());
    }
}
