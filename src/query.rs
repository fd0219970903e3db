//! Package matching and queries
//!
//! [`match_package`] decides whether a concrete id satisfies a package
//! dep spec under an environment. [`Query`] values compose with `&`
//! into predicates the environment evaluates over its repositories,
//! picking the narrowest name index available and scanning candidates
//! in ascending version order across repositories in priority order.

use crate::dep_spec::{PackageDepSpec, UseRequirementKind};
use crate::environment::Environment;
use crate::error::Result;
use crate::name::{CategoryName, QualifiedPackageName, UseFlagState};
use crate::package_id::PackageId;
use std::ops::BitAnd;
use std::path::PathBuf;
use std::sync::Arc;

/// Does `id` satisfy `spec`? USE requirements that refer to the caller
/// resolve against the environment's global flag state; see
/// [`match_package_from`] when the requiring package is known.
pub fn match_package(env: &Environment, spec: &PackageDepSpec, id: &Arc<PackageId>) -> Result<bool> {
    match_package_from(env, spec, id, None)
}

/// [`match_package`] with the requiring package supplied, so `flag=`
/// and `flag?` requirements resolve against its USE state.
pub fn match_package_from(
    env: &Environment,
    spec: &PackageDepSpec,
    id: &Arc<PackageId>,
    caller: Option<&PackageId>,
) -> Result<bool> {
    if !spec.name_matches(id.name()) {
        return Ok(false);
    }
    if !spec.version_matches(id.version()) {
        return Ok(false);
    }
    if let Some(slot) = &spec.slot {
        let metadata = env.metadata(id)?;
        if metadata.slot != *slot {
            return Ok(false);
        }
    }
    if let Some(repo) = &spec.repository {
        if repo != id.repository() {
            return Ok(false);
        }
    }
    Ok(use_requirements_met(env, &spec.use_requirements, id, caller))
}

/// Are all USE requirements satisfied for `id`, with `flag=` and
/// `flag?` resolved against `caller` (or the global state without one)?
pub(crate) fn use_requirements_met(
    env: &Environment,
    requirements: &[crate::dep_spec::UseRequirement],
    id: &PackageId,
    caller: Option<&PackageId>,
) -> bool {
    requirements
        .iter()
        .all(|req| use_requirement_met(env, req, id, caller))
}

pub(crate) fn use_requirement_met(
    env: &Environment,
    req: &crate::dep_spec::UseRequirement,
    id: &PackageId,
    caller: Option<&PackageId>,
) -> bool {
    let candidate = env.query_use(&req.flag, Some(id));
    let caller_state = match caller {
        Some(c) => env.query_use(&req.flag, Some(c)),
        None => env.query_use(&req.flag, None),
    };
    match req.kind {
        UseRequirementKind::Enabled => candidate == UseFlagState::Enabled,
        UseRequirementKind::Disabled => candidate == UseFlagState::Disabled,
        // an unspecified source state never satisfies a concrete
        // requirement
        UseRequirementKind::EqualToCaller => {
            candidate != UseFlagState::Unspecified && candidate == caller_state
        }
        UseRequirementKind::EnabledIfCallerEnabled => {
            caller_state != UseFlagState::Enabled || candidate == UseFlagState::Enabled
        }
    }
}

/// A composable predicate over the repositories' id enumerations
#[derive(Debug, Clone)]
pub enum Query {
    /// Satisfies the given package dep spec
    Matches(PackageDepSpec),
    /// Has exactly this qualified name
    Package(QualifiedPackageName),
    /// Lives in this category
    Category(CategoryName),
    /// Has no mask reasons
    NotMasked,
    /// Comes from an installed repository
    SupportsInstalled,
    /// Comes from an installable repository
    SupportsInstallable,
    /// Installed with the given filesystem root
    InstalledAtRoot(PathBuf),
    /// Both sides hold
    And(Box<Query>, Box<Query>),
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        Query::And(Box::new(self), Box::new(rhs))
    }
}

impl Query {
    fn conjuncts<'a>(&'a self, out: &mut Vec<&'a Query>) {
        match self {
            Query::And(a, b) => {
                a.conjuncts(out);
                b.conjuncts(out);
            }
            other => out.push(other),
        }
    }

    /// The qualified name this query pins down, if any: the primary
    /// index for the scan.
    fn name_hint(&self) -> Option<QualifiedPackageName> {
        let mut parts = Vec::new();
        self.conjuncts(&mut parts);
        for part in parts {
            match part {
                Query::Package(qpn) => return Some(qpn.clone()),
                Query::Matches(spec) => {
                    if let Some(qpn) = &spec.package {
                        return Some(qpn.clone());
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Evaluate a query over the environment's repositories.
pub fn execute_query(env: &Environment, query: &Query) -> Result<Vec<Arc<PackageId>>> {
    let mut parts = Vec::new();
    query.conjuncts(&mut parts);

    let mut candidates: Vec<Arc<PackageId>> = Vec::new();
    match query.name_hint() {
        Some(qpn) => {
            for repo in env.database().repositories() {
                candidates.extend(repo.package_ids(&qpn));
            }
        }
        None => {
            for repo in env.database().repositories() {
                for category in repo.category_names() {
                    for qpn in repo.package_names(&category) {
                        candidates.extend(repo.package_ids(&qpn));
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    'candidates: for id in candidates {
        for part in &parts {
            let keep = match part {
                Query::Matches(spec) => match_package(env, spec, &id)?,
                Query::Package(qpn) => id.name() == qpn,
                Query::Category(cat) => id.name().category == *cat,
                Query::NotMasked => env.mask_reasons(&id)?.is_empty(),
                Query::SupportsInstalled => env
                    .database()
                    .fetch_repository(id.repository())?
                    .capabilities()
                    .installed,
                Query::SupportsInstallable => env
                    .database()
                    .fetch_repository(id.repository())?
                    .capabilities()
                    .installable,
                Query::InstalledAtRoot(root) => {
                    let repo = env.database().fetch_repository(id.repository())?;
                    repo.capabilities().installed
                        && repo.installed_root().as_deref() == Some(root.as_path())
                }
                Query::And(..) => unreachable!("flattened above"),
            };
            if !keep {
                continue 'candidates;
            }
        }
        out.push(id);
    }
    Ok(out)
}
