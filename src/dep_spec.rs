//! Dependency spec trees
//!
//! A dependency string parses into a tree of tagged variants: all-of and
//! any-of groups, USE-conditional groups, package constraints, blocks,
//! plain-text leaves for license and URI contexts, named set references
//! and dependency labels. Consumers walk the tree with an exhaustive
//! `match`; there is no virtual dispatch.

use crate::name::{
    CategoryName, PackageName, QualifiedPackageName, RepositoryName, SetName, SlotName,
    UseFlagName,
};
use crate::package_id::PackageId;
use crate::version::{VersionRequirement, VersionRequirementsMode};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Required state for one USE flag inside `[...]` requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseRequirementKind {
    /// `flag`: must be enabled on the candidate
    Enabled,
    /// `-flag`: must be disabled on the candidate
    Disabled,
    /// `flag=`: candidate state must equal the requiring package's state
    EqualToCaller,
    /// `flag?`: if the requiring package has it enabled, so must the candidate
    EnabledIfCallerEnabled,
}

/// One entry of a spec's USE requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseRequirement {
    pub flag: UseFlagName,
    pub kind: UseRequirementKind,
}

impl fmt::Display for UseRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            UseRequirementKind::Enabled => write!(f, "{}", self.flag),
            UseRequirementKind::Disabled => write!(f, "-{}", self.flag),
            UseRequirementKind::EqualToCaller => write!(f, "{}=", self.flag),
            UseRequirementKind::EnabledIfCallerEnabled => write!(f, "{}?", self.flag),
        }
    }
}

/// Provenance marker recording why a spec was constructed
///
/// Not part of matching; the resolver attaches these to trace each
/// planned entry back to the target, set or parent dependency that
/// pulled it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepTag {
    /// Came directly from a user target
    Target,
    /// Came from expanding a named set
    Set(SetName),
    /// Came from a dependency of an already chosen package
    Dependency {
        parent: Arc<PackageId>,
        spec: Box<PackageDepSpec>,
    },
    /// Came from a security advisory
    Glsa(String),
}

impl fmt::Display for DepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepTag::Target => f.write_str("target"),
            DepTag::Set(name) => write!(f, "{}", name),
            DepTag::Dependency { parent, .. } => write!(f, "{}", parent),
            DepTag::Glsa(id) => write!(f, "GLSA {}", id),
        }
    }
}

/// A package constraint: qualified name or wildcard, with optional
/// version requirements, slot, repository and USE requirements
///
/// Exactly one name form is populated: `package` for `cat/pkg`,
/// `category` for `cat/*`, `package_part` for `*/pkg`, none for `*/*`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageDepSpec {
    pub package: Option<QualifiedPackageName>,
    pub category: Option<CategoryName>,
    pub package_part: Option<PackageName>,
    pub version_requirements: Vec<VersionRequirement>,
    pub version_requirements_mode: VersionRequirementsMode,
    pub slot: Option<SlotName>,
    pub repository: Option<RepositoryName>,
    pub use_requirements: Vec<UseRequirement>,
    pub tag: Option<DepTag>,
}

impl PackageDepSpec {
    /// A spec constraining nothing but the qualified name.
    pub fn simple(package: QualifiedPackageName) -> Self {
        Self {
            package: Some(package),
            ..Default::default()
        }
    }

    pub fn with_version_requirement(mut self, req: VersionRequirement) -> Self {
        self.version_requirements.push(req);
        self
    }

    pub fn with_slot(mut self, slot: SlotName) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_repository(mut self, repository: RepositoryName) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_use_requirement(mut self, req: UseRequirement) -> Self {
        self.use_requirements.push(req);
        self
    }

    pub fn with_tag(mut self, tag: DepTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// A copy of this spec without its USE requirements.
    pub fn without_use_requirements(&self) -> Self {
        let mut spec = self.clone();
        spec.use_requirements.clear();
        spec
    }

    /// Does this spec's name part (possibly wildcarded) cover `name`?
    pub fn name_matches(&self, name: &QualifiedPackageName) -> bool {
        if let Some(p) = &self.package {
            return p == name;
        }
        if let Some(c) = &self.category {
            if *c != name.category {
                return false;
            }
        }
        if let Some(p) = &self.package_part {
            if *p != name.package {
                return false;
            }
        }
        true
    }

    /// Match against an id on name, version, slot and repository only,
    /// ignoring USE requirements. This is what mask and config entries
    /// need; full matching including USE state lives with the
    /// environment.
    pub fn matches_basic(&self, id: &PackageId) -> bool {
        if !self.name_matches(id.name()) {
            return false;
        }
        if !self.version_matches(id.version()) {
            return false;
        }
        if let Some(slot) = &self.slot {
            match id.slot() {
                Some(s) if s == slot => {}
                _ => return false,
            }
        }
        if let Some(repo) = &self.repository {
            if repo != id.repository() {
                return false;
            }
        }
        true
    }

    /// Do the version requirements admit `version`?
    pub fn version_matches(&self, version: &crate::version::VersionSpec) -> bool {
        if self.version_requirements.is_empty() {
            return true;
        }
        match self.version_requirements_mode {
            VersionRequirementsMode::And => {
                self.version_requirements.iter().all(|r| r.matches(version))
            }
            VersionRequirementsMode::Or => {
                self.version_requirements.iter().any(|r| r.matches(version))
            }
        }
    }
}

impl FromStr for PackageDepSpec {
    type Err = crate::error::Error;

    /// Parses the atom grammar in the permissive native dialect.
    fn from_str(s: &str) -> crate::error::Result<Self> {
        crate::dep_parser::parse_package_dep_spec(s, &crate::dep_parser::NATIVE)
    }
}

impl fmt::Display for PackageDepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let single = self.version_requirements.len() == 1;
        if single {
            // the prefix form prints as = with a trailing star
            match self.version_requirements[0].operator {
                crate::version::VersionOperator::PrefixEqual => f.write_str("=")?,
                op => write!(f, "{}", op)?,
            }
        }
        match (&self.package, &self.category, &self.package_part) {
            (Some(q), _, _) => write!(f, "{}", q)?,
            (None, Some(c), None) => write!(f, "{}/*", c)?,
            (None, None, Some(p)) => write!(f, "*/{}", p)?,
            (None, None, None) => f.write_str("*/*")?,
            (None, Some(c), Some(p)) => write!(f, "{}/{}", c, p)?,
        }
        if single {
            let req = &self.version_requirements[0];
            write!(f, "-{}", req.version)?;
            if req.operator == crate::version::VersionOperator::PrefixEqual {
                f.write_str("*")?;
            }
        }
        if let Some(slot) = &self.slot {
            write!(f, ":{}", slot)?;
        }
        if let Some(repo) = &self.repository {
            write!(f, "::{}", repo)?;
        }
        if self.version_requirements.len() > 1 {
            let sep = match self.version_requirements_mode {
                VersionRequirementsMode::And => ",",
                VersionRequirementsMode::Or => "|",
            };
            f.write_str("[")?;
            for (i, req) in self.version_requirements.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}{}", req.operator, req.version)?;
            }
            f.write_str("]")?;
        }
        if !self.use_requirements.is_empty() {
            f.write_str("[")?;
            for (i, req) in self.use_requirements.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", req)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// An assertion that a matching package must not be installed
///
/// Wraps exactly one package spec. `!atom` is a weak block, `!!atom` a
/// strong one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDepSpec {
    pub blocked: PackageDepSpec,
    pub strong: bool,
}

/// A `use? ( ... )` or `!use? ( ... )` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalDepSpec {
    pub flag: UseFlagName,
    pub inverse: bool,
    pub children: Vec<DepSpec>,
}

/// A fetchable URI, optionally renamed with `->` in dialects that
/// support it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchableUri {
    pub original: String,
    pub renamed: Option<String>,
}

impl FetchableUri {
    /// The local filename: the renamed part if present, otherwise the
    /// text after the final `/` of the original URI.
    pub fn filename(&self) -> &str {
        match &self.renamed {
            Some(name) => name,
            None => self
                .original
                .rsplit('/')
                .next()
                .unwrap_or(&self.original),
        }
    }
}

/// Role a dependency label assigns to the siblings after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepLabelRole {
    Build,
    Run,
    Post,
    Suggestion,
}

/// A label such as `build:` changing how following siblings in the same
/// group are classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepLabel {
    pub text: String,
    pub role: DepLabelRole,
}

impl fmt::Display for DepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.text)
    }
}

/// A node of a dependency spec tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepSpec {
    /// `( a b c )` or the implicit top level: all children apply
    AllOf(Vec<DepSpec>),
    /// `|| ( a b )`: at least one child must be satisfied
    AnyOf(Vec<DepSpec>),
    /// `use? ( ... )`
    Conditional(ConditionalDepSpec),
    Package(PackageDepSpec),
    Block(BlockDepSpec),
    PlainText(String),
    License(String),
    SimpleUri(String),
    FetchableUri(FetchableUri),
    NamedSet(SetName),
    Labels(Vec<DepLabel>),
}

impl DepSpec {
    /// An empty top-level group.
    pub fn empty() -> DepSpec {
        DepSpec::AllOf(Vec::new())
    }

    /// Visit every package spec in the tree, in source order,
    /// descending through every group kind.
    pub fn each_package<'a>(&'a self, f: &mut dyn FnMut(&'a PackageDepSpec)) {
        match self {
            DepSpec::AllOf(children) | DepSpec::AnyOf(children) => {
                for child in children {
                    child.each_package(f);
                }
            }
            DepSpec::Conditional(c) => {
                for child in &c.children {
                    child.each_package(f);
                }
            }
            DepSpec::Package(p) => f(p),
            DepSpec::Block(b) => f(&b.blocked),
            DepSpec::PlainText(_)
            | DepSpec::License(_)
            | DepSpec::SimpleUri(_)
            | DepSpec::FetchableUri(_)
            | DepSpec::NamedSet(_)
            | DepSpec::Labels(_) => {}
        }
    }

    /// Reduce the tree to a flat list of package specs under the given
    /// USE resolution, if it contains nothing that prevents flattening
    /// (any-of groups, blocks, set references).
    pub fn flatten_under(
        &self,
        enabled: &dyn Fn(&UseFlagName) -> bool,
    ) -> Option<Vec<&PackageDepSpec>> {
        let mut out = Vec::new();
        if self.flatten_into(enabled, &mut out) {
            Some(out)
        } else {
            None
        }
    }

    fn flatten_into<'a>(
        &'a self,
        enabled: &dyn Fn(&UseFlagName) -> bool,
        out: &mut Vec<&'a PackageDepSpec>,
    ) -> bool {
        match self {
            DepSpec::AllOf(children) => children.iter().all(|c| c.flatten_into(enabled, out)),
            DepSpec::Conditional(c) => {
                if enabled(&c.flag) != c.inverse {
                    c.children.iter().all(|ch| ch.flatten_into(enabled, out))
                } else {
                    true
                }
            }
            DepSpec::Package(p) => {
                out.push(p);
                true
            }
            DepSpec::PlainText(_) | DepSpec::Labels(_) => true,
            DepSpec::AnyOf(_)
            | DepSpec::Block(_)
            | DepSpec::License(_)
            | DepSpec::SimpleUri(_)
            | DepSpec::FetchableUri(_)
            | DepSpec::NamedSet(_) => false,
        }
    }
}

impl fmt::Display for DepSpec {
    /// Emits the token grammar; the top-level `AllOf` brackets are
    /// implicit, nested groups print their parentheses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_children(
            f: &mut fmt::Formatter<'_>,
            children: &[DepSpec],
            mut first: bool,
        ) -> fmt::Result {
            for child in children {
                if !first {
                    f.write_str(" ")?;
                }
                first = false;
                write_node(f, child)?;
            }
            Ok(())
        }

        fn write_node(f: &mut fmt::Formatter<'_>, spec: &DepSpec) -> fmt::Result {
            match spec {
                DepSpec::AllOf(children) => {
                    f.write_str("( ")?;
                    write_children(f, children, true)?;
                    f.write_str(" )")
                }
                DepSpec::AnyOf(children) => {
                    f.write_str("|| ( ")?;
                    write_children(f, children, true)?;
                    f.write_str(" )")
                }
                DepSpec::Conditional(c) => {
                    if c.inverse {
                        f.write_str("!")?;
                    }
                    write!(f, "{}? ( ", c.flag)?;
                    write_children(f, &c.children, true)?;
                    f.write_str(" )")
                }
                DepSpec::Package(p) => write!(f, "{}", p),
                DepSpec::Block(b) => {
                    write!(f, "{}{}", if b.strong { "!!" } else { "!" }, b.blocked)
                }
                DepSpec::PlainText(s) | DepSpec::License(s) | DepSpec::SimpleUri(s) => {
                    f.write_str(s)
                }
                DepSpec::FetchableUri(u) => match &u.renamed {
                    Some(r) => write!(f, "{} -> {}", u.original, r),
                    None => f.write_str(&u.original),
                },
                DepSpec::NamedSet(name) => write!(f, "{}", name),
                DepSpec::Labels(labels) => {
                    for (i, label) in labels.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", label)?;
                    }
                    Ok(())
                }
            }
        }

        match self {
            DepSpec::AllOf(children) => write_children(f, children, true),
            other => write_node(f, other),
        }
    }
}
