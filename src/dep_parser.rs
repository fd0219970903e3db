//! Dependency string parsing
//!
//! Tokenizes and parses the whitespace-separated dependency grammar into
//! a [`DepSpec`](crate::dep_spec::DepSpec) tree, under a named dialect
//! that gates which constructs are admitted. The parser is pure: no
//! repository lookups, no validation that packages exist.

use crate::dep_spec::{
    BlockDepSpec, ConditionalDepSpec, DepLabel, DepLabelRole, DepSpec, FetchableUri,
    PackageDepSpec, UseRequirement, UseRequirementKind,
};
use crate::error::{Error, Result};
use crate::version::{VersionRequirement, VersionRequirementsMode, VersionSpec};

/// Capability set of a recipe dialect (an EAPI)
///
/// A dialect decides which constructs the parser admits; parsing a
/// construct outside the dialect is an error, not a silent downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    /// `:slot` restrictions in package atoms
    pub slot_deps: bool,
    /// `[use]` requirements in package atoms
    pub use_deps: bool,
    /// `::repository` restrictions in package atoms
    pub repository_deps: bool,
    /// `!!atom` strong blocks
    pub strong_blocks: bool,
    /// `cat/*`, `*/pkg` and `*/*` name wildcards
    pub wildcards: bool,
    /// `[>=1.2,<2]` version requirement lists
    pub version_requirement_lists: bool,
    /// the `~>` bumped-range operator
    pub bump_operator: bool,
    /// `lhs -> rhs` renamed fetchable URIs
    pub uri_arrows: bool,
    /// `build:` style dependency labels
    pub labels: bool,
}

pub const PMS_EAPI_0: Dialect = Dialect {
    name: "pms-eapi-0",
    slot_deps: false,
    use_deps: false,
    repository_deps: false,
    strong_blocks: false,
    wildcards: false,
    version_requirement_lists: false,
    bump_operator: false,
    uri_arrows: false,
    labels: false,
};

pub const PMS_EAPI_1: Dialect = Dialect {
    name: "pms-eapi-1",
    slot_deps: true,
    ..PMS_EAPI_0
};

pub const PMS_EAPI_2: Dialect = Dialect {
    name: "pms-eapi-2",
    slot_deps: true,
    use_deps: true,
    strong_blocks: true,
    ..PMS_EAPI_0
};

/// The native dialect: everything on
pub const NATIVE: Dialect = Dialect {
    name: "marsh-1",
    slot_deps: true,
    use_deps: true,
    repository_deps: true,
    strong_blocks: true,
    wildcards: true,
    version_requirement_lists: true,
    bump_operator: true,
    uri_arrows: true,
    labels: true,
};

pub const EXHERES_0: Dialect = Dialect {
    name: "exheres-0",
    slot_deps: true,
    use_deps: true,
    repository_deps: false,
    strong_blocks: true,
    wildcards: false,
    version_requirement_lists: false,
    bump_operator: false,
    uri_arrows: true,
    labels: true,
};

const DIALECTS: &[&Dialect] = &[&PMS_EAPI_0, &PMS_EAPI_1, &PMS_EAPI_2, &NATIVE, &EXHERES_0];

/// Look up a dialect by its EAPI identifier.
pub fn find_dialect(name: &str) -> Option<&'static Dialect> {
    DIALECTS.iter().copied().find(|d| d.name == name)
}

/// What leaves the surrounding metadata key admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafContext {
    /// DEPEND and friends: atoms, blocks, labels
    Package,
    /// LICENSE: bare license tokens
    License,
    /// SRC_URI: fetchable URIs, arrows per dialect
    FetchableUri,
    /// HOMEPAGE: simple URIs, no arrows
    SimpleUri,
    /// free-text keys such as RESTRICT
    PlainText,
}

/// Parse a dependency string (DEPEND, RDEPEND, PDEPEND, SDEPEND).
pub fn parse_dependencies(input: &str, dialect: &Dialect) -> Result<DepSpec> {
    Parser::new(input, dialect, LeafContext::Package).parse()
}

/// Parse a LICENSE string.
pub fn parse_license(input: &str, dialect: &Dialect) -> Result<DepSpec> {
    Parser::new(input, dialect, LeafContext::License).parse()
}

/// Parse a SRC_URI string.
pub fn parse_fetchable_uri(input: &str, dialect: &Dialect) -> Result<DepSpec> {
    Parser::new(input, dialect, LeafContext::FetchableUri).parse()
}

/// Parse a HOMEPAGE string.
pub fn parse_simple_uri(input: &str, dialect: &Dialect) -> Result<DepSpec> {
    Parser::new(input, dialect, LeafContext::SimpleUri).parse()
}

/// Parse a free-text key such as RESTRICT.
pub fn parse_plain_text(input: &str, dialect: &Dialect) -> Result<DepSpec> {
    Parser::new(input, dialect, LeafContext::PlainText).parse()
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    offset: usize,
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in input.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token {
                    text: &input[s..i],
                    offset: s,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: &input[s..],
            offset: s,
        });
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    dialect: &'a Dialect,
    context: LeafContext,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, dialect: &'a Dialect, context: LeafContext) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
            dialect,
            context,
        }
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, offset: usize, reason: impl Into<String>) -> Error {
        Error::DepSpecParse {
            location: offset,
            reason: reason.into(),
        }
    }

    fn end_offset(&self) -> usize {
        self.tokens
            .last()
            .map(|t| t.offset + t.text.len())
            .unwrap_or(0)
    }

    fn parse(mut self) -> Result<DepSpec> {
        let children = self.parse_children(true)?;
        Ok(DepSpec::AllOf(children))
    }

    fn parse_children(&mut self, top: bool) -> Result<Vec<DepSpec>> {
        let mut out = Vec::new();
        loop {
            let tok = match self.peek() {
                Some(t) => t,
                None => {
                    if top {
                        return Ok(out);
                    }
                    return Err(self.err(self.end_offset(), "unbalanced parentheses"));
                }
            };
            match tok.text {
                ")" => {
                    if top {
                        return Err(self.err(tok.offset, "unbalanced closing parenthesis"));
                    }
                    self.next();
                    return Ok(out);
                }
                "(" => {
                    self.next();
                    out.push(DepSpec::AllOf(self.parse_children(false)?));
                }
                "||" => {
                    self.next();
                    match self.next() {
                        Some(t) if t.text == "(" => {}
                        _ => return Err(self.err(tok.offset, "|| must be followed by (")),
                    }
                    let children = self.parse_children(false)?;
                    if self.context == LeafContext::Package {
                        for child in &children {
                            if !valid_any_of_child(child) {
                                return Err(self.err(
                                    tok.offset,
                                    "|| children must be package specs, all-of groups of \
                                     package specs, or conditionals of those",
                                ));
                            }
                        }
                    }
                    out.push(DepSpec::AnyOf(children));
                }
                t if t.ends_with('?') && t.len() > 1 => {
                    self.next();
                    let (inverse, flag_text) = match t.strip_prefix('!') {
                        Some(rest) => (true, rest),
                        None => (false, t),
                    };
                    let flag = flag_text[..flag_text.len() - 1]
                        .parse()
                        .map_err(|e: Error| self.err(tok.offset, e.to_string()))?;
                    match self.next() {
                        Some(t) if t.text == "(" => {}
                        _ => {
                            return Err(
                                self.err(tok.offset, "use conditional must be followed by (")
                            )
                        }
                    }
                    let children = self.parse_children(false)?;
                    if children.is_empty() {
                        return Err(self.err(tok.offset, "use conditional has no body"));
                    }
                    out.push(DepSpec::Conditional(ConditionalDepSpec {
                        flag,
                        inverse,
                        children,
                    }));
                }
                t if self.context == LeafContext::Package
                    && self.dialect.labels
                    && t.ends_with(':')
                    && t.len() > 1
                    && !t.contains('/') =>
                {
                    self.next();
                    let text = &t[..t.len() - 1];
                    let role = match text {
                        "build" => DepLabelRole::Build,
                        "run" => DepLabelRole::Run,
                        "post" => DepLabelRole::Post,
                        "suggested" | "suggestion" => DepLabelRole::Suggestion,
                        other => {
                            return Err(
                                self.err(tok.offset, format!("unknown label {:?}", other))
                            )
                        }
                    };
                    out.push(DepSpec::Labels(vec![DepLabel {
                        text: text.to_string(),
                        role,
                    }]));
                }
                _ => {
                    self.next();
                    out.push(self.parse_leaf(tok)?);
                }
            }
        }
    }

    fn parse_leaf(&mut self, tok: Token<'a>) -> Result<DepSpec> {
        match self.context {
            LeafContext::Package => self.parse_package_leaf(tok),
            LeafContext::License => {
                if looks_like_atom(tok.text) {
                    Err(self.err(tok.offset, "package atom not allowed in license context"))
                } else {
                    Ok(DepSpec::License(tok.text.to_string()))
                }
            }
            LeafContext::PlainText => Ok(DepSpec::PlainText(tok.text.to_string())),
            LeafContext::SimpleUri => Ok(DepSpec::SimpleUri(tok.text.to_string())),
            LeafContext::FetchableUri => {
                let mut renamed = None;
                if let Some(arrow) = self.peek() {
                    if arrow.text == "->" {
                        if !self.dialect.uri_arrows {
                            return Err(self.err(
                                arrow.offset,
                                format!("renamed URIs not allowed in {}", self.dialect.name),
                            ));
                        }
                        self.next();
                        match self.next() {
                            Some(name) if !matches!(name.text, "(" | ")" | "->") => {
                                renamed = Some(name.text.to_string());
                            }
                            _ => return Err(self.err(arrow.offset, "-> without a filename")),
                        }
                    }
                }
                Ok(DepSpec::FetchableUri(FetchableUri {
                    original: tok.text.to_string(),
                    renamed,
                }))
            }
        }
    }

    fn parse_package_leaf(&mut self, tok: Token<'a>) -> Result<DepSpec> {
        let text = tok.text;
        if let Some(rest) = text.strip_prefix("!!") {
            if !self.dialect.strong_blocks {
                return Err(self.err(
                    tok.offset,
                    format!("strong blocks not allowed in {}", self.dialect.name),
                ));
            }
            let blocked = parse_package_dep_spec(rest, self.dialect)
                .map_err(|e| self.err(tok.offset, e.to_string()))?;
            return Ok(DepSpec::Block(BlockDepSpec {
                blocked,
                strong: true,
            }));
        }
        if let Some(rest) = text.strip_prefix('!') {
            let blocked = parse_package_dep_spec(rest, self.dialect)
                .map_err(|e| self.err(tok.offset, e.to_string()))?;
            return Ok(DepSpec::Block(BlockDepSpec {
                blocked,
                strong: false,
            }));
        }
        let spec = parse_package_dep_spec(text, self.dialect)
            .map_err(|e| self.err(tok.offset, e.to_string()))?;
        Ok(DepSpec::Package(spec))
    }
}

/// Is the tree shape admissible as a `||` alternative?
fn valid_any_of_child(spec: &DepSpec) -> bool {
    match spec {
        DepSpec::Package(_) => true,
        DepSpec::AllOf(children) => children
            .iter()
            .all(|c| matches!(c, DepSpec::Package(_))),
        DepSpec::Conditional(c) => c.children.iter().all(valid_any_of_child),
        _ => false,
    }
}

fn looks_like_atom(text: &str) -> bool {
    text.contains('/') || text.starts_with(['!', '<', '>', '=', '~'])
}

fn op_prefix(s: &str, dialect: &Dialect) -> Result<(Option<&'static str>, usize)> {
    if s.starts_with("~>") {
        if !dialect.bump_operator {
            return Err(Error::PackageDepSpec(format!(
                "~> not allowed in {}",
                dialect.name
            )));
        }
        return Ok((Some("~>"), 2));
    }
    for op in [">=", "<="] {
        if s.starts_with(op) {
            return Ok((Some(op), 2));
        }
    }
    for op in [">", "<", "=", "~"] {
        if s.starts_with(op) {
            return Ok((Some(op), 1));
        }
    }
    Ok((None, 0))
}

/// Parse a single package atom under a dialect.
///
/// Grammar: `[op]cat/pkg[-version][*][:slot][::repo][[requirements]]`,
/// wildcards and version requirement lists per dialect.
pub fn parse_package_dep_spec(input: &str, dialect: &Dialect) -> Result<PackageDepSpec> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::PackageDepSpec("empty package spec".to_string()));
    }

    let (op, op_len) = op_prefix(s, dialect)?;
    let mut rest = &s[op_len..];
    let mut spec = PackageDepSpec::default();

    // trailing bracket groups: use requirements and, in dialects that
    // allow them, version requirement lists. Peeled right to left, then
    // processed in source order.
    let mut groups = Vec::new();
    while rest.ends_with(']') {
        let open = rest.rfind('[').ok_or_else(|| {
            Error::PackageDepSpec(format!("unbalanced brackets in {:?}", input))
        })?;
        groups.push(&rest[open + 1..rest.len() - 1]);
        rest = &rest[..open];
    }
    for group in groups.into_iter().rev() {
        if group.is_empty() {
            return Err(Error::PackageDepSpec(format!(
                "empty bracket group in {:?}",
                input
            )));
        }
        if group.starts_with(['<', '>', '=', '~']) {
            if !dialect.version_requirement_lists {
                return Err(Error::PackageDepSpec(format!(
                    "version requirement lists not allowed in {}",
                    dialect.name
                )));
            }
            parse_version_requirement_group(group, dialect, &mut spec)?;
        } else {
            if !dialect.use_deps {
                return Err(Error::PackageDepSpec(format!(
                    "use requirements not allowed in {}",
                    dialect.name
                )));
            }
            for part in group.split(',') {
                spec.use_requirements.push(parse_use_requirement(part)?);
            }
        }
    }

    // ::repository
    if let Some(pos) = rest.rfind("::") {
        if !dialect.repository_deps {
            return Err(Error::PackageDepSpec(format!(
                "repository restrictions not allowed in {}",
                dialect.name
            )));
        }
        spec.repository = Some(rest[pos + 2..].parse()?);
        rest = &rest[..pos];
    }

    // :slot
    if let Some(pos) = rest.find(':') {
        if !dialect.slot_deps {
            return Err(Error::PackageDepSpec(format!(
                "slot restrictions not allowed in {}",
                dialect.name
            )));
        }
        spec.slot = Some(rest[pos + 1..].parse()?);
        rest = &rest[..pos];
    }

    // =...* prefix wildcard
    let mut prefix_star = false;
    if rest.ends_with('*') && op == Some("=") {
        prefix_star = true;
        rest = &rest[..rest.len() - 1];
    }

    // version part, only when an operator asks for one
    if let Some(op) = op {
        let version_start = find_version_split(rest).ok_or_else(|| {
            Error::PackageDepSpec(format!("operator {} without a version in {:?}", op, input))
        })?;
        let version = VersionSpec::new(&rest[version_start + 1..])?;
        let operator = if prefix_star {
            crate::version::VersionOperator::PrefixEqual
        } else {
            op.parse()?
        };
        spec.version_requirements
            .insert(0, VersionRequirement::new(operator, version));
        rest = &rest[..version_start];
    } else if prefix_star {
        return Err(Error::PackageDepSpec(format!(
            "* without = operator in {:?}",
            input
        )));
    }

    // category/name, possibly wildcarded
    let (cat, pkg) = rest
        .split_once('/')
        .ok_or_else(|| Error::PackageDepSpec(format!("missing category in {:?}", input)))?;
    match (cat, pkg) {
        ("*", "*") => {
            if !dialect.wildcards {
                return Err(Error::PackageDepSpec(format!(
                    "wildcards not allowed in {}",
                    dialect.name
                )));
            }
        }
        ("*", p) => {
            if !dialect.wildcards {
                return Err(Error::PackageDepSpec(format!(
                    "wildcards not allowed in {}",
                    dialect.name
                )));
            }
            spec.package_part = Some(p.parse()?);
        }
        (c, "*") => {
            if !dialect.wildcards {
                return Err(Error::PackageDepSpec(format!(
                    "wildcards not allowed in {}",
                    dialect.name
                )));
            }
            spec.category = Some(c.parse()?);
        }
        (c, p) => {
            spec.package = Some(QualifiedPackageNamePair { c, p }.parse()?);
        }
    }

    Ok(spec)
}

// tiny helper so category and package errors surface individually
struct QualifiedPackageNamePair<'a> {
    c: &'a str,
    p: &'a str,
}

impl QualifiedPackageNamePair<'_> {
    fn parse(self) -> Result<crate::name::QualifiedPackageName> {
        Ok(crate::name::QualifiedPackageName {
            category: self.c.parse()?,
            package: self.p.parse()?,
        })
    }
}

/// The index of the hyphen separating name from version: the last `-`
/// directly followed by a digit.
fn find_version_split(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'-' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()))
}

fn parse_version_requirement_group(
    group: &str,
    dialect: &Dialect,
    spec: &mut PackageDepSpec,
) -> Result<()> {
    let (mode, sep) = if group.contains('|') {
        (VersionRequirementsMode::Or, '|')
    } else {
        (VersionRequirementsMode::And, ',')
    };
    if mode == VersionRequirementsMode::Or && group.contains(',') {
        return Err(Error::PackageDepSpec(format!(
            "mixed , and | in version requirements {:?}",
            group
        )));
    }
    let mut reqs = Vec::new();
    for part in group.split(sep) {
        let (op, op_len) = op_prefix(part, dialect)?;
        let op = op.ok_or_else(|| {
            Error::PackageDepSpec(format!("missing operator in version requirement {:?}", part))
        })?;
        let (operator, version_text) = if op == "=" && part.ends_with('*') {
            (
                crate::version::VersionOperator::PrefixEqual,
                &part[op_len..part.len() - 1],
            )
        } else {
            (op.parse()?, &part[op_len..])
        };
        reqs.push(VersionRequirement::new(
            operator,
            VersionSpec::new(version_text)?,
        ));
    }
    spec.version_requirements.extend(reqs);
    spec.version_requirements_mode = mode;
    Ok(())
}

fn parse_use_requirement(part: &str) -> Result<UseRequirement> {
    let part = part.trim();
    if let Some(flag) = part.strip_prefix('-') {
        return Ok(UseRequirement {
            flag: flag.parse()?,
            kind: UseRequirementKind::Disabled,
        });
    }
    if let Some(flag) = part.strip_suffix('=') {
        return Ok(UseRequirement {
            flag: flag.parse()?,
            kind: UseRequirementKind::EqualToCaller,
        });
    }
    if let Some(flag) = part.strip_suffix('?') {
        return Ok(UseRequirement {
            flag: flag.parse()?,
            kind: UseRequirementKind::EnabledIfCallerEnabled,
        });
    }
    Ok(UseRequirement {
        flag: part.parse()?,
        kind: UseRequirementKind::Enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionOperator;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> DepSpec {
        parse_dependencies(s, &NATIVE).unwrap()
    }

    #[test]
    fn test_any_of_then_package() {
        let tree = parse_dependencies("|| ( app-a/x app-b/y ) app-c/z", &PMS_EAPI_0).unwrap();
        match &tree {
            DepSpec::AllOf(children) => {
                assert_eq!(children.len(), 2);
                assert_matches!(&children[0], DepSpec::AnyOf(alts) if alts.len() == 2);
                assert_matches!(&children[1], DepSpec::Package(p)
                    if p.package.as_ref().unwrap().to_string() == "app-c/z");
            }
            other => panic!("expected top-level all-of, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_with_block() {
        let tree = parse_dependencies("flag? ( app-a/x !app-b/y )", &PMS_EAPI_0).unwrap();
        match &tree {
            DepSpec::AllOf(children) => {
                assert_eq!(children.len(), 1);
                match &children[0] {
                    DepSpec::Conditional(c) => {
                        assert_eq!(c.flag.as_str(), "flag");
                        assert!(!c.inverse);
                        assert_eq!(c.children.len(), 2);
                        assert_matches!(&c.children[0], DepSpec::Package(_));
                        assert_matches!(&c.children[1], DepSpec::Block(b) if !b.strong);
                    }
                    other => panic!("expected conditional, got {:?}", other),
                }
            }
            other => panic!("expected top-level all-of, got {:?}", other),
        }
    }

    #[test]
    fn test_inverse_conditional() {
        let tree = parse("!flag? ( app-a/x )");
        match &tree {
            DepSpec::AllOf(children) => {
                assert_matches!(&children[0], DepSpec::Conditional(c) if c.inverse);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_nested_conditionals() {
        let tree = parse("a? ( b? ( app-a/x ) )");
        match &tree {
            DepSpec::AllOf(children) => match &children[0] {
                DepSpec::Conditional(outer) => {
                    assert_matches!(&outer.children[0], DepSpec::Conditional(inner)
                        if inner.flag.as_str() == "b");
                }
                _ => panic!(),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_errors_carry_location() {
        assert_matches!(
            parse_dependencies("|| app-a/x", &NATIVE),
            Err(Error::DepSpecParse { location: 0, .. })
        );
        assert_matches!(
            parse_dependencies("( app-a/x", &NATIVE),
            Err(Error::DepSpecParse { .. })
        );
        assert_matches!(
            parse_dependencies("app-a/x )", &NATIVE),
            Err(Error::DepSpecParse { location: 8, .. })
        );
        assert_matches!(
            parse_dependencies("flag? ( )", &NATIVE),
            Err(Error::DepSpecParse { .. })
        );
    }

    #[test]
    fn test_any_of_rejects_bare_any_of() {
        assert!(parse_dependencies("|| ( || ( app-a/x ) )", &NATIVE).is_err());
        assert!(parse_dependencies("|| ( !app-a/x )", &NATIVE).is_err());
        // an all-of of package specs is fine
        assert!(parse_dependencies("|| ( ( app-a/x app-b/y ) app-c/z )", &NATIVE).is_ok());
    }

    #[test]
    fn test_atom_full_form() {
        let spec =
            parse_package_dep_spec(">=app-a/x-1.2.3:2::overlay[ssl,-gtk,qt=,X?]", &NATIVE)
                .unwrap();
        assert_eq!(spec.package.as_ref().unwrap().to_string(), "app-a/x");
        assert_eq!(spec.version_requirements.len(), 1);
        assert_eq!(
            spec.version_requirements[0].operator,
            VersionOperator::GreaterEqual
        );
        assert_eq!(spec.slot.as_ref().unwrap().as_str(), "2");
        assert_eq!(spec.repository.as_ref().unwrap().as_str(), "overlay");
        assert_eq!(spec.use_requirements.len(), 4);
        assert_eq!(
            spec.use_requirements[2].kind,
            UseRequirementKind::EqualToCaller
        );
        assert_eq!(
            spec.use_requirements[3].kind,
            UseRequirementKind::EnabledIfCallerEnabled
        );
    }

    #[test]
    fn test_atom_prefix_wildcard() {
        let spec = parse_package_dep_spec("=cat/pkg-1.2*", &PMS_EAPI_0).unwrap();
        assert_eq!(
            spec.version_requirements[0].operator,
            VersionOperator::PrefixEqual
        );
        assert_eq!(spec.version_requirements[0].version.as_str(), "1.2");
    }

    #[test]
    fn test_atom_name_version_split() {
        let spec = parse_package_dep_spec("=app-a/gtk+-2.4-r1", &PMS_EAPI_0).unwrap();
        assert_eq!(spec.package.as_ref().unwrap().to_string(), "app-a/gtk+");
        assert_eq!(spec.version_requirements[0].version.as_str(), "2.4-r1");
    }

    #[test]
    fn test_atom_wildcards() {
        let spec = parse_package_dep_spec("app-a/*", &NATIVE).unwrap();
        assert!(spec.package.is_none());
        assert_eq!(spec.category.as_ref().unwrap().as_str(), "app-a");

        let spec = parse_package_dep_spec("*/x", &NATIVE).unwrap();
        assert_eq!(spec.package_part.as_ref().unwrap().as_str(), "x");

        assert!(parse_package_dep_spec("app-a/*", &PMS_EAPI_2).is_err());
    }

    #[test]
    fn test_atom_version_requirement_lists() {
        let spec = parse_package_dep_spec("cat/pkg[>=1.2,<2]", &NATIVE).unwrap();
        assert_eq!(spec.version_requirements.len(), 2);
        assert_eq!(spec.version_requirements_mode, VersionRequirementsMode::And);

        let spec = parse_package_dep_spec("cat/pkg[=1.2|=2.0]", &NATIVE).unwrap();
        assert_eq!(spec.version_requirements_mode, VersionRequirementsMode::Or);

        assert!(parse_package_dep_spec("cat/pkg[>=1.2,<2]", &PMS_EAPI_2).is_err());
    }

    #[test]
    fn test_atom_bump_operator() {
        let spec = parse_package_dep_spec("~>cat/pkg-5.3.1", &NATIVE).unwrap();
        assert_eq!(spec.version_requirements[0].operator, VersionOperator::Bumped);
        assert!(parse_package_dep_spec("~>cat/pkg-5.3.1", &PMS_EAPI_2).is_err());
    }

    #[test]
    fn test_dialect_gates() {
        assert!(parse_package_dep_spec("cat/pkg:2", &PMS_EAPI_0).is_err());
        assert!(parse_package_dep_spec("cat/pkg:2", &PMS_EAPI_1).is_ok());
        assert!(parse_package_dep_spec("cat/pkg[ssl]", &PMS_EAPI_1).is_err());
        assert!(parse_package_dep_spec("cat/pkg[ssl]", &PMS_EAPI_2).is_ok());
        assert!(parse_package_dep_spec("cat/pkg::overlay", &PMS_EAPI_2).is_err());
        assert!(parse_dependencies("!!cat/pkg", &PMS_EAPI_0).is_err());
        assert!(parse_dependencies("!!cat/pkg", &PMS_EAPI_2).is_ok());
    }

    #[test]
    fn test_license_context() {
        let tree = parse_license("GPL-2 flag? ( BSD )", &PMS_EAPI_0).unwrap();
        match &tree {
            DepSpec::AllOf(children) => {
                assert_matches!(&children[0], DepSpec::License(l) if l == "GPL-2");
                assert_matches!(&children[1], DepSpec::Conditional(_));
            }
            _ => unreachable!(),
        }
        assert!(parse_license("cat/pkg", &PMS_EAPI_0).is_err());
    }

    #[test]
    fn test_uri_arrows() {
        let tree = parse_fetchable_uri(
            "https://example.org/download?id=4 -> foo-1.2.tar.gz",
            &EXHERES_0,
        )
        .unwrap();
        match &tree {
            DepSpec::AllOf(children) => {
                assert_matches!(&children[0], DepSpec::FetchableUri(u)
                    if u.renamed.as_deref() == Some("foo-1.2.tar.gz"));
            }
            _ => unreachable!(),
        }
        assert!(parse_fetchable_uri("https://a/b -> c", &PMS_EAPI_0).is_err());
    }

    #[test]
    fn test_labels() {
        let tree = parse_dependencies("build: app-a/x run: app-b/y", &NATIVE).unwrap();
        match &tree {
            DepSpec::AllOf(children) => {
                assert_eq!(children.len(), 4);
                assert_matches!(&children[0], DepSpec::Labels(l)
                    if l[0].role == DepLabelRole::Build);
                assert_matches!(&children[2], DepSpec::Labels(l)
                    if l[0].role == DepLabelRole::Run);
            }
            _ => unreachable!(),
        }
        assert!(parse_dependencies("build: app-a/x", &PMS_EAPI_0).is_err());
    }

    #[test]
    fn test_round_trip() {
        for (input, dialect) in [
            ("|| ( app-a/x app-b/y ) app-c/z", &PMS_EAPI_0),
            ("flag? ( app-a/x !app-b/y )", &PMS_EAPI_0),
            (">=app-a/x-1.2:2[ssl,-gtk]", &PMS_EAPI_2),
            ("!!cat/pkg a? ( !b? ( =cat/q-1* ) )", &NATIVE),
            ("build: app-a/x run: cat/pkg[>=1.2,<2]", &NATIVE),
        ] {
            let once = parse_dependencies(input, dialect).unwrap();
            let printed = once.to_string();
            let twice = parse_dependencies(&printed, dialect).unwrap();
            assert_eq!(once, twice, "round trip failed for {:?} via {:?}", input, printed);
        }
    }

    #[test]
    fn test_find_dialect() {
        assert_eq!(find_dialect("pms-eapi-0").unwrap().name, "pms-eapi-0");
        assert_eq!(find_dialect("marsh-1").unwrap().name, "marsh-1");
        assert!(find_dialect("unknown-eapi").is_none());
    }
}
