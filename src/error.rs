//! Error types for the resolver core

use thiserror::Error;

/// Result type alias for resolver core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which name validator rejected a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Category,
    Package,
    Slot,
    Repository,
    Keyword,
    UseFlag,
    Set,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NameKind::Category => "category name",
            NameKind::Package => "package name",
            NameKind::Slot => "slot name",
            NameKind::Repository => "repository name",
            NameKind::Keyword => "keyword name",
            NameKind::UseFlag => "USE flag name",
            NameKind::Set => "set name",
        };
        f.write_str(s)
    }
}

/// Resolver core errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {kind}: {value:?}")]
    Name { kind: NameKind, value: String },

    #[error("Invalid version: {0:?}")]
    BadVersionSpec(String),

    #[error("Invalid version operator: {0:?}")]
    BadVersionOperator(String),

    #[error("Dependency parse error at offset {location}: {reason}")]
    DepSpecParse { location: usize, reason: String },

    #[error("Invalid package dependency spec: {0}")]
    PackageDepSpec(String),

    #[error("No such package: {0}")]
    NoSuchPackage(String),

    #[error("No such version: {package}-{version}")]
    NoSuchVersion { package: String, version: String },

    #[error("Ambiguous package name {name}: could be {}", .candidates.join(", "))]
    AmbiguousName {
        name: String,
        candidates: Vec<String>,
    },

    #[error("No usable candidate for {spec}: {}", .candidates.join("; "))]
    AllMasked {
        spec: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Block: {blocker} blocks {blocked} (strong: {strong})")]
    Block {
        blocker: String,
        blocked: String,
        strong: bool,
    },

    #[error("Downgrade not allowed: {package} from {installed} to {candidate}")]
    DowngradeNotAllowed {
        package: String,
        installed: String,
        candidate: String,
    },

    #[error("No destination repository for {0}")]
    NoDestination(String),

    #[error("Conflicting requirement: {spec} cannot match planned {chosen}")]
    ConflictingRequirement { spec: String, chosen: String },

    #[error("No such set: {0}")]
    NoSuchSet(String),

    #[error("Repository configuration error: {0}")]
    RepositoryConfiguration(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap the error with an outer context description.
    ///
    /// Only annotates; the wrapped variant stays reachable through
    /// `std::error::Error::source` for callers that match on it.
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context annotations.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension for annotating results with a context chain
pub trait ResultExt<T> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
