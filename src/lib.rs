//! Marsh resolver core
//!
//! The dependency resolver and dep-spec engine of a source-based
//! package manager for recipe ("ebuild") repositories.
//!
//! # Architecture
//!
//! - **Names & versions**: validated identifier newtypes and the
//!   ebuild version grammar with its total order
//! - **Dep specs**: the conditional dependency tree, parsed per recipe
//!   dialect and printed back verbatim
//! - **Repositories**: an abstract source of package ids and metadata,
//!   loaded lazily through an opaque cache surface
//! - **Environment**: user policy, profiles, named sets and the mask
//!   engine
//! - **Resolver**: targets in, ordered install plan out, with cycle
//!   breaking, blocks and rebuild accounting
//! - **Build plan**: the structured records handed to the recipe
//!   runner
//!
//! Resolution is synchronous and single-threaded; repository I/O
//! blocks the caller and there are no suspension points.

pub mod build_plan;
pub mod database;
pub mod dep_parser;
pub mod dep_spec;
pub mod environment;
pub mod error;
pub mod mask;
pub mod name;
pub mod package_id;
pub mod profile;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod version;

pub use build_plan::{build_plan, InvocationKind, RecipeInvocation};
pub use database::PackageDatabase;
pub use dep_parser::{find_dialect, parse_package_dep_spec, Dialect};
pub use dep_spec::{BlockDepSpec, DepSpec, DepTag, PackageDepSpec};
pub use environment::{Environment, EnvironmentConfig};
pub use error::{Error, Result};
pub use mask::{MaskReason, MaskReasons};
pub use name::{
    CategoryName, KeywordName, PackageName, QualifiedPackageName, RepositoryName, SetName,
    SlotName, UseFlagName, UseFlagState,
};
pub use package_id::{PackageId, PackageMetadata};
pub use profile::Profile;
pub use query::{match_package, match_package_from, Query};
pub use repository::{
    FakeRepository, InstalledRepository, Repository, RepositoryCapabilities,
};
pub use resolver::{
    ChangeType, DepList, DepListEntry, DepListEntryKind, DepListOptions, DowngradePolicy,
    ReinstallPolicy, ResolvedDepList, SlotTargets, SuggestedPolicy,
};
pub use version::{VersionOperator, VersionRequirement, VersionSpec};
