//! Named package sets
//!
//! Set contents are lines of package specs, with `@name` lines
//! referring to other sets. The world set persists as a sorted list of
//! qualified names, one per line.

use crate::dep_parser::{parse_package_dep_spec, NATIVE};
use crate::dep_spec::DepSpec;
use crate::error::Result;
use crate::name::QualifiedPackageName;
use std::collections::BTreeSet;
use std::path::Path;

/// Parse set contents into a dependency tree of package specs and set
/// references.
pub fn parse_set_lines<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> Result<DepSpec> {
    let mut children = Vec::new();
    for line in lines {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('@') {
            Some(set) => children.push(DepSpec::NamedSet(set.parse()?)),
            None => children.push(DepSpec::Package(parse_package_dep_spec(line, &NATIVE)?)),
        }
    }
    Ok(DepSpec::AllOf(children))
}

/// Load a world file: one qualified name per line.
pub fn load_world(path: &Path) -> Result<BTreeSet<QualifiedPackageName>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };
    let mut world = BTreeSet::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        world.insert(line.parse()?);
    }
    Ok(world)
}

/// Write a world file, sorted, one name per line.
pub fn save_world(path: &Path, world: &BTreeSet<QualifiedPackageName>) -> Result<()> {
    let mut content = String::new();
    for name in world {
        content.push_str(&name.to_string());
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// The world set as a dependency tree.
pub fn world_to_tree(world: &BTreeSet<QualifiedPackageName>) -> DepSpec {
    DepSpec::AllOf(
        world
            .iter()
            .map(|name| {
                DepSpec::Package(crate::dep_spec::PackageDepSpec::simple(name.clone()))
            })
            .collect(),
    )
}
