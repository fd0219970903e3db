//! Package database
//!
//! An ordered collection of repositories. The first repository is the
//! favourite: ambiguous lookups prefer it, and ties between equal
//! versions resolve by repository position.

use crate::error::{Error, Result};
use crate::name::{PackageName, QualifiedPackageName, RepositoryName};
use crate::repository::Repository;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PackageDatabase {
    repositories: Vec<Arc<dyn Repository>>,
}

impl PackageDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a repository; earlier repositories have higher priority.
    pub fn add_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repositories.push(repository);
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    /// The favourite repository: the first one configured.
    pub fn favourite_repository(&self) -> Option<&RepositoryName> {
        self.repositories.first().map(|r| r.name())
    }

    pub fn fetch_repository(&self, name: &RepositoryName) -> Result<&Arc<dyn Repository>> {
        self.repositories
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| {
                Error::RepositoryConfiguration(format!("no repository named {}", name))
            })
    }

    /// Priority of a repository: its position, lower is better.
    pub fn repository_priority(&self, name: &RepositoryName) -> Option<usize> {
        self.repositories.iter().position(|r| r.name() == name)
    }

    /// Resolve a bare package name to its qualified form by scanning
    /// every repository's categories. Exactly one category may supply
    /// the name.
    pub fn fetch_unique_qualified_package_name(
        &self,
        package: &PackageName,
    ) -> Result<QualifiedPackageName> {
        let mut candidates: Vec<QualifiedPackageName> = Vec::new();
        for repo in &self.repositories {
            for category in repo.category_names() {
                for qpn in repo.package_names(&category) {
                    if qpn.package == *package && !candidates.contains(&qpn) {
                        candidates.push(qpn);
                    }
                }
            }
        }
        match candidates.len() {
            0 => Err(Error::NoSuchPackage(package.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(Error::AmbiguousName {
                    name: package.to_string(),
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FakeRepository;
    use assert_matches::assert_matches;

    #[test]
    fn test_favourite_is_first() {
        let mut db = PackageDatabase::new();
        db.add_repository(Arc::new(FakeRepository::new("first").unwrap()));
        db.add_repository(Arc::new(FakeRepository::new("second").unwrap()));
        assert_eq!(db.favourite_repository().unwrap().as_str(), "first");
        assert_eq!(
            db.repository_priority(&"second".parse().unwrap()),
            Some(1)
        );
    }

    #[test]
    fn test_unique_name_disambiguation() {
        let repo = FakeRepository::new("testrepo").unwrap();
        repo.add_version("app-editors", "vim", "8.0").unwrap();
        repo.add_version("app-misc", "screen", "4.0").unwrap();
        let mut db = PackageDatabase::new();
        db.add_repository(Arc::new(repo));

        let qpn = db
            .fetch_unique_qualified_package_name(&"vim".parse().unwrap())
            .unwrap();
        assert_eq!(qpn.to_string(), "app-editors/vim");

        assert_matches!(
            db.fetch_unique_qualified_package_name(&"nope".parse().unwrap()),
            Err(Error::NoSuchPackage(_))
        );
    }

    #[test]
    fn test_ambiguous_name() {
        let repo = FakeRepository::new("testrepo").unwrap();
        repo.add_version("app-editors", "vim", "8.0").unwrap();
        repo.add_version("app-shells", "vim", "1.0").unwrap();
        let mut db = PackageDatabase::new();
        db.add_repository(Arc::new(repo));

        assert_matches!(
            db.fetch_unique_qualified_package_name(&"vim".parse().unwrap()),
            Err(Error::AmbiguousName { candidates, .. }) if candidates.len() == 2
        );
    }
}
