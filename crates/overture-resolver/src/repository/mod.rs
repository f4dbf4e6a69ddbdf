//! Read-only package sources and their ordered aggregation.

mod lock;
mod platform;

use std::sync::Arc;

use overture_semver::Constraint;
use thiserror::Error;

use crate::package::Package;

pub use lock::{LockError, LockFile, LockedPackage, LockedRepository};
pub use platform::PlatformRepository;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("repository \"{repo}\" failed to load metadata for \"{name}\": {message}")]
    MetadataUnavailable {
        repo: String,
        name: String,
        message: String,
    },
    #[error("repository \"{repo}\" is unreachable: {message}")]
    Unreachable { repo: String, message: String },
}

/// A package a repository contributes under a name it does not itself
/// carry, via a provide or replace link.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    /// The provided name.
    pub name: String,
    /// The contributing package.
    pub provider: Arc<Package>,
    /// The constraint at which the name is provided.
    pub constraint: Constraint,
}

/// Read-only package source.
///
/// The core consumes repositories synchronously; any fetching or caching
/// happens behind this interface before the call returns.
pub trait Repository {
    /// A stable identifier used in priorities and diagnostics.
    fn repo_name(&self) -> &str;

    /// All versions of `name`, optionally narrowed by a constraint.
    fn find_packages(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Arc<Package>>, RepositoryError>;

    /// Every package this repository carries.
    fn get_packages(&self) -> Result<Vec<Arc<Package>>, RepositoryError>;

    /// Packages contributing `name` via provide/replace links.
    fn get_providers(&self, name: &str) -> Result<Vec<ProviderRecord>, RepositoryError>;
}

/// In-memory repository; the building block for tests, the lock adapter
/// and the platform adapter.
#[derive(Debug, Default)]
pub struct ArrayRepository {
    name: String,
    packages: Vec<Arc<Package>>,
}

impl ArrayRepository {
    pub fn new(name: impl Into<String>) -> Self {
        ArrayRepository {
            name: name.into(),
            packages: Vec::new(),
        }
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push(Arc::new(package));
    }

    pub fn add_package_arc(&mut self, package: Arc<Package>) {
        self.packages.push(package);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Repository for ArrayRepository {
    fn repo_name(&self) -> &str {
        &self.name
    }

    fn find_packages(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Arc<Package>>, RepositoryError> {
        let name = name.to_lowercase();
        Ok(self
            .packages
            .iter()
            .filter(|p| p.name() == name)
            .filter(|p| match constraint {
                Some(c) => c.matches_version(p.version()),
                None => true,
            })
            .cloned()
            .collect())
    }

    fn get_packages(&self) -> Result<Vec<Arc<Package>>, RepositoryError> {
        Ok(self.packages.clone())
    }

    fn get_providers(&self, name: &str) -> Result<Vec<ProviderRecord>, RepositoryError> {
        let name = name.to_lowercase();
        let mut records = Vec::new();
        for package in &self.packages {
            if let Some(constraint) = package.provided_constraint_for(&name) {
                records.push(ProviderRecord {
                    name: name.clone(),
                    provider: package.clone(),
                    constraint,
                });
            }
        }
        Ok(records)
    }
}

/// Ordered collection of repositories. Position defines priority: the
/// first repository wins ties in policy ordering.
pub struct RepositorySet {
    repositories: Vec<Arc<dyn Repository>>,
    platform: Option<Arc<PlatformRepository>>,
}

impl RepositorySet {
    pub fn new() -> Self {
        RepositorySet {
            repositories: Vec::new(),
            platform: None,
        }
    }

    pub fn add_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repositories.push(repository);
    }

    /// Register the platform probe repository. It participates in
    /// lookups like any repository, and requirement failures against it
    /// get a dedicated diagnosis.
    pub fn add_platform_repository(&mut self, repository: Arc<PlatformRepository>) {
        self.platform = Some(repository.clone());
        self.repositories.push(repository);
    }

    pub fn platform_repository(&self) -> Option<&Arc<PlatformRepository>> {
        self.platform.as_ref()
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// All candidates for `name` across repositories, each tagged with the
    /// index of the repository that supplied it, in repository order.
    pub fn find_packages(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<(usize, Arc<Package>)>, RepositoryError> {
        let mut found = Vec::new();
        for (index, repository) in self.repositories.iter().enumerate() {
            for package in repository.find_packages(name, constraint)? {
                found.push((index, package));
            }
        }
        Ok(found)
    }

    /// All provider records for `name`, tagged with repository index.
    pub fn find_providers(
        &self,
        name: &str,
    ) -> Result<Vec<(usize, ProviderRecord)>, RepositoryError> {
        let mut found = Vec::new();
        for (index, repository) in self.repositories.iter().enumerate() {
            for record in repository.get_providers(name)? {
                found.push((index, record));
            }
        }
        Ok(found)
    }
}

impl Default for RepositorySet {
    fn default() -> Self {
        Self::new()
    }
}
