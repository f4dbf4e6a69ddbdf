use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use overture_semver::{Constraint, VersionParserError};
use serde::Deserialize;
use thiserror::Error;

use super::{ArrayRepository, ProviderRecord, Repository, RepositoryError};
use crate::package::{LinkKind, Package, PackageKind};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lock document entry \"{name}\" has an invalid version or constraint: {source}")]
    InvalidEntry {
        name: String,
        #[source]
        source: VersionParserError,
    },
}

/// Reference to the VCS source of a locked package.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub reference: String,
}

/// Reference to the distribution archive of a locked package.
#[derive(Debug, Clone, Deserialize)]
pub struct DistRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// One previously-decided package as persisted in the lock document.
#[derive(Debug, Clone, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub dist: Option<DistRef>,
    #[serde(rename = "type", default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub require: IndexMap<String, String>,
    #[serde(default)]
    pub provide: IndexMap<String, String>,
    #[serde(default)]
    pub replace: IndexMap<String, String>,
    #[serde(default)]
    pub conflict: IndexMap<String, String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl LockedPackage {
    fn to_package(&self) -> Result<Package, LockError> {
        let mut package = Package::parse(&self.name, &self.version).map_err(|source| {
            LockError::InvalidEntry {
                name: self.name.clone(),
                source,
            }
        })?;

        if self.package_type.as_deref() == Some("metapackage") {
            package.set_kind(PackageKind::Metapackage);
        }
        package.set_time(self.time);

        let sets = [
            (&self.require, LinkKind::Require),
            (&self.provide, LinkKind::Provide),
            (&self.replace, LinkKind::Replace),
            (&self.conflict, LinkKind::Conflict),
        ];
        for (links, kind) in sets {
            for (target, constraint) in links {
                package
                    .add_link_str(target, kind, constraint)
                    .map_err(|source| LockError::InvalidEntry {
                        name: self.name.clone(),
                        source,
                    })?;
            }
        }

        Ok(package)
    }
}

/// The read-only lock document.
#[derive(Debug, Clone, Deserialize)]
pub struct LockFile {
    #[serde(default)]
    pub packages: Vec<LockedPackage>,
    #[serde(rename = "packages-dev", default)]
    pub packages_dev: Vec<LockedPackage>,
    #[serde(rename = "content-hash", default)]
    pub content_hash: Option<String>,
}

impl LockFile {
    pub fn from_json(json: &str) -> Result<Self, LockError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Materialize the locked state as a repository. Dev packages are
    /// included when `with_dev` is set.
    pub fn to_repository(&self, with_dev: bool) -> Result<LockedRepository, LockError> {
        let mut packages = Vec::new();
        let mut dev_names = Vec::new();

        for locked in &self.packages {
            packages.push(Arc::new(locked.to_package()?));
        }
        if with_dev {
            for locked in &self.packages_dev {
                dev_names.push(locked.name.to_lowercase());
                packages.push(Arc::new(locked.to_package()?));
            }
        }

        Ok(LockedRepository::new(packages, dev_names))
    }
}

/// Repository view over the prior (locked) package set.
pub struct LockedRepository {
    inner: ArrayRepository,
    dev_names: Vec<String>,
}

impl LockedRepository {
    pub fn new(packages: Vec<Arc<Package>>, dev_names: Vec<String>) -> Self {
        let mut inner = ArrayRepository::new("locked");
        for package in packages {
            inner.add_package_arc(package);
        }
        LockedRepository { inner, dev_names }
    }

    /// Whether a locked package came from the dev partition.
    pub fn is_dev(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.dev_names.iter().any(|d| *d == name)
    }

    pub fn packages(&self) -> Vec<Arc<Package>> {
        // ArrayRepository::get_packages is infallible for in-memory data.
        self.inner.get_packages().unwrap_or_default()
    }
}

impl Repository for LockedRepository {
    fn repo_name(&self) -> &str {
        self.inner.repo_name()
    }

    fn find_packages(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Arc<Package>>, RepositoryError> {
        self.inner.find_packages(name, constraint)
    }

    fn get_packages(&self) -> Result<Vec<Arc<Package>>, RepositoryError> {
        self.inner.get_packages()
    }

    fn get_providers(&self, name: &str) -> Result<Vec<ProviderRecord>, RepositoryError> {
        self.inner.get_providers(name)
    }
}
