use std::sync::Arc;

use indexmap::IndexMap;
use overture_semver::{Constraint, Version};

use super::{ArrayRepository, ProviderRecord, Repository, RepositoryError};
use crate::package::Package;

/// Synthesizes platform packages (runtime, extensions) from a probe map.
///
/// The probe supplies `name -> Some(version)` for present capabilities and
/// `name -> None` for explicitly disabled ones; disabled names are kept so
/// the problem explainer can distinguish "missing" from "disabled".
pub struct PlatformRepository {
    inner: ArrayRepository,
    disabled: Vec<String>,
}

impl PlatformRepository {
    pub fn from_probe(probe: IndexMap<String, Option<Version>>) -> Self {
        let mut inner = ArrayRepository::new("platform");
        let mut disabled = Vec::new();

        for (name, version) in probe {
            let name = name.to_lowercase();
            match version {
                Some(version) => inner.add_package(Package::new(name, version)),
                None => disabled.push(name),
            }
        }

        PlatformRepository { inner, disabled }
    }

    /// Platform names the probe reported as disabled.
    pub fn disabled_names(&self) -> &[String] {
        &self.disabled
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.disabled.iter().any(|d| *d == name)
    }
}

impl Repository for PlatformRepository {
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
