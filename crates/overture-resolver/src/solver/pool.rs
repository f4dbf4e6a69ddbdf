use std::sync::Arc;

use indexmap::IndexMap;
use overture_semver::{Constraint, Stability, Version};

use crate::package::{AliasPackage, Link, Package};

/// Identifies one pool entry. Ids are 1-based so they can double as SAT
/// literals: `+id` installs the entry, `-id` keeps it out.
pub type PackageId = i32;

/// One candidate in the pool: a concrete package or an alias entry.
#[derive(Debug, Clone)]
pub enum PoolEntry {
    Package(Arc<Package>),
    Alias(Arc<AliasPackage>),
}

impl PoolEntry {
    pub fn name(&self) -> &str {
        match self {
            PoolEntry::Package(p) => p.name(),
            PoolEntry::Alias(a) => a.name(),
        }
    }

    pub fn pretty_name(&self) -> &str {
        match self {
            PoolEntry::Package(p) => p.pretty_name(),
            PoolEntry::Alias(a) => a.pretty_name(),
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            PoolEntry::Package(p) => p.version(),
            PoolEntry::Alias(a) => a.version(),
        }
    }

    pub fn pretty_version(&self) -> &str {
        match self {
            PoolEntry::Package(p) => p.pretty_version(),
            PoolEntry::Alias(a) => a.pretty_version(),
        }
    }

    pub fn stability(&self) -> Stability {
        match self {
            PoolEntry::Package(p) => p.stability(),
            PoolEntry::Alias(a) => a.stability(),
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, PoolEntry::Alias(_))
    }

    pub fn as_package(&self) -> Option<&Arc<Package>> {
        match self {
            PoolEntry::Package(p) => Some(p),
            PoolEntry::Alias(_) => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Arc<AliasPackage>> {
        match self {
            PoolEntry::Alias(a) => Some(a),
            PoolEntry::Package(_) => None,
        }
    }

    pub fn requires(&self) -> &[Link] {
        match self {
            PoolEntry::Package(p) => p.requires(),
            PoolEntry::Alias(a) => a.requires(),
        }
    }

    pub fn conflicts(&self) -> &[Link] {
        match self {
            PoolEntry::Package(p) => p.conflicts(),
            PoolEntry::Alias(a) => a.conflicts(),
        }
    }

    pub fn replaces(&self) -> &[Link] {
        match self {
            PoolEntry::Package(p) => p.replaces(),
            PoolEntry::Alias(a) => a.replaces(),
        }
    }

    pub fn provides(&self) -> &[Link] {
        match self {
            PoolEntry::Package(p) => p.provides(),
            PoolEntry::Alias(a) => a.provides(),
        }
    }

    /// The constraint at which this entry occupies `name` through a
    /// replace or provide link.
    pub fn provided_constraint_for(&self, name: &str) -> Option<Constraint> {
        self.replaces()
            .iter()
            .chain(self.provides().iter())
            .find(|link| link.target() == name)
            .map(|link| link.constraint().clone())
    }

    pub fn pretty_string(&self) -> String {
        match self {
            PoolEntry::Package(p) => p.pretty_string(),
            PoolEntry::Alias(a) => a.pretty_string(),
        }
    }
}

/// The universe of candidates for one solve.
///
/// Immutable once built: entries are indexed by a dense 1-based id, by
/// lowercased name, and by every name contributed through provide and
/// replace links. Each entry remembers the repository it came from, so
/// packages with identical `(name, version)` from different repositories
/// stay distinct.
#[derive(Debug, Default)]
pub struct Pool {
    entries: Vec<PoolEntry>,
    repo_indexes: Vec<usize>,
    packages_by_name: IndexMap<String, Vec<PackageId>>,
    /// name -> (id, constraint the name is provided at)
    providers: IndexMap<String, Vec<(PackageId, Constraint)>>,
    alias_map: IndexMap<PackageId, PackageId>,
    minimum_stability: Stability,
    stability_flags: IndexMap<String, Stability>,
}

impl Pool {
    pub fn new() -> Self {
        Pool {
            minimum_stability: Stability::Stable,
            ..Pool::default()
        }
    }

    pub fn with_minimum_stability(minimum_stability: Stability) -> Self {
        Pool {
            minimum_stability,
            ..Pool::default()
        }
    }

    pub fn minimum_stability(&self) -> Stability {
        self.minimum_stability
    }

    /// Allow a specific package name down to a lower stability than the
    /// global minimum.
    pub fn add_stability_flag(&mut self, package_name: &str, stability: Stability) {
        self.stability_flags
            .insert(package_name.to_lowercase(), stability);
    }

    /// Per-name stability overrides, in insertion order.
    pub fn stability_flags(&self) -> impl Iterator<Item = (&str, Stability)> {
        self.stability_flags.iter().map(|(n, s)| (n.as_str(), *s))
    }

    fn effective_minimum_stability(&self, package_name: &str) -> Stability {
        self.stability_flags
            .get(package_name)
            .copied()
            .unwrap_or(self.minimum_stability)
    }

    fn meets_stability(&self, name: &str, stability: Stability) -> bool {
        stability.is_at_least(self.effective_minimum_stability(name))
    }

    /// Add a package from the repository at `repo_index`. Returns 0 when
    /// the package fails the stability filter.
    pub fn add_package(&mut self, package: Arc<Package>, repo_index: usize) -> PackageId {
        if !self.meets_stability(package.name(), package.stability()) {
            return 0;
        }

        let id = (self.entries.len() + 1) as PackageId;
        let name = package.name().to_string();

        self.packages_by_name.entry(name).or_default().push(id);

        for link in package.provides().iter().chain(package.replaces().iter()) {
            self.providers
                .entry(link.target().to_string())
                .or_default()
                .push((id, link.constraint().clone()));
        }

        self.entries.push(PoolEntry::Package(package));
        self.repo_indexes.push(repo_index);
        id
    }

    /// Materialize an alias for a base entry already in the pool.
    pub fn add_alias(&mut self, base_id: PackageId, alias: Arc<AliasPackage>) -> PackageId {
        let Some(_) = self.entry(base_id) else {
            return 0;
        };

        let id = (self.entries.len() + 1) as PackageId;
        let name = alias.name().to_string();

        self.packages_by_name.entry(name).or_default().push(id);

        for link in alias.provides().iter().chain(alias.replaces().iter()) {
            self.providers
                .entry(link.target().to_string())
                .or_default()
                .push((id, link.constraint().clone()));
        }

        let repo_index = self.repo_indexes[(base_id - 1) as usize];
        self.entries.push(PoolEntry::Alias(alias));
        self.repo_indexes.push(repo_index);
        self.alias_map.insert(id, base_id);
        id
    }

    pub fn entry(&self, id: PackageId) -> Option<&PoolEntry> {
        if id > 0 {
            self.entries.get((id - 1) as usize)
        } else {
            None
        }
    }

    /// The concrete package behind an id; None for alias entries.
    pub fn package(&self, id: PackageId) -> Option<&Arc<Package>> {
        self.entry(id).and_then(|e| e.as_package())
    }

    pub fn is_alias(&self, id: PackageId) -> bool {
        self.entry(id).map(|e| e.is_alias()).unwrap_or(false)
    }

    pub fn is_root_package_alias(&self, id: PackageId) -> bool {
        self.entry(id)
            .and_then(|e| e.as_alias())
            .map(|a| a.is_root_alias())
            .unwrap_or(false)
    }

    pub fn get_alias_base(&self, id: PackageId) -> Option<PackageId> {
        self.alias_map.get(&id).copied()
    }

    pub fn get_aliases(&self, base_id: PackageId) -> Vec<PackageId> {
        self.alias_map
            .iter()
            .filter(|(_, &base)| base == base_id)
            .map(|(&alias_id, _)| alias_id)
            .collect()
    }

    /// Index of the repository this entry came from; lower wins ties in
    /// policy ordering.
    pub fn repo_index(&self, id: PackageId) -> usize {
        if id > 0 {
            self.repo_indexes
                .get((id - 1) as usize)
                .copied()
                .unwrap_or(usize::MAX)
        } else {
            usize::MAX
        }
    }

    pub fn packages_by_name(&self, name: &str) -> Vec<PackageId> {
        self.packages_by_name
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// All ids satisfying `name` under `constraint`: direct candidates
    /// plus provide/replace contributors whose provided range intersects
    /// the constraint.
    pub fn what_provides(&self, name: &str, constraint: Option<&Constraint>) -> Vec<PackageId> {
        self.what_provides_with_options(name, constraint, true)
    }

    /// Only direct candidates with the exact name.
    pub fn what_provides_direct_only(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Vec<PackageId> {
        self.what_provides_with_options(name, constraint, false)
    }

    fn what_provides_with_options(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
        include_providers: bool,
    ) -> Vec<PackageId> {
        let name = name.to_lowercase();
        let mut result = Vec::new();

        if let Some(ids) = self.packages_by_name.get(&name) {
            for &id in ids {
                let Some(entry) = self.entry(id) else { continue };
                let matched = match constraint {
                    Some(c) => c.matches_version(entry.version()),
                    None => true,
                };
                if matched {
                    result.push(id);
                }
            }
        }

        if include_providers {
            if let Some(records) = self.providers.get(&name) {
                for (id, provided) in records {
                    let matched = match constraint {
                        Some(c) => c.matches(provided),
                        None => true,
                    };
                    if matched {
                        result.push(*id);
                    }
                }
            }
        }

        result
    }

    pub fn has_direct_packages(&self, name: &str, constraint: Option<&Constraint>) -> bool {
        !self.what_provides_direct_only(name, constraint).is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_package_ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        1..=self.entries.len() as PackageId
    }

    /// Names with candidates, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages_by_name.keys().map(|s| s.as_str())
    }
}
