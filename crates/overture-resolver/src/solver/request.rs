use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use overture_semver::{Constraint, Version};

use crate::package::Package;

/// Which locked packages stay pinned during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Only the explicitly listed packages may change.
    #[default]
    OnlyListed,
    /// Listed packages and their transitive dependencies may change.
    ListedWithTransitive,
    /// Like `ListedWithTransitive`, but the expansion stops at names the
    /// root itself requires.
    ListedWithTransitiveNoRoot,
    /// Every locked package may change.
    All,
}

/// A root-level requirement with its diagnostic spelling.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub constraint: Constraint,
    pub pretty_constraint: String,
}

/// A root-declared alias: candidates of `name` at `version` also appear
/// in the pool under `alias_version`.
#[derive(Debug, Clone)]
pub struct RootAlias {
    pub name: String,
    pub version: Version,
    pub alias_version: Version,
}

/// What one solve is asked to do: root requirements, pinned packages,
/// removals, the locked prior state, and the update policy.
#[derive(Default)]
pub struct Request {
    root_package: Option<Arc<Package>>,
    requires: IndexMap<String, Requirement>,
    fixed_packages: Vec<Arc<Package>>,
    locked_packages: Vec<Arc<Package>>,
    removals: IndexSet<String>,
    update_allow_list: IndexSet<String>,
    aliases: Vec<RootAlias>,
}

impl Request {
    pub fn new() -> Self {
        Request::default()
    }

    /// Install the root package itself as a fixed, operation-less anchor.
    /// Its require links participate in rule generation but it never
    /// appears in the transaction.
    pub fn set_root_package(&mut self, package: Arc<Package>) {
        self.root_package = Some(package);
    }

    pub fn root_package(&self) -> Option<&Arc<Package>> {
        self.root_package.as_ref()
    }

    pub fn root_name(&self) -> Option<&str> {
        self.root_package.as_ref().map(|p| p.name())
    }

    /// Add a root requirement.
    pub fn require(&mut self, name: &str, constraint: Constraint) {
        let pretty = constraint.to_string();
        self.require_pretty(name, constraint, pretty);
    }

    /// Add a root requirement keeping the user's constraint spelling for
    /// diagnostics.
    pub fn require_pretty(
        &mut self,
        name: &str,
        constraint: Constraint,
        pretty_constraint: impl Into<String>,
    ) {
        self.requires.insert(
            name.to_lowercase(),
            Requirement {
                constraint,
                pretty_constraint: pretty_constraint.into(),
            },
        );
    }

    /// Pin a package: it must appear unchanged in the target state.
    pub fn fix(&mut self, package: Arc<Package>) {
        self.fixed_packages.push(package);
    }

    /// Ask for a package to be absent from the target state.
    pub fn remove(&mut self, name: &str) {
        self.removals.insert(name.to_lowercase());
    }

    /// Register the prior (locked/installed) package set.
    pub fn lock(&mut self, package: Arc<Package>) {
        self.locked_packages.push(package);
    }

    /// Allow a locked package to change in this update.
    pub fn allow_update(&mut self, name: &str) {
        self.update_allow_list.insert(name.to_lowercase());
    }

    /// Declare a root alias for pool materialization.
    pub fn alias(&mut self, name: &str, version: Version, alias_version: Version) {
        self.aliases.push(RootAlias {
            name: name.to_lowercase(),
            version,
            alias_version,
        });
    }

    pub fn all_requires(&self) -> impl Iterator<Item = (&str, &Requirement)> {
        self.requires.iter().map(|(name, req)| (name.as_str(), req))
    }

    pub fn get_require(&self, name: &str) -> Option<&Requirement> {
        self.requires.get(&name.to_lowercase())
    }

    pub fn fixed_packages(&self) -> &[Arc<Package>] {
        &self.fixed_packages
    }

    pub fn locked_packages(&self) -> &[Arc<Package>] {
        &self.locked_packages
    }

    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.removals.iter().map(|s| s.as_str())
    }

    pub fn aliases(&self) -> &[RootAlias] {
        &self.aliases
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.fixed_packages.iter().any(|p| p.name() == name)
            || self
                .root_package
                .as_ref()
                .map(|p| p.name() == name)
                .unwrap_or(false)
    }

    pub fn is_removal(&self, name: &str) -> bool {
        self.removals.contains(&name.to_lowercase())
    }

    pub fn get_locked(&self, name: &str) -> Option<&Arc<Package>> {
        let name = name.to_lowercase();
        self.locked_packages.iter().find(|p| p.name() == name)
    }

    /// The locked packages that stay pinned under the given update
    /// policy. Explicitly fixed packages are always pinned and are not
    /// part of this list.
    pub fn locked_as_fixed(&self, policy: UpdatePolicy) -> Vec<Arc<Package>> {
        match policy {
            UpdatePolicy::All => Vec::new(),
            UpdatePolicy::OnlyListed => self
                .locked_packages
                .iter()
                .filter(|p| !self.update_allow_list.contains(p.name()))
                .cloned()
                .collect(),
            UpdatePolicy::ListedWithTransitive | UpdatePolicy::ListedWithTransitiveNoRoot => {
                let stop_at_root = policy == UpdatePolicy::ListedWithTransitiveNoRoot;
                let allowed = self.expand_allow_list(stop_at_root);
                self.locked_packages
                    .iter()
                    .filter(|p| !allowed.contains(p.name()))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Expand the allow-list through the locked packages' require edges.
    fn expand_allow_list(&self, stop_at_root_requires: bool) -> IndexSet<String> {
        let mut allowed: IndexSet<String> = self.update_allow_list.clone();
        let mut queue: Vec<String> = allowed.iter().cloned().collect();

        while let Some(name) = queue.pop() {
            let Some(locked) = self.get_locked(&name) else {
                continue;
            };
            for link in locked.requires() {
                let target = link.target().to_string();
                if allowed.contains(&target) {
                    continue;
                }
                if stop_at_root_requires && self.requires.contains_key(&target) {
                    continue;
                }
                allowed.insert(target.clone());
                queue.push(target);
            }
        }

        allowed
    }
}
