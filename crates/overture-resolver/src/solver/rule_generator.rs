use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::pool::{PackageId, Pool, PoolEntry};
use super::request::Request;
use super::rule::{Rule, RuleKind};
use super::rule_set::RuleSet;
use super::SolverOptions;
use crate::package::Package;
use crate::platform::is_platform_package;

/// Transforms the pool and request into SAT clauses.
///
/// Emitted per the dependency graph: root requirements, fixed/pinned
/// assertions, per-link requirement clauses, explicit conflicts,
/// at-most-one groups per effective name, and alias implications.
pub struct RuleGenerator<'a> {
    pool: &'a Pool,
    options: &'a SolverOptions,
    rules: RuleSet,
    added_packages: IndexSet<PackageId>,
    same_name_added: HashSet<String>,
    providers_by_name: IndexMap<String, Vec<PackageId>>,
    /// Names required by the root (directly, or occupied by a candidate
    /// of a root-required name). Replacers and providers may only be
    /// auto-selected for these names or for names that also have direct
    /// candidates.
    root_required_names: HashSet<String>,
}

impl<'a> RuleGenerator<'a> {
    pub fn new(pool: &'a Pool, options: &'a SolverOptions) -> Self {
        RuleGenerator {
            pool,
            options,
            rules: RuleSet::new(),
            added_packages: IndexSet::new(),
            same_name_added: HashSet::new(),
            providers_by_name: IndexMap::new(),
            root_required_names: HashSet::new(),
        }
    }

    pub fn generate(mut self, request: &Request) -> RuleSet {
        for (name, _) in request.all_requires() {
            self.root_required_names.insert(name.to_string());
        }
        let seeds: Vec<String> = self.root_required_names.iter().cloned().collect();
        for name in seeds {
            for id in self.pool.what_provides(&name, None) {
                if let Some(entry) = self.pool.entry(id) {
                    for link in entry.replaces().iter().chain(entry.provides().iter()) {
                        self.root_required_names.insert(link.target().to_string());
                    }
                }
            }
        }

        self.add_fixed_rules(request);
        self.add_removal_rules(request);
        self.add_root_require_rules(request);
        self.add_replace_conflict_rules();
        self.add_provider_conflict_rules();

        log::debug!("generated {} rules: {:?}", self.rules.len(), self.rules.stats());

        self.rules
    }

    /// The root anchor, request-fixed packages and policy-pinned locked
    /// packages become unit assertions; rival candidates of the same name
    /// are asserted false.
    fn add_fixed_rules(&mut self, request: &Request) {
        let mut pinned: Vec<(Arc<Package>, RuleKind)> = Vec::new();
        if let Some(root) = request.root_package() {
            pinned.push((root.clone(), RuleKind::Fixed));
        }
        for package in request.fixed_packages() {
            pinned.push((package.clone(), RuleKind::Fixed));
        }
        for package in request.locked_as_fixed(self.options.update_policy) {
            pinned.push((package, RuleKind::InstalledPackage));
        }

        for (package, kind) in pinned {
            let ids = self.pool.packages_by_name(package.name());
            let Some(&fixed_id) = ids.iter().find(|&&id| {
                self.pool
                    .entry(id)
                    .map(|e| !e.is_alias() && e.version() == package.version())
                    .unwrap_or(false)
            }) else {
                continue;
            };

            let rule = Rule::assertion(fixed_id, kind)
                .with_source(fixed_id)
                .with_target(package.name());
            self.rules.add(rule);

            for &other in &ids {
                if other == fixed_id || self.pool.get_alias_base(other) == Some(fixed_id) {
                    continue;
                }
                let rule = Rule::assertion(-other, kind)
                    .with_source(fixed_id)
                    .with_target(package.name());
                self.rules.add(rule);
            }

            self.add_package_rules(fixed_id);
        }
    }

    /// Requested removals force every candidate of the name false.
    fn add_removal_rules(&mut self, request: &Request) {
        for name in request.removals() {
            for id in self.pool.packages_by_name(name) {
                let rule = Rule::assertion(-id, RuleKind::Fixed).with_target(name);
                self.rules.add(rule);
            }
        }
    }

    fn add_root_require_rules(&mut self, request: &Request) {
        for (name, requirement) in request.all_requires() {
            if self.options.platform_filter.ignores(name) {
                continue;
            }

            let providers = self.pool.what_provides(name, Some(&requirement.constraint));

            if providers.is_empty() {
                // empty clause: reported as "requirement not found"
                let rule = Rule::new(vec![], RuleKind::RootRequire)
                    .with_target(name)
                    .with_constraint(requirement.pretty_constraint.clone());
                self.rules.add(rule);
                continue;
            }

            let rule = Rule::root_require(providers.clone())
                .with_target(name)
                .with_constraint(requirement.pretty_constraint.clone());
            self.rules.add(rule);

            for id in providers {
                self.add_package_rules(id);
            }
        }
    }

    /// Emit rules for a candidate and everything reachable from it.
    ///
    /// Breadth-first over a work queue: a package's own requirement
    /// rules all land before any rule of its dependencies. Rule order is
    /// part of observable behavior (the solver scans rules in id order
    /// when picking the next decision), so the traversal shape is not an
    /// implementation detail.
    fn add_package_rules(&mut self, seed: PackageId) {
        let pool = self.pool;
        let mut queue: VecDeque<PackageId> = VecDeque::new();
        queue.push_back(seed);

        while let Some(package_id) = queue.pop_front() {
            if !self.added_packages.insert(package_id) {
                continue;
            }

            let Some(entry) = pool.entry(package_id) else {
                continue;
            };

            if let PoolEntry::Alias(alias) = entry {
                if let Some(base_id) = pool.get_alias_base(package_id) {
                    // installing the alias pulls its base in
                    let rule = Rule::new(vec![-package_id, base_id], RuleKind::PackageAlias)
                        .with_source(package_id)
                        .with_target(alias.name());
                    self.rules.add(rule);

                    if alias.is_root_alias() {
                        // and a root alias follows its base
                        let rule =
                            Rule::new(vec![-base_id, package_id], RuleKind::PackageInverseAlias)
                                .with_source(base_id)
                                .with_target(alias.name());
                        self.rules.add(rule);
                    }

                    queue.push_back(base_id);
                }
            }

            self.add_same_name_rules(entry.name());

            for name in entry_names(entry) {
                self.providers_by_name
                    .entry(name)
                    .or_default()
                    .push(package_id);
            }

            for link in entry.requires() {
                if self.options.platform_filter.ignores(link.target()) {
                    continue;
                }

                let constraint = Some(link.constraint());
                let direct = pool.what_provides_direct_only(link.target(), constraint);
                let is_root_required = self.root_required_names.contains(link.target());

                // Replacers and providers only substitute for a name when
                // a direct candidate exists too, or when the root
                // explicitly asked for the name.
                let providers = if !direct.is_empty() || is_root_required {
                    pool.what_provides(link.target(), constraint)
                } else {
                    direct
                };

                if providers.is_empty() {
                    let rule = Rule::new(vec![-package_id], RuleKind::PackageRequires)
                        .with_source(package_id)
                        .with_target(link.target())
                        .with_constraint(link.pretty_constraint());
                    self.rules.add(rule);
                    continue;
                }

                let rule = Rule::requires(package_id, providers.clone())
                    .with_source(package_id)
                    .with_target(link.target())
                    .with_constraint(link.pretty_constraint());
                self.rules.add(rule);

                for id in providers {
                    let platform = pool
                        .entry(id)
                        .map(|e| is_platform_package(e.name()))
                        .unwrap_or(false);
                    if !platform {
                        queue.push_back(id);
                    }
                }
            }

            for link in entry.conflicts() {
                for conflicting in pool.what_provides(link.target(), Some(link.constraint())) {
                    if conflicting == package_id {
                        continue;
                    }
                    let rule = Rule::conflict(package_id, conflicting)
                        .with_source(package_id)
                        .with_target(link.target())
                        .with_constraint(link.pretty_constraint());
                    self.rules.add(rule);
                }
            }
        }
    }

    /// At most one candidate per name. Aliases coexist with their base
    /// and are left out of the group.
    fn add_same_name_rules(&mut self, name: &str) {
        if !self.same_name_added.insert(name.to_string()) {
            return;
        }

        let versions = self.pool.packages_by_name(name);
        let mut group: Vec<PackageId> = Vec::new();
        for id in &versions {
            if let Some(base) = self.pool.get_alias_base(*id) {
                if versions.contains(&base) {
                    continue;
                }
            }
            group.push(*id);
        }

        if group.len() <= 1 {
            return;
        }

        let rule = Rule::same_name(group).with_target(name);
        self.rules.add(rule);
    }

    /// A replacer occupies the replaced name's slot, so it conflicts with
    /// every direct candidate of that name.
    fn add_replace_conflict_rules(&mut self) {
        let added: Vec<PackageId> = self.added_packages.iter().copied().collect();
        for package_id in added {
            let Some(entry) = self.pool.entry(package_id) else {
                continue;
            };
            let replaces = entry.replaces().to_vec();
            for link in replaces {
                for replaced in self.pool.packages_by_name(link.target()) {
                    if replaced == package_id {
                        continue;
                    }
                    let rule = Rule::new(vec![-package_id, -replaced], RuleKind::SameName)
                        .with_source(package_id)
                        .with_target(link.target());
                    self.rules.add(rule);
                }
            }
        }
    }

    /// Two different packages occupying the same provided name exclude
    /// each other.
    fn add_provider_conflict_rules(&mut self) {
        let grouped: Vec<(String, Vec<PackageId>)> = self
            .providers_by_name
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(name, ids)| (name.clone(), ids.clone()))
            .collect();

        for (name, ids) in grouped {
            if self.same_name_added.contains(&name) {
                continue;
            }

            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    let (a, b) = (ids[i], ids[j]);
                    if a == b {
                        continue;
                    }
                    let same_package_name = match (self.pool.entry(a), self.pool.entry(b)) {
                        (Some(ea), Some(eb)) => ea.name() == eb.name(),
                        _ => false,
                    };
                    if same_package_name {
                        continue;
                    }
                    let rule = Rule::new(vec![-a, -b], RuleKind::SameName).with_target(&name);
                    self.rules.add(rule);
                }
            }
        }
    }
}

fn entry_names(entry: &PoolEntry) -> Vec<String> {
    let mut names = vec![entry.name().to_string()];
    for link in entry.replaces().iter().chain(entry.provides().iter()) {
        if !names.iter().any(|n| n == link.target()) {
            names.push(link.target().to_string());
        }
    }
    names
}
