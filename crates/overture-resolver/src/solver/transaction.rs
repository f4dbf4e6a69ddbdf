use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::decisions::Decisions;
use super::pool::{Pool, PoolEntry};
use super::request::Request;
use crate::package::{AliasPackage, Package};

/// One step of applying a solve result.
#[derive(Debug, Clone)]
pub enum Operation {
    Install(Arc<Package>),
    Update {
        from: Arc<Package>,
        to: Arc<Package>,
    },
    Uninstall(Arc<Package>),
    MarkAliasInstalled(Arc<AliasPackage>),
    MarkAliasUninstalled(Arc<AliasPackage>),
}

impl Operation {
    /// The name the operation acts on.
    pub fn package_name(&self) -> &str {
        match self {
            Operation::Install(p) | Operation::Uninstall(p) => p.name(),
            Operation::Update { to, .. } => to.name(),
            Operation::MarkAliasInstalled(a) | Operation::MarkAliasUninstalled(a) => a.name(),
        }
    }

    /// Compact form used by diagnostics and determinism checks.
    pub fn describe(&self) -> String {
        match self {
            Operation::Install(p) => format!("install {}", p.pretty_string()),
            Operation::Update { from, to } => format!(
                "update {} => {}",
                from.pretty_string(),
                to.pretty_string()
            ),
            Operation::Uninstall(p) => format!("uninstall {}", p.pretty_string()),
            Operation::MarkAliasInstalled(a) => {
                format!("mark alias installed {}", a.pretty_string())
            }
            Operation::MarkAliasUninstalled(a) => {
                format!("mark alias uninstalled {}", a.pretty_string())
            }
        }
    }
}

/// The ordered operation list a successful solve produces.
///
/// Removals come first, in reverse dependency order of the prior state;
/// installs and updates follow in dependency order of the target state,
/// so a package's requirements always precede it. Alias markers sit next
/// to their base package's operation. Cycles through the root package do
/// not constrain the order (the root itself is never operated on).
#[derive(Debug, Default)]
pub struct Transaction {
    operations: Vec<Operation>,
}

impl Transaction {
    /// Diff the solver's decisions against the prior (locked) state.
    pub fn from_decisions(pool: &Pool, decisions: &Decisions, request: &Request) -> Self {
        let mut decided_packages: Vec<Arc<Package>> = Vec::new();
        let mut decided_aliases: Vec<Arc<AliasPackage>> = Vec::new();

        for id in decisions.installed_packages() {
            match pool.entry(id) {
                Some(PoolEntry::Package(package)) => decided_packages.push(package.clone()),
                Some(PoolEntry::Alias(alias)) => decided_aliases.push(alias.clone()),
                None => {}
            }
        }

        Self::build(
            request.locked_packages(),
            &[],
            &decided_packages,
            &decided_aliases,
            request,
        )
    }

    /// Assemble operations from explicit prior/target sets.
    pub fn build(
        prior_packages: &[Arc<Package>],
        prior_aliases: &[Arc<AliasPackage>],
        decided_packages: &[Arc<Package>],
        decided_aliases: &[Arc<AliasPackage>],
        request: &Request,
    ) -> Self {
        let root_name = request.root_name().map(|n| n.to_string());
        let skip = |name: &str| -> bool {
            root_name.as_deref() == Some(name) || request.is_fixed(name)
        };

        let decided_by_name: HashMap<&str, &Arc<Package>> = decided_packages
            .iter()
            .map(|p| (p.name(), p))
            .collect();
        let prior_by_name: HashMap<&str, &Arc<Package>> =
            prior_packages.iter().map(|p| (p.name(), p)).collect();

        let mut operations = Vec::new();

        // Removals first, in reverse topological order of the prior
        // state.
        let removed: Vec<&Arc<Package>> = prior_packages
            .iter()
            .filter(|p| !decided_by_name.contains_key(p.name()) && !skip(p.name()))
            .collect();
        let removal_order = {
            let prior_refs: Vec<&Arc<Package>> = prior_packages.iter().collect();
            let mut order = topological(&prior_refs, root_name.as_deref());
            order.reverse();
            order
        };
        for name in removal_order {
            let Some(package) = removed.iter().find(|p| p.name() == name) else {
                continue;
            };
            for alias in prior_aliases.iter().filter(|a| a.name() == name) {
                operations.push(Operation::MarkAliasUninstalled(alias.clone()));
            }
            operations.push(Operation::Uninstall((*package).clone()));
        }

        // Installs and updates in target dependency order.
        let target_refs: Vec<&Arc<Package>> = decided_packages.iter().collect();
        let install_order = topological(&target_refs, root_name.as_deref());
        for name in install_order {
            if skip(&name) {
                continue;
            }
            let Some(&package) = decided_by_name.get(name.as_str()) else {
                continue;
            };

            match prior_by_name.get(name.as_str()) {
                Some(&prior) if prior.version() == package.version() => {
                    // unchanged; alias markers may still be due
                }
                Some(&prior) => operations.push(Operation::Update {
                    from: prior.clone(),
                    to: package.clone(),
                }),
                None => operations.push(Operation::Install(package.clone())),
            }

            for alias in decided_aliases.iter().filter(|a| a.name() == name) {
                operations.push(Operation::MarkAliasInstalled(alias.clone()));
            }
        }

        // Aliases whose base was not part of the target set (pinned or
        // root) still get their marker.
        let handled: HashSet<&str> = decided_by_name
            .keys()
            .copied()
            .filter(|name| !skip(name))
            .collect();
        for alias in decided_aliases {
            if !handled.contains(alias.name()) {
                operations.push(Operation::MarkAliasInstalled(alias.clone()));
            }
        }

        Transaction { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn installs(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Install(p) => Some(p),
            _ => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = (&Arc<Package>, &Arc<Package>)> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Update { from, to } => Some((from, to)),
            _ => None,
        })
    }

    pub fn uninstalls(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Uninstall(p) => Some(p),
            _ => None,
        })
    }

    /// Stable textual rendering, one operation per line.
    pub fn describe(&self) -> String {
        self.operations
            .iter()
            .map(|op| op.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Dependency-ordered names of a package set: requirements come before
/// their dependents. Ties and independent groups resolve by name. Edges
/// out of the root package are skipped, which is also what breaks
/// root-level cycles.
fn topological(packages: &[&Arc<Package>], root_name: Option<&str>) -> Vec<String> {
    let by_name: HashMap<&str, &Arc<Package>> =
        packages.iter().map(|p| (p.name(), *p)).collect();

    // A requirement on a replaced or provided name is an edge to the
    // package occupying that name.
    let mut by_provided: HashMap<String, &str> = HashMap::new();
    for package in packages {
        for link in package.replaces().iter().chain(package.provides().iter()) {
            by_provided
                .entry(link.target().to_string())
                .or_insert(package.name());
        }
    }

    let mut names: Vec<&str> = by_name.keys().copied().collect();
    names.sort_unstable();

    let mut order: Vec<String> = Vec::with_capacity(names.len());
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();

    for name in &names {
        visit(
            name,
            &by_name,
            &by_provided,
            root_name,
            &mut visited,
            &mut in_progress,
            &mut order,
        );
    }

    order
}

fn visit<'a>(
    name: &'a str,
    by_name: &HashMap<&'a str, &'a Arc<Package>>,
    by_provided: &HashMap<String, &'a str>,
    root_name: Option<&str>,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if visited.contains(name) || in_progress.contains(name) {
        return;
    }
    let Some(package) = by_name.get(name) else {
        return;
    };

    in_progress.insert(name);

    // The root package contributes no ordering edges.
    if root_name != Some(name) {
        let mut targets: Vec<&str> = package
            .requires()
            .iter()
            .filter_map(|link| {
                by_name
                    .get_key_value(link.target())
                    .map(|(k, _)| *k)
                    .or_else(|| by_provided.get(link.target()).copied())
            })
            .collect();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            visit(
                target,
                by_name,
                by_provided,
                root_name,
                visited,
                in_progress,
                order,
            );
        }
    }

    in_progress.remove(name);
    visited.insert(name);
    order.push(name.to_string());
}
