//! Behavior-preserving pool shrink.
//!
//! Two reductions run before solving, both provably unable to change the
//! outcome:
//!
//! 1. versions of a name that no constraint anywhere in the request graph
//!    could ever accept are dropped;
//! 2. versions of a name that are indistinguishable to every referencing
//!    constraint and carry identical links collapse into the single
//!    policy-preferred representative.
//!
//! Fixed, locked, root-injected and aliased entries never move, and
//! entries occupying extra names via provide/replace are left alone, so
//! the unoptimized path yields the same decisions.

use std::collections::HashSet;

use indexmap::IndexMap;
use overture_semver::Constraint;

use super::policy::Policy;
use super::pool::{PackageId, Pool, PoolEntry};
use super::request::Request;

pub struct PoolOptimizer<'a> {
    policy: &'a Policy,
}

impl<'a> PoolOptimizer<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        PoolOptimizer { policy }
    }

    pub fn optimize(&self, request: &Request, pool: &Pool) -> Pool {
        let irremovable = self.collect_irremovable(request, pool);
        let require_constraints = self.collect_require_constraints(request, pool);

        let mut to_remove: HashSet<PackageId> = HashSet::new();

        // Pass 1: drop versions no referencing constraint accepts.
        for id in pool.all_package_ids() {
            if irremovable.contains(&id) {
                continue;
            }
            let Some(entry) = pool.entry(id) else { continue };
            let Some(constraints) = require_constraints.get(entry.name()) else {
                // Name pulled through provide/replace marking only; every
                // version stays.
                continue;
            };
            let reachable = constraints
                .iter()
                .any(|c| c.matches_version(entry.version()));
            if !reachable {
                to_remove.insert(id);
            }
        }

        // Pass 2: collapse interchangeable versions.
        for (name, ids) in self.group_by_name(pool) {
            let Some(constraints) = require_constraints.get(&name) else {
                continue;
            };

            // signature: which constraints accept the version + what the
            // version itself demands of others
            let mut groups: IndexMap<String, Vec<PackageId>> = IndexMap::new();
            for id in ids {
                if irremovable.contains(&id) || to_remove.contains(&id) {
                    continue;
                }
                let Some(entry) = pool.entry(id) else { continue };
                if !entry.replaces().is_empty() || !entry.provides().is_empty() {
                    continue;
                }

                let matching: Vec<String> = constraints
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.matches_version(entry.version()))
                    .map(|(i, _)| i.to_string())
                    .collect();
                let links: Vec<String> = entry
                    .requires()
                    .iter()
                    .chain(entry.conflicts().iter())
                    .map(|l| format!("{} {} {}", l.kind(), l.target(), l.pretty_constraint()))
                    .collect();
                let signature = format!("{}|{}", matching.join(","), links.join(";"));
                groups.entry(signature).or_default().push(id);
            }

            for (_, group) in groups {
                if group.len() <= 1 {
                    continue;
                }
                let preferred = self.policy.select_preferred_packages(pool, &group, None);
                for &id in preferred.iter().skip(1) {
                    to_remove.insert(id);
                }
            }
        }

        if !to_remove.is_empty() {
            log::debug!(
                "pool optimizer removed {} of {} candidates",
                to_remove.len(),
                pool.len()
            );
        }
        self.rebuild(pool, &to_remove)
    }

    fn collect_irremovable(&self, request: &Request, pool: &Pool) -> HashSet<PackageId> {
        let mut irremovable = HashSet::new();

        let mut pin = |name: &str, irremovable: &mut HashSet<PackageId>| {
            for id in pool.packages_by_name(name) {
                irremovable.insert(id);
            }
        };

        if let Some(root) = request.root_package() {
            pin(root.name(), &mut irremovable);
        }
        for package in request.fixed_packages() {
            pin(package.name(), &mut irremovable);
        }
        for package in request.locked_packages() {
            pin(package.name(), &mut irremovable);
        }

        // aliases and their bases always travel together
        for id in pool.all_package_ids() {
            if let Some(base) = pool.get_alias_base(id) {
                irremovable.insert(id);
                irremovable.insert(base);
            }
        }

        irremovable
    }

    fn collect_require_constraints(
        &self,
        request: &Request,
        pool: &Pool,
    ) -> IndexMap<String, Vec<Constraint>> {
        let mut constraints: IndexMap<String, Vec<Constraint>> = IndexMap::new();

        let mut push = |name: &str, constraint: &Constraint,
                        constraints: &mut IndexMap<String, Vec<Constraint>>| {
            let entry = constraints.entry(name.to_string()).or_default();
            if !entry.contains(constraint) {
                entry.push(constraint.clone());
            }
        };

        for (name, requirement) in request.all_requires() {
            push(name, &requirement.constraint, &mut constraints);
        }
        for id in pool.all_package_ids() {
            let Some(entry) = pool.entry(id) else { continue };
            for link in entry.requires() {
                push(link.target(), link.constraint(), &mut constraints);
            }
        }

        constraints
    }

    fn group_by_name(&self, pool: &Pool) -> IndexMap<String, Vec<PackageId>> {
        let mut grouped: IndexMap<String, Vec<PackageId>> = IndexMap::new();
        for name in pool.names() {
            grouped.insert(name.to_string(), pool.packages_by_name(name));
        }
        grouped
    }

    fn rebuild(&self, pool: &Pool, to_remove: &HashSet<PackageId>) -> Pool {
        let mut optimized = Pool::with_minimum_stability(pool.minimum_stability());
        for (name, stability) in pool.stability_flags() {
            optimized.add_stability_flag(name, stability);
        }

        let mut id_map: IndexMap<PackageId, PackageId> = IndexMap::new();

        for id in pool.all_package_ids() {
            if to_remove.contains(&id) {
                continue;
            }
            let Some(entry) = pool.entry(id) else { continue };
            if let PoolEntry::Package(package) = entry {
                let new_id = optimized.add_package(package.clone(), pool.repo_index(id));
                if new_id != 0 {
                    id_map.insert(id, new_id);
                }
            }
        }

        for id in pool.all_package_ids() {
            if to_remove.contains(&id) {
                continue;
            }
            let Some(PoolEntry::Alias(alias)) = pool.entry(id) else {
                continue;
            };
            let Some(base) = pool.get_alias_base(id).and_then(|b| id_map.get(&b)) else {
                continue;
            };
            optimized.add_alias(*base, alias.clone());
        }

        optimized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LinkKind, Package};
    use overture_semver::VersionParser;
    use std::sync::Arc;

    fn pkg(name: &str, version: &str) -> Arc<Package> {
        Arc::new(Package::parse(name, version).unwrap())
    }

    fn pkg_req(name: &str, version: &str, dep: &str, c: &str) -> Arc<Package> {
        let mut p = Package::parse(name, version).unwrap();
        p.add_link_str(dep, LinkKind::Require, c).unwrap();
        Arc::new(p)
    }

    fn constraint(s: &str) -> Constraint {
        VersionParser::new().parse_constraints(s).unwrap()
    }

    #[test]
    fn test_unreachable_versions_removed() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg("vendor/b", "3.0.0"), 0);

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let policy = Policy::new();
        let optimized = PoolOptimizer::new(&policy).optimize(&request, &pool);

        // b 3.0 can never satisfy ^1.0
        assert_eq!(optimized.packages_by_name("vendor/b").len(), 1);
        assert_eq!(optimized.packages_by_name("vendor/a").len(), 1);
    }

    #[test]
    fn test_interchangeable_versions_collapse() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg("vendor/b", "1.1.0"), 0);
        pool.add_package(pkg("vendor/b", "1.2.0"), 0);

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let policy = Policy::new();
        let optimized = PoolOptimizer::new(&policy).optimize(&request, &pool);

        // all three satisfy ^1.0 identically; the newest survives
        let remaining = optimized.packages_by_name("vendor/b");
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            optimized.entry(remaining[0]).unwrap().pretty_version(),
            "1.2.0"
        );
    }

    #[test]
    fn test_distinguishable_versions_kept() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg_req("vendor/c", "1.0.0", "vendor/b", ">=1.1"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg("vendor/b", "1.1.0"), 0);

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.require("vendor/c", constraint("*"));

        let policy = Policy::new();
        let optimized = PoolOptimizer::new(&policy).optimize(&request, &pool);

        // 1.0 and 1.1 differ for the >=1.1 constraint; both stay
        assert_eq!(optimized.packages_by_name("vendor/b").len(), 2);
    }

    #[test]
    fn test_locked_packages_kept() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^2.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg("vendor/b", "2.0.0"), 0);

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.lock(pkg("vendor/b", "1.0.0"));

        let policy = Policy::new();
        let optimized = PoolOptimizer::new(&policy).optimize(&request, &pool);

        // b 1.0 misses ^2.0 but is locked, so it stays
        assert_eq!(optimized.packages_by_name("vendor/b").len(), 2);
    }

    #[test]
    fn test_replacers_never_collapsed() {
        let mut r1 = Package::parse("vendor/r", "1.0.0").unwrap();
        r1.add_link_str("vendor/b", LinkKind::Replace, "*").unwrap();
        let mut r2 = Package::parse("vendor/r", "1.1.0").unwrap();
        r2.add_link_str("vendor/b", LinkKind::Replace, "*").unwrap();

        let mut pool = Pool::new();
        pool.add_package(Arc::new(r1), 0);
        pool.add_package(Arc::new(r2), 0);

        let mut request = Request::new();
        request.require("vendor/r", constraint("*"));

        let policy = Policy::new();
        let optimized = PoolOptimizer::new(&policy).optimize(&request, &pool);
        assert_eq!(optimized.packages_by_name("vendor/r").len(), 2);
    }
}
