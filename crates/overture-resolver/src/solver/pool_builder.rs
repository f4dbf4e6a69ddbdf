//! Demand-driven pool construction.
//!
//! Instead of indexing whole repositories, the builder expands a
//! breadth-first closure from the root requirements: every wave loads the
//! candidates for the names marked so far, then marks the names those
//! candidates require, replace or provide. Constraints seen for a name
//! accumulate as a union, so later waves can widen an already-loaded name.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use overture_semver::Constraint;

use super::pool::Pool;
use super::request::Request;
use crate::error::ResolveError;
use crate::package::{AliasPackage, Package};
use crate::platform::PlatformRequirementFilter;
use crate::repository::RepositorySet;
use crate::solver::SolverOptions;

pub struct PoolBuilder<'a> {
    options: &'a SolverOptions,
    packages_to_load: IndexMap<String, Constraint>,
    loaded_names: IndexMap<String, Constraint>,
    /// Names whose root constraint is already the widest we will load.
    max_extended: HashSet<String>,
    loaded: Vec<(usize, Arc<Package>)>,
    seen: HashSet<(String, String, usize)>,
}

impl<'a> PoolBuilder<'a> {
    pub fn new(options: &'a SolverOptions) -> Self {
        PoolBuilder {
            options,
            packages_to_load: IndexMap::new(),
            loaded_names: IndexMap::new(),
            max_extended: HashSet::new(),
            loaded: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn platform_filter(&self) -> &PlatformRequirementFilter {
        &self.options.platform_filter
    }

    pub fn build(
        &mut self,
        repo_set: &RepositorySet,
        request: &Request,
    ) -> Result<Pool, ResolveError> {
        self.packages_to_load.clear();
        self.loaded_names.clear();
        self.max_extended.clear();
        self.loaded.clear();
        self.seen.clear();

        // Injected packages: the root anchor, request-fixed packages and
        // the locked packages the update policy keeps pinned. Their names
        // are considered loaded at their exact version so the closure
        // does not widen them.
        let mut injected: Vec<Arc<Package>> = Vec::new();
        if let Some(root) = request.root_package() {
            injected.push(root.clone());
        }
        injected.extend(request.fixed_packages().iter().cloned());

        let pinned_locked = request.locked_as_fixed(self.options.update_policy);
        for locked in &pinned_locked {
            self.loaded_names.insert(
                locked.name().to_string(),
                Constraint::exact(locked.version().clone()),
            );
        }
        for package in &injected {
            self.loaded_names.insert(
                package.name().to_string(),
                Constraint::exact(package.version().clone()),
            );
        }

        // Root requirements seed the closure at their full width.
        for (name, requirement) in request.all_requires() {
            if self.platform_filter().ignores(name) {
                continue;
            }
            if self.loaded_names.contains_key(name) {
                continue;
            }
            self.packages_to_load
                .insert(name.to_string(), requirement.constraint.clone());
            self.max_extended.insert(name.to_string());
        }

        // Requirements of injected packages expand like any other edge.
        for package in injected.iter().chain(pinned_locked.iter()) {
            self.mark_requirements(package);
        }
        // Non-pinned locked packages still contribute their names to the
        // closure so updated versions can be found.
        for locked in request.locked_packages() {
            if self.loaded_names.contains_key(locked.name()) {
                continue;
            }
            self.mark_name(locked.name(), Constraint::Any);
        }

        while !self.packages_to_load.is_empty() {
            self.load_wave(repo_set)?;
        }

        log::debug!("pool builder loaded {} candidate packages", self.loaded.len());

        // Assemble the pool: repository candidates first, injected and
        // locked entries after, root aliases last.
        let mut pool = Pool::with_minimum_stability(self.options.minimum_stability);
        for (name, stability) in &self.options.stability_flags {
            pool.add_stability_flag(name, *stability);
        }

        let injected_repo = repo_set.len();
        for (repo_index, package) in &self.loaded {
            pool.add_package(package.clone(), *repo_index);
        }
        for package in injected.iter().chain(request.locked_packages().iter()) {
            if !self.in_pool(&pool, package) {
                // Injected entries bypass the stability filter via a
                // per-name flag; a pinned dev package must stay pinned.
                if !package.stability().is_at_least(self.options.minimum_stability) {
                    pool.add_stability_flag(package.name(), package.stability());
                }
                pool.add_package(package.clone(), injected_repo);
            }
        }

        for alias in request.aliases() {
            for id in pool.packages_by_name(&alias.name) {
                let Some(entry) = pool.entry(id) else { continue };
                if entry.is_alias() || entry.version() != &alias.version {
                    continue;
                }
                let Some(base) = entry.as_package().cloned() else {
                    continue;
                };
                let mut aliased = AliasPackage::new(
                    base,
                    alias.alias_version.clone(),
                    alias.alias_version.to_string(),
                );
                aliased.set_root_alias(true);
                pool.add_alias(id, Arc::new(aliased));
                break;
            }
        }

        Ok(pool)
    }

    fn in_pool(&self, pool: &Pool, package: &Arc<Package>) -> bool {
        pool.packages_by_name(package.name())
            .into_iter()
            .any(|id| {
                pool.entry(id)
                    .map(|e| e.version() == package.version())
                    .unwrap_or(false)
            })
    }

    fn load_wave(&mut self, repo_set: &RepositorySet) -> Result<(), ResolveError> {
        let wave: Vec<(String, Constraint)> = self.packages_to_load.drain(..).collect();

        for (name, constraint) in &wave {
            self.loaded_names.insert(name.clone(), constraint.clone());
        }

        for (name, constraint) in wave {
            for (repo_index, package) in repo_set.find_packages(&name, Some(&constraint))? {
                self.load_package(repo_index, package);
            }
            // Replacers and providers of this name are candidates too,
            // whenever their provided range intersects what is asked.
            for (repo_index, record) in repo_set.find_providers(&name)? {
                if constraint.matches(&record.constraint) {
                    self.load_package(repo_index, record.provider);
                }
            }
        }

        Ok(())
    }

    fn load_package(&mut self, repo_index: usize, package: Arc<Package>) {
        let effective_minimum = self
            .options
            .stability_flags
            .get(package.name())
            .copied()
            .unwrap_or(self.options.minimum_stability);
        if !package.stability().is_at_least(effective_minimum) {
            return;
        }

        let key = (
            package.name().to_string(),
            package.version().to_string(),
            repo_index,
        );
        if !self.seen.insert(key) {
            return;
        }

        self.mark_requirements(&package);
        self.loaded.push((repo_index, package));
    }

    fn mark_requirements(&mut self, package: &Arc<Package>) {
        for link in package.requires() {
            if self.platform_filter().ignores(link.target()) {
                continue;
            }
            self.mark_name(link.target(), link.constraint().clone());
        }
        // Names a candidate occupies via replace/provide need their own
        // concrete candidates in the pool for same-name reasoning.
        for link in package.replaces().iter().chain(package.provides().iter()) {
            self.mark_name(link.target(), link.constraint().clone());
        }
    }

    fn mark_name(&mut self, name: &str, constraint: Constraint) {
        // Root requirements were loaded at maximum width already.
        if self.max_extended.contains(name) {
            return;
        }

        if let Some(existing) = self.packages_to_load.get(name) {
            if constraint_covers(existing, &constraint) {
                return;
            }
            let widened = Constraint::or(vec![existing.clone(), constraint]);
            self.packages_to_load.insert(name.to_string(), widened);
            return;
        }

        match self.loaded_names.get(name) {
            None => {
                self.packages_to_load.insert(name.to_string(), constraint);
            }
            Some(loaded) if constraint_covers(loaded, &constraint) => {}
            Some(loaded) => {
                // Widen an already-loaded name; the seen-set keeps the
                // previously loaded candidates from duplicating.
                let widened = Constraint::or(vec![loaded.clone(), constraint]);
                self.loaded_names.shift_remove(name);
                self.packages_to_load.insert(name.to_string(), widened);
            }
        }
    }
}

/// Structural containment check used to keep the widening loop finite:
/// a constraint covers an addition when they are equal, when it is the
/// universal constraint, or when it is a union already listing it.
fn constraint_covers(existing: &Constraint, addition: &Constraint) -> bool {
    if existing.is_any() || existing == addition {
        return true;
    }
    match existing {
        Constraint::Or(members) => members.iter().any(|m| m == addition),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::LinkKind;
    use crate::repository::ArrayRepository;
    use crate::solver::request::Request;
    use overture_semver::VersionParser;

    fn pkg(name: &str, version: &str) -> Package {
        Package::parse(name, version).unwrap()
    }

    fn pkg_req(name: &str, version: &str, dep: &str, constraint: &str) -> Package {
        let mut p = pkg(name, version);
        p.add_link_str(dep, LinkKind::Require, constraint).unwrap();
        p
    }

    fn constraint(s: &str) -> Constraint {
        VersionParser::new().parse_constraints(s).unwrap()
    }

    fn repo_set(repo: ArrayRepository) -> RepositorySet {
        let mut set = RepositorySet::new();
        set.add_repository(Arc::new(repo));
        set
    }

    #[test]
    fn test_transitive_closure() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"));
        repo.add_package(pkg("vendor/b", "1.0.0"));
        repo.add_package(pkg("vendor/b", "2.0.0"));
        repo.add_package(pkg("vendor/unrelated", "1.0.0"));

        let options = SolverOptions::default();
        let mut request = Request::new();
        request.require("vendor/a", constraint("^1.0"));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        // a 1.0, b 1.0 pulled; b 2.0 outside ^1.0; unrelated never marked
        assert_eq!(pool.packages_by_name("vendor/a").len(), 1);
        assert_eq!(pool.packages_by_name("vendor/b").len(), 1);
        assert!(pool.packages_by_name("vendor/unrelated").is_empty());
    }

    #[test]
    fn test_constraint_union_widens() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(pkg_req("vendor/a", "1.0.0", "vendor/c", "^1.0"));
        repo.add_package(pkg_req("vendor/b", "1.0.0", "vendor/c", "^2.0"));
        repo.add_package(pkg("vendor/c", "1.0.0"));
        repo.add_package(pkg("vendor/c", "2.0.0"));

        let options = SolverOptions::default();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.require("vendor/b", constraint("*"));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        assert_eq!(pool.packages_by_name("vendor/c").len(), 2);
    }

    #[test]
    fn test_replacers_pulled_for_required_name() {
        let mut replacer = pkg("other/replacer", "1.0.0");
        replacer
            .add_link_str("vendor/needed", LinkKind::Replace, ">=1.0")
            .unwrap();
        let mut repo = ArrayRepository::new("test");
        repo.add_package(replacer);

        let options = SolverOptions::default();
        let mut request = Request::new();
        request.require("vendor/needed", constraint("^1.0"));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        assert_eq!(pool.packages_by_name("other/replacer").len(), 1);
        assert_eq!(pool.what_provides("vendor/needed", Some(&constraint("^1.0"))).len(), 1);
    }

    #[test]
    fn test_platform_filter_skips_requirement() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(pkg_req("vendor/a", "1.0.0", "ext-json", "*"));

        let mut options = SolverOptions::default();
        options.platform_filter = PlatformRequirementFilter::ignore_all();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        assert!(pool.packages_by_name("ext-json").is_empty());
        assert_eq!(pool.packages_by_name("vendor/a").len(), 1);
    }

    #[test]
    fn test_fixed_package_injected() {
        let repo = ArrayRepository::new("test");
        let options = SolverOptions::default();
        let mut request = Request::new();
        request.fix(Arc::new(pkg("php", "8.2.0")));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        assert_eq!(pool.packages_by_name("php").len(), 1);
    }

    #[test]
    fn test_root_alias_materialized() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(pkg("vendor/a", "1.0.0"));

        let options = SolverOptions::default();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.alias(
            "vendor/a",
            VersionParser::new().normalize("1.0.0").unwrap(),
            VersionParser::new().normalize("1.5.0").unwrap(),
        );

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        let ids = pool.packages_by_name("vendor/a");
        assert_eq!(ids.len(), 2);
        let alias_id = ids[1];
        assert!(pool.is_alias(alias_id));
        assert!(pool.is_root_package_alias(alias_id));
    }

    #[test]
    fn test_cyclic_requirements_terminate() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"));
        repo.add_package(pkg_req("vendor/b", "1.0.0", "vendor/a", "^1.0"));

        let options = SolverOptions::default();
        let mut request = Request::new();
        request.require("vendor/a", constraint("^1.0"));

        let pool = PoolBuilder::new(&options)
            .build(&repo_set(repo), &request)
            .unwrap();

        assert_eq!(pool.len(), 2);
    }
}
