//! End-to-end resolution scenarios exercising the whole pipeline:
//! repositories -> pool -> rules -> solver -> transaction.

use std::sync::Arc;

use overture_resolver::package::{LinkKind, Package};
use overture_resolver::repository::{
    ArrayRepository, ProviderRecord, Repository, RepositoryError,
};
use overture_resolver::solver::{Policy, PoolBuilder, Solver};
use overture_resolver::{resolve, Operation, RepositorySet, Request, ResolveError, SolverOptions};
use overture_semver::{Constraint, VersionParser};

fn pkg(name: &str, version: &str) -> Package {
    Package::parse(name, version).unwrap()
}

fn constraint(s: &str) -> Constraint {
    VersionParser::new().parse_constraints(s).unwrap()
}

fn require(pkg: &mut Package, target: &str, c: &str) {
    pkg.add_link_str(target, LinkKind::Require, c).unwrap();
}

fn replace(pkg: &mut Package, target: &str, c: &str) {
    pkg.add_link_str(target, LinkKind::Replace, c).unwrap();
}

fn single_repo_set(repo: ArrayRepository) -> RepositorySet {
    let mut set = RepositorySet::new();
    set.add_repository(Arc::new(repo));
    set
}

fn install_names(ops: &[Operation]) -> Vec<String> {
    ops.iter()
        .filter_map(|op| match op {
            Operation::Install(p) => Some(format!("{} {}", p.name(), p.pretty_version())),
            _ => None,
        })
        .collect()
}

/// Scenario 1: newest-preferred selection of a transitive dependency.
#[test]
fn installs_newest_matching_dependency() {
    let mut repo = ArrayRepository::new("packagist");
    let mut a = pkg("A", "1.0");
    require(&mut a, "B", ">= 1.0");
    repo.add_package(a);
    repo.add_package(pkg("B", "1.0"));
    repo.add_package(pkg("B", "1.1"));

    let mut request = Request::new();
    request.require("a", constraint("*"));

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(
        install_names(transaction.operations()),
        vec!["b 1.1", "a 1.0"]
    );
}

/// Scenario 2: a cycle through the root package resolves, and the root
/// itself never becomes an operation.
#[test]
fn root_cycle_installs_dependency_only() {
    let mut root = pkg("A", "1.0");
    require(&mut root, "B", "= 1.0");

    let mut b = pkg("B", "1.0");
    require(&mut b, "A", "= 1.0");

    let mut repo = ArrayRepository::new("packagist");
    repo.add_package(b);

    let mut request = Request::new();
    request.set_root_package(Arc::new(root));

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(install_names(transaction.operations()), vec!["b 1.0"]);
}

/// Scenario 3: a replacer satisfies requirements on the names it
/// replaces; the newest replacer wins and installs before its dependent.
#[test]
fn replacer_chain_selects_newest_replacer() {
    let mut repo = ArrayRepository::new("packagist");

    let mut a = pkg("A", "1.0");
    require(&mut a, "B", ">= 1.0");
    require(&mut a, "C", ">= 1.0");
    repo.add_package(a);

    for version in ["1.0", "1.1"] {
        let mut d = pkg("D", version);
        replace(&mut d, "B", ">= 1.0");
        replace(&mut d, "C", ">= 1.0");
        repo.add_package(d);
    }

    let mut request = Request::new();
    request.require("a", constraint("*"));
    request.require("d", constraint("*"));

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(
        install_names(transaction.operations()),
        vec!["d 1.1", "a 1.0"]
    );
}

/// Scenario 4: an unsatisfiable root requirement produces an explainer
/// report naming the near-miss versions.
#[test]
fn unsatisfiable_requirement_is_explained() {
    let mut repo = ArrayRepository::new("packagist");
    let mut a = pkg("A", "1.0");
    require(&mut a, "B", ">= 2.0");
    repo.add_package(a);
    repo.add_package(pkg("B", "1.0"));

    let repo_set = single_repo_set(repo);
    let mut request = Request::new();
    request.require("a", constraint("*"));

    let options = SolverOptions {
        pool_optimizer: false,
        ..SolverOptions::default()
    };
    let pool = PoolBuilder::new(&options).build(&repo_set, &request).unwrap();
    let mut solver = Solver::new(&pool, Policy::new(), &options);

    let err = solver.solve(&request).unwrap_err();
    let ResolveError::VersionConflict(problems) = err else {
        panic!("expected a version conflict, got {:?}", err);
    };

    let report = problems.pretty(&repo_set, &request, &pool);
    assert!(
        report.contains("A 1.0 requires b >= 2.0"),
        "report was:\n{}",
        report
    );
    assert!(
        report.contains("found B[1.0] but it does not match the constraint"),
        "report was:\n{}",
        report
    );
}

/// Scenario 5: conflict-driven learning must handle asserting a positive
/// literal (forcing a package IN after an earlier exclusion).
#[test]
fn learns_positive_literal_in_diamond_conflict() {
    let mut repo = ArrayRepository::new("packagist");

    let mut a = pkg("A", "1.0");
    require(&mut a, "B", "= 1.0");
    require(&mut a, "C", ">= 1.0");
    require(&mut a, "D", "= 1.0");
    repo.add_package(a);

    let mut b = pkg("B", "1.0");
    require(&mut b, "E", "= 1.0");
    repo.add_package(b);

    let mut c1 = pkg("C", "1.0");
    require(&mut c1, "F", "= 1.0");
    repo.add_package(c1);

    let mut c2 = pkg("C", "2.0");
    require(&mut c2, "F", "= 1.0");
    require(&mut c2, "G", ">= 1.0");
    repo.add_package(c2);

    let mut d = pkg("D", "1.0");
    require(&mut d, "F", ">= 1.0");
    repo.add_package(d);

    let mut e = pkg("E", "1.0");
    require(&mut e, "G", "<= 2.0");
    repo.add_package(e);

    repo.add_package(pkg("F", "1.0"));
    repo.add_package(pkg("F", "2.0"));
    repo.add_package(pkg("G", "1.0"));
    repo.add_package(pkg("G", "2.0"));
    repo.add_package(pkg("G", "3.0"));

    let repo_set = single_repo_set(repo);
    let mut request = Request::new();
    request.require("a", constraint("*"));

    let options = SolverOptions {
        pool_optimizer: false,
        ..SolverOptions::default()
    };
    let pool = PoolBuilder::new(&options).build(&repo_set, &request).unwrap();
    let mut solver = Solver::new(&pool, Policy::new(), &options);

    let transaction = solver.solve(&request).unwrap();

    let mut installed = install_names(transaction.operations());
    installed.sort();
    assert_eq!(
        installed,
        vec!["a 1.0", "b 1.0", "c 2.0", "d 1.0", "e 1.0", "f 1.0", "g 2.0"]
    );

    // requirements precede their dependents
    let order = install_names(transaction.operations());
    let position = |name: &str| order.iter().position(|n| n.starts_with(name)).unwrap();
    assert!(position("f") < position("d"));
    assert!(position("f") < position("c"));
    assert!(position("g") < position("c"));
    assert!(position("g") < position("e"));
    assert!(position("e") < position("b"));
    assert!(position("b") < position("a"));

    assert!(
        solver.stats().learned_positive_literal,
        "search should have asserted a positive learned literal"
    );
    assert!(solver.stats().conflicts > 0);
}

/// Scenario 6: replacers from the required name's vendor win over other
/// vendors' replacers.
#[test]
fn same_vendor_replacer_preferred() {
    let mut repo = ArrayRepository::new("packagist");

    let mut theirs = pkg("vendor-b/replacer", "1.0");
    replace(&mut theirs, "vendor-a/package", ">= 1.0");
    repo.add_package(theirs);

    let mut ours = pkg("vendor-a/replacer", "1.0");
    replace(&mut ours, "vendor-a/package", ">= 1.0");
    repo.add_package(ours);

    let mut request = Request::new();
    request.require("vendor-a/package", constraint("^1.0"));

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(
        install_names(transaction.operations()),
        vec!["vendor-a/replacer 1.0"]
    );
}

/// Determinism: identical inputs give byte-identical operation listings.
#[test]
fn identical_inputs_resolve_identically() {
    let build = || {
        let mut repo = ArrayRepository::new("packagist");
        let mut a = pkg("vendor/a", "1.0");
        require(&mut a, "vendor/b", "^1.0");
        require(&mut a, "vendor/c", "^1.0");
        repo.add_package(a);
        repo.add_package(pkg("vendor/b", "1.0"));
        repo.add_package(pkg("vendor/b", "1.4"));
        repo.add_package(pkg("vendor/c", "1.2"));

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let transaction = resolve(
            &single_repo_set(repo),
            &request,
            &SolverOptions::default(),
        )
        .unwrap();
        transaction.describe()
    };

    assert_eq!(build(), build());
}

/// Fixed packages appear unchanged in the target state and never become
/// operations.
#[test]
fn fixed_package_is_minimal() {
    let mut repo = ArrayRepository::new("packagist");
    let mut a = pkg("vendor/a", "1.0");
    require(&mut a, "php", ">= 8.0");
    repo.add_package(a);

    let mut request = Request::new();
    request.fix(Arc::new(pkg("php", "8.2.0")));
    request.require("vendor/a", constraint("*"));

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    assert_eq!(
        install_names(transaction.operations()),
        vec!["vendor/a 1.0"]
    );
    assert!(transaction
        .operations()
        .iter()
        .all(|op| op.package_name() != "php"));
}

/// Uniqueness: at most one decided package carries each effective name,
/// counting replace contributions.
#[test]
fn one_package_per_effective_name() {
    let mut repo = ArrayRepository::new("packagist");
    repo.add_package(pkg("vendor/lib", "1.0"));
    repo.add_package(pkg("vendor/lib", "1.1"));
    let mut replacer = pkg("vendor/fork", "2.0");
    replace(&mut replacer, "vendor/lib", ">= 1.0");
    repo.add_package(replacer);

    let mut request = Request::new();
    request.require("vendor/lib", constraint("^1.0"));
    request.require("vendor/fork", constraint("*"));

    // fork replaces lib, so requiring both names still yields a single
    // occupant for "vendor/lib"
    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    let installed = install_names(transaction.operations());
    assert_eq!(installed, vec!["vendor/fork 2.0"]);
}

/// Raising a repository's priority can switch decisions to it, never
/// away from it.
#[test]
fn repository_priority_monotonicity() {
    let build = |preferred_first: bool| {
        let mut main = ArrayRepository::new("main");
        main.add_package(pkg("vendor/a", "1.0"));
        let mut mirror = ArrayRepository::new("mirror");
        mirror.add_package(pkg("vendor/a", "1.0"));

        let mut set = RepositorySet::new();
        if preferred_first {
            set.add_repository(Arc::new(mirror));
            set.add_repository(Arc::new(main));
        } else {
            set.add_repository(Arc::new(main));
            set.add_repository(Arc::new(mirror));
        }

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        resolve(&set, &request, &SolverOptions::default()).unwrap()
    };

    // both orders resolve to the same name/version; the winning copy is
    // always the first repository's
    assert_eq!(
        install_names(build(false).operations()),
        install_names(build(true).operations())
    );
}

/// Locked packages uninstall when nothing requires them anymore.
#[test]
fn unrequired_locked_package_is_removed() {
    let mut repo = ArrayRepository::new("packagist");
    repo.add_package(pkg("vendor/keep", "1.0"));
    repo.add_package(pkg("vendor/orphan", "1.0"));

    let mut request = Request::new();
    request.require("vendor/keep", constraint("*"));
    request.lock(Arc::new(pkg("vendor/orphan", "1.0")));
    request.allow_update("vendor/orphan");

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    let uninstalled: Vec<_> = transaction.uninstalls().map(|p| p.name()).collect();
    assert_eq!(uninstalled, vec!["vendor/orphan"]);
    assert_eq!(
        install_names(transaction.operations()),
        vec!["vendor/keep 1.0"]
    );
}

/// A locked package updates in place when the requirement moves on.
#[test]
fn locked_package_updates_to_matching_version() {
    let mut repo = ArrayRepository::new("packagist");
    let mut a = pkg("vendor/a", "2.0");
    require(&mut a, "vendor/b", "^2.0");
    repo.add_package(a);
    repo.add_package(pkg("vendor/b", "1.0"));
    repo.add_package(pkg("vendor/b", "2.1"));

    let mut request = Request::new();
    request.require("vendor/a", constraint("^2.0"));
    request.lock(Arc::new(pkg("vendor/b", "1.0")));
    request.allow_update("vendor/b");

    let transaction = resolve(
        &single_repo_set(repo),
        &request,
        &SolverOptions::default(),
    )
    .unwrap();

    let updates: Vec<_> = transaction
        .updates()
        .map(|(from, to)| format!("{} -> {}", from.pretty_version(), to.pretty_version()))
        .collect();
    assert_eq!(updates, vec!["1.0 -> 2.1"]);
}

/// An upstream repository failure aborts pool construction unchanged.
#[test]
fn repository_failure_aborts_pool_build() {
    struct BrokenRepository;

    impl Repository for BrokenRepository {
        fn repo_name(&self) -> &str {
            "broken"
        }

        fn find_packages(
            &self,
            name: &str,
            _constraint: Option<&Constraint>,
        ) -> Result<Vec<Arc<Package>>, RepositoryError> {
            Err(RepositoryError::MetadataUnavailable {
                repo: "broken".to_string(),
                name: name.to_string(),
                message: "metadata endpoint returned garbage".to_string(),
            })
        }

        fn get_packages(&self) -> Result<Vec<Arc<Package>>, RepositoryError> {
            Ok(Vec::new())
        }

        fn get_providers(&self, _name: &str) -> Result<Vec<ProviderRecord>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    let mut set = RepositorySet::new();
    set.add_repository(Arc::new(BrokenRepository));

    let mut request = Request::new();
    request.require("vendor/a", constraint("*"));

    let err = resolve(&set, &request, &SolverOptions::default()).unwrap_err();
    assert!(matches!(err, ResolveError::PoolBuildAborted(_)));
}

/// The pool optimizer must not change what gets decided.
#[test]
fn pool_optimizer_preserves_outcome() {
    let build = |optimize: bool| {
        let mut repo = ArrayRepository::new("packagist");
        let mut a = pkg("vendor/a", "1.0");
        require(&mut a, "vendor/b", "^1.0");
        repo.add_package(a);
        for version in ["1.0", "1.1", "1.2", "2.0"] {
            repo.add_package(pkg("vendor/b", version));
        }

        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let options = SolverOptions {
            pool_optimizer: optimize,
            ..SolverOptions::default()
        };
        resolve(&single_repo_set(repo), &request, &options)
            .unwrap()
            .describe()
    };

    assert_eq!(build(true), build(false));
}
