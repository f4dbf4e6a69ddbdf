//! SAT-based dependency resolution engine for Composer-style package
//! graphs.
//!
//! Given a [`Request`] (root requirements, pinned packages, the locked
//! prior state) and a [`RepositorySet`], [`resolve`] decides which exact
//! package versions to install, update or remove:
//!
//! 1. [`solver::PoolBuilder`] expands the constraint-narrowed transitive
//!    closure of candidates, including names contributed by `provide`
//!    and `replace` links, into a [`solver::Pool`];
//! 2. [`solver::RuleGenerator`] turns pool and request into CNF rules;
//! 3. [`solver::Solver`] runs CDCL search (unit propagation, 1-UIP
//!    clause learning, backjumping) with a [`solver::Policy`] ranking
//!    candidates at branch points;
//! 4. the decisions are diffed against the prior state into an ordered
//!    [`Transaction`].
//!
//! On unsatisfiable input, the offending rule chain is minimized into a
//! [`solver::ProblemSet`] carried by [`ResolveError::VersionConflict`].
//!
//! The engine is single-threaded and pure with respect to its inputs:
//! identical request, repository snapshot and options produce
//! byte-identical operation sequences.

pub mod error;
pub mod package;
pub mod platform;
pub mod repository;
pub mod solver;

pub use error::ResolveError;
pub use platform::PlatformRequirementFilter;
pub use repository::{RepositorySet, Repository};
pub use solver::{
    Operation, Policy, Request, Solver, SolverOptions, Transaction, UpdatePolicy,
};

use solver::PoolBuilder;

/// Resolve a request against a repository set: build the pool, generate
/// rules, run the solver, and diff the result into a transaction.
pub fn resolve(
    repo_set: &RepositorySet,
    request: &Request,
    options: &SolverOptions,
) -> Result<Transaction, ResolveError> {
    check_platform_requirements(repo_set, request, options)?;

    let pool = PoolBuilder::new(options).build(repo_set, request)?;
    log::debug!("resolving with a pool of {} candidates", pool.len());

    let mut policy = Policy::new()
        .prefer_stable(options.prefer_stable)
        .prefer_lowest(options.prefer_lowest);
    if !request.locked_packages().is_empty() {
        policy = policy.prefer_locked(
            request
                .locked_packages()
                .iter()
                .map(|p| (p.name().to_string(), p.version().clone())),
        );
    }

    let mut solver = Solver::new(&pool, policy, options);
    solver.solve(request)
}

/// Root requirements on platform packages fail early, with a diagnosis
/// the generic solver text cannot give: the platform probe knows whether
/// a capability is absent, disabled, or present at the wrong version.
fn check_platform_requirements(
    repo_set: &RepositorySet,
    request: &Request,
    options: &SolverOptions,
) -> Result<(), ResolveError> {
    let Some(platform) = repo_set.platform_repository() else {
        return Ok(());
    };

    for (name, requirement) in request.all_requires() {
        if !platform::is_platform_package(name) || options.platform_filter.ignores(name) {
            continue;
        }

        if platform.is_disabled(name) {
            return Err(ResolveError::PlatformRequirementFailure {
                name: name.to_string(),
                reason: "is disabled on this platform".to_string(),
            });
        }

        let matching = platform.find_packages(name, Some(&requirement.constraint))?;
        if !matching.is_empty() {
            continue;
        }

        let present = platform.find_packages(name, None)?;
        let reason = match present.first() {
            Some(found) => format!(
                "is present at version {} but the requirement asks for {}",
                found.pretty_version(),
                requirement.pretty_constraint
            ),
            None => "is missing from your platform".to_string(),
        };
        return Err(ResolveError::PlatformRequirementFailure {
            name: name.to_string(),
            reason,
        });
    }

    Ok(())
}
