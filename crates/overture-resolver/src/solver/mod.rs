//! SAT-based dependency resolution.
//!
//! The pipeline: a [`PoolBuilder`] expands the transitive candidate
//! closure for a [`Request`] into a [`Pool`]; the [`RuleGenerator`] turns
//! pool and request into a [`RuleSet`] of CNF clauses; the [`Solver`]
//! runs CDCL search over those clauses with a [`Policy`] ranking the
//! candidates at every branch point; the surviving decisions are diffed
//! against the prior state into a [`Transaction`]. When the clauses are
//! unsatisfiable, the reason chain is minimized into a [`ProblemSet`].

mod decisions;
mod policy;
mod pool;
mod pool_builder;
mod pool_optimizer;
mod problem;
mod request;
mod rule;
mod rule_generator;
mod rule_set;
mod solver;
mod transaction;
mod watch_graph;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use indexmap::IndexMap;
use overture_semver::Stability;

use crate::platform::PlatformRequirementFilter;

pub use decisions::Decisions;
pub use policy::Policy;
pub use pool::{PackageId, Pool, PoolEntry};
pub use pool_builder::PoolBuilder;
pub use pool_optimizer::PoolOptimizer;
pub use problem::{Problem, ProblemSet};
pub use request::{Request, Requirement, RootAlias, UpdatePolicy};
pub use rule::{Literal, Rule, RuleKind};
pub use rule_generator::RuleGenerator;
pub use rule_set::{RuleSet, RuleSetStats};
pub use solver::{Solver, SolverStats};
pub use transaction::{Operation, Transaction};
pub use watch_graph::{PropagateResult, Propagator, WatchGraph};

/// Per-invocation configuration, threaded through the whole engine.
/// There is no other tuning surface: unknown options cannot exist.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Stable versions beat unstable ones of the same name.
    pub prefer_stable: bool,
    /// Oldest acceptable versions win instead of newest.
    pub prefer_lowest: bool,
    /// Which locked packages stay pinned.
    pub update_policy: UpdatePolicy,
    /// Platform requirements to drop before rule generation.
    pub platform_filter: PlatformRequirementFilter,
    /// Run the behavior-preserving pool shrink before solving.
    pub pool_optimizer: bool,
    /// Cap on retained learned clauses; 0 disables eviction.
    pub max_learned_rules: usize,
    /// Lowest stability admitted into the pool.
    pub minimum_stability: Stability,
    /// Per-name stability overrides.
    pub stability_flags: IndexMap<String, Stability>,
    /// Cooperative cancellation probe, checked at the top of the CDCL
    /// loop.
    pub abort: Option<Arc<AtomicBool>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            prefer_stable: false,
            prefer_lowest: false,
            update_policy: UpdatePolicy::default(),
            platform_filter: PlatformRequirementFilter::default(),
            pool_optimizer: true,
            max_learned_rules: 4096,
            minimum_stability: Stability::Stable,
            stability_flags: IndexMap::new(),
            abort: None,
        }
    }
}
