use thiserror::Error;

use crate::repository::RepositoryError;
use crate::solver::ProblemSet;

/// Everything that can go wrong during one solve.
///
/// The engine performs no local recovery: any error short-circuits the
/// solve and carries enough context for the caller to present it.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A root requirement has zero candidates anywhere.
    #[error("requirement not found: nothing provides {name} {constraint}")]
    RequirementNotFound { name: String, constraint: String },

    /// The rule set is unsatisfiable; carries the conflict chain.
    #[error("version conflict: {0}")]
    VersionConflict(ProblemSet),

    /// A requirement on a platform package cannot be met.
    #[error("platform requirement failed: {name} {reason}")]
    PlatformRequirementFailure { name: String, reason: String },

    /// A fixed package contradicts another hard rule.
    #[error("fixed package {name} conflicts with another requirement")]
    FixedConflict { name: String },

    /// An upstream repository failed while the pool was being built.
    #[error("pool construction aborted")]
    PoolBuildAborted(#[from] RepositoryError),

    /// The cooperative abort probe fired.
    #[error("solve aborted")]
    Aborted,
}
