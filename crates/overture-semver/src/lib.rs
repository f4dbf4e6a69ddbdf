//! Semantic versioning library for the overture dependency resolver.
//!
//! Versions normalize to a four-segment numeric tuple plus a stability
//! marker, or to a named branch (`dev-main`). Constraints are a closed
//! enum (any / primitive / conjunction / disjunction) and support both
//! version matching and constraint-against-constraint intersection tests,
//! so a requirement can be checked against a provided range without
//! enumerating versions.

mod constraint;
mod parser;
mod version;

pub use constraint::{Constraint, Op};
pub use parser::{VersionParser, VersionParserError};
pub use version::{Stability, Version};
