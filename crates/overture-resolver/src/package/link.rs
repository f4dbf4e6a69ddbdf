use std::fmt;

use overture_semver::Constraint;

/// The relationship a [`Link`] expresses between two package names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Require,
    DevRequire,
    Conflict,
    Replace,
    Provide,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Require => "requires",
            LinkKind::DevRequire => "requires (for development)",
            LinkKind::Conflict => "conflicts with",
            LinkKind::Replace => "replaces",
            LinkKind::Provide => "provides",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge from a package to a target name under a constraint.
///
/// Links never reference packages directly; the target is resolved against
/// the pool at rule-generation time, so cyclic graphs need no ownership
/// tricks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    target: String,
    constraint: Constraint,
    pretty_constraint: String,
    kind: LinkKind,
}

impl Link {
    pub fn new(
        target: impl AsRef<str>,
        kind: LinkKind,
        constraint: Constraint,
        pretty_constraint: impl Into<String>,
    ) -> Self {
        Link {
            target: target.as_ref().to_lowercase(),
            constraint,
            pretty_constraint: pretty_constraint.into(),
            kind,
        }
    }

    /// Lowercased target package name.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// The constraint as the user wrote it, kept for diagnostics.
    pub fn pretty_constraint(&self) -> &str {
        &self.pretty_constraint
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Copy of this link with a different constraint, keeping target/kind.
    pub fn with_constraint(&self, constraint: Constraint, pretty: impl Into<String>) -> Self {
        Link {
            target: self.target.clone(),
            constraint,
            pretty_constraint: pretty.into(),
            kind: self.kind,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.target, self.pretty_constraint)
    }
}
