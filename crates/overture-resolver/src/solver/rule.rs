use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::pool::PackageId;

/// A signed package id: positive means "install", negative means "do not
/// install".
pub type Literal = i32;

/// Why a rule exists. The kind drives solving priority and explanation
/// text; it never changes a rule's logical meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// A root requirement: at least one candidate must be installed.
    RootRequire,
    /// A request-fixed package asserted true (or its rivals false).
    Fixed,
    /// A locked package pinned by the update policy.
    InstalledPackage,
    /// If the source is installed, one of the targets must be.
    PackageRequires,
    /// Source and target cannot both be installed.
    PackageConflict,
    /// At most one candidate per effective name.
    SameName,
    /// An alias requires its base package.
    PackageAlias,
    /// A root alias is pulled in whenever its base is installed.
    PackageInverseAlias,
    /// Derived by conflict analysis.
    Learned,
}

impl RuleKind {
    /// Solving priority: lower values are visited first when picking the
    /// next unresolved requirement.
    pub fn priority(&self) -> u8 {
        match self {
            RuleKind::Fixed => 0,
            RuleKind::InstalledPackage => 1,
            RuleKind::RootRequire => 2,
            RuleKind::PackageRequires => 3,
            RuleKind::PackageAlias | RuleKind::PackageInverseAlias => 4,
            RuleKind::PackageConflict => 5,
            RuleKind::SameName => 6,
            RuleKind::Learned => 7,
        }
    }
}

/// A disjunction of literals that must hold in any valid assignment.
///
/// The reason fields (`source`, `target`, `pretty_constraint`) are carried
/// for the problem explainer only.
#[derive(Debug, Clone)]
pub struct Rule {
    id: u32,
    literals: Vec<Literal>,
    kind: RuleKind,
    enabled: bool,
    source: Option<PackageId>,
    target: Option<String>,
    pretty_constraint: Option<String>,
}

impl Rule {
    pub fn new(literals: Vec<Literal>, kind: RuleKind) -> Self {
        Rule {
            id: 0,
            literals,
            kind,
            enabled: true,
            source: None,
            target: None,
            pretty_constraint: None,
        }
    }

    /// `source must not be installed, or one of targets must be`.
    pub fn requires(source: PackageId, targets: Vec<PackageId>) -> Self {
        let mut literals = Vec::with_capacity(targets.len() + 1);
        literals.push(-source);
        literals.extend(targets);
        Rule::new(literals, RuleKind::PackageRequires)
    }

    /// At least one of the candidates must be installed.
    pub fn root_require(candidates: Vec<PackageId>) -> Self {
        Rule::new(candidates, RuleKind::RootRequire)
    }

    /// The two packages cannot both be installed.
    pub fn conflict(a: PackageId, b: PackageId) -> Self {
        Rule::new(vec![-a, -b], RuleKind::PackageConflict)
    }

    /// At most one of the candidates may be installed.
    pub fn same_name(candidates: Vec<PackageId>) -> Self {
        Rule::new(candidates.into_iter().map(|id| -id).collect(), RuleKind::SameName)
    }

    /// Unit assertion forcing a literal.
    pub fn assertion(literal: Literal, kind: RuleKind) -> Self {
        Rule::new(vec![literal], kind)
    }

    /// A clause learned from conflict analysis.
    pub fn learned(literals: Vec<Literal>) -> Self {
        Rule::new(literals, RuleKind::Learned)
    }

    pub fn with_source(mut self, source: PackageId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_constraint(mut self, pretty: impl Into<String>) -> Self {
        self.pretty_constraint = Some(pretty.into());
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn is_assertion(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Same-name rules watch every literal instead of two.
    pub fn is_multi_conflict(&self) -> bool {
        self.kind == RuleKind::SameName && self.literals.len() > 2
    }

    pub fn is_disabled(&self) -> bool {
        !self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn source_package(&self) -> Option<PackageId> {
        self.source
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn pretty_constraint(&self) -> Option<&str> {
        self.pretty_constraint.as_deref()
    }

    /// Order-insensitive hash of the literal set, used for deduplication.
    pub fn literal_hash(&self) -> u64 {
        let mut sorted = self.literals.clone();
        sorted.sort_unstable();
        let mut hasher = DefaultHasher::new();
        sorted.hash(&mut hasher);
        hasher.finish()
    }

    /// True when both rules have the same literal set, in any order.
    pub fn equals_literals(&self, other: &Rule) -> bool {
        if self.literals.len() != other.literals.len() {
            return false;
        }
        let mut a = self.literals.clone();
        let mut b = other.literals.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_shape() {
        let rule = Rule::requires(1, vec![2, 3]);
        assert_eq!(rule.literals(), &[-1, 2, 3]);
        assert_eq!(rule.kind(), RuleKind::PackageRequires);
    }

    #[test]
    fn test_conflict_shape() {
        let rule = Rule::conflict(1, 2);
        assert_eq!(rule.literals(), &[-1, -2]);
    }

    #[test]
    fn test_same_name_negates() {
        let rule = Rule::same_name(vec![1, 2, 3]);
        assert_eq!(rule.literals(), &[-1, -2, -3]);
        assert!(rule.is_multi_conflict());
        // pairs fall back to plain two-watched handling
        assert!(!Rule::same_name(vec![1, 2]).is_multi_conflict());
    }

    #[test]
    fn test_assertion() {
        let rule = Rule::assertion(5, RuleKind::Fixed);
        assert!(rule.is_assertion());
        assert!(!rule.is_empty());
        assert!(Rule::new(vec![], RuleKind::RootRequire).is_empty());
    }

    #[test]
    fn test_literal_hash_order_insensitive() {
        let a = Rule::new(vec![1, 2, 3], RuleKind::PackageRequires);
        let b = Rule::new(vec![3, 1, 2], RuleKind::PackageRequires);
        assert_eq!(a.literal_hash(), b.literal_hash());
        assert!(a.equals_literals(&b));

        let c = Rule::new(vec![1, 2], RuleKind::PackageRequires);
        assert!(!a.equals_literals(&c));
    }

    #[test]
    fn test_enable_disable() {
        let mut rule = Rule::assertion(1, RuleKind::Fixed);
        assert!(!rule.is_disabled());
        rule.disable();
        assert!(rule.is_disabled());
        rule.enable();
        assert!(!rule.is_disabled());
    }
}
