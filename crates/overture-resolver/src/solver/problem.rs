use std::fmt;

use super::pool::{PackageId, Pool};
use super::request::Request;
use super::rule::{Rule, RuleKind};
use crate::platform::is_platform_package;
use crate::repository::RepositorySet;

/// A minimized chain of rules explaining why no solution exists.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    rules: Vec<ProblemRule>,
}

/// One rule's contribution to a problem, with names resolved at capture
/// time so the report does not need the pool to stay alive.
#[derive(Debug, Clone)]
pub struct ProblemRule {
    pub kind: RuleKind,
    pub source: Option<PackageId>,
    pub source_pretty: Option<String>,
    pub target: Option<String>,
    pub constraint: Option<String>,
}

impl Problem {
    pub fn new() -> Self {
        Problem::default()
    }

    pub fn add_rule(&mut self, rule: &Rule) {
        self.rules.push(ProblemRule {
            kind: rule.kind(),
            source: rule.source_package(),
            source_pretty: None,
            target: rule.target_name().map(String::from),
            constraint: rule.pretty_constraint().map(String::from),
        });
    }

    /// Capture a rule, resolving its source package's pretty name.
    pub fn add_rule_with_pool(&mut self, rule: &Rule, pool: &Pool) {
        let source_pretty = rule
            .source_package()
            .and_then(|id| pool.entry(id))
            .map(|entry| entry.pretty_string());
        self.rules.push(ProblemRule {
            kind: rule.kind(),
            source: rule.source_package(),
            source_pretty,
            target: rule.target_name().map(String::from),
            constraint: rule.pretty_constraint().map(String::from),
        });
    }

    pub fn rules(&self) -> &[ProblemRule] {
        &self.rules
    }

    /// Short description without repository context.
    pub fn describe(&self, pool: &Pool) -> String {
        self.rules
            .iter()
            .map(|rule| format!("  - {}", describe_rule(rule, pool, None)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full human-readable report. The repository set is consulted
    /// unfiltered, so versions that exist but missed a constraint can be
    /// named, and platform requirements get dedicated guidance.
    pub fn pretty(&self, repo_set: &RepositorySet, _request: &Request, pool: &Pool) -> String {
        self.rules
            .iter()
            .map(|rule| format!("  - {}", describe_rule(rule, pool, Some(repo_set))))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn source_name(rule: &ProblemRule, pool: &Pool) -> String {
    if let Some(pretty) = &rule.source_pretty {
        return pretty.clone();
    }
    rule.source
        .and_then(|id| pool.entry(id))
        .map(|entry| entry.pretty_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn describe_rule(rule: &ProblemRule, pool: &Pool, repo_set: Option<&RepositorySet>) -> String {
    let target = rule.target.as_deref().unwrap_or("unknown");
    let constraint = rule.constraint.as_deref().unwrap_or("*");

    match rule.kind {
        RuleKind::RootRequire => {
            let mut line = format!("Root requires {} {}", target, constraint);
            line.push_str(&requirement_outcome(target, pool, repo_set));
            line
        }
        RuleKind::PackageRequires => {
            let mut line = format!(
                "{} requires {} {}",
                source_name(rule, pool),
                target,
                constraint
            );
            line.push_str(&requirement_outcome(target, pool, repo_set));
            line
        }
        RuleKind::Fixed => format!("{} is fixed and cannot be modified", source_name(rule, pool)),
        RuleKind::InstalledPackage => format!(
            "{} is locked and the update policy keeps it pinned",
            source_name(rule, pool)
        ),
        RuleKind::PackageConflict => format!(
            "{} conflicts with {} {}",
            source_name(rule, pool),
            target,
            constraint
        ),
        RuleKind::SameName => format!("only one package can occupy the name {}", target),
        RuleKind::PackageAlias | RuleKind::PackageInverseAlias => format!(
            "{} is an alias and moves together with its base package",
            source_name(rule, pool)
        ),
        RuleKind::Learned => "conclusion reached by conflict analysis".to_string(),
    }
}

/// The suffix after a requirement line: what exists for the target name
/// and why it did not help.
fn requirement_outcome(target: &str, pool: &Pool, repo_set: Option<&RepositorySet>) -> String {
    let satisfiable = pool.packages_by_name(target);
    if !satisfiable.is_empty() {
        let versions: Vec<String> = satisfiable
            .iter()
            .filter_map(|&id| pool.entry(id))
            .map(|e| e.pretty_version().to_string())
            .collect();
        let pretty_name = satisfiable
            .first()
            .and_then(|&id| pool.entry(id))
            .map(|e| e.pretty_name().to_string())
            .unwrap_or_else(|| target.to_string());
        return format!(
            " -> satisfiable by {}[{}]",
            pretty_name,
            versions.join(", ")
        );
    }

    let Some(repo_set) = repo_set else {
        return String::new();
    };

    let existing = repo_set.find_packages(target, None).unwrap_or_default();
    if !existing.is_empty() {
        let pretty_name = existing[0].1.pretty_name().to_string();
        let versions: Vec<String> = existing
            .iter()
            .map(|(_, p)| p.pretty_version().to_string())
            .collect();
        return format!(
            " -> found {}[{}] but it does not match the constraint",
            pretty_name,
            versions.join(", ")
        );
    }

    if is_platform_package(target) {
        return format!(
            " -> {} is missing from your platform or has been disabled, so the requirement cannot be satisfied",
            target
        );
    }

    format!(" -> requirement not found: no package provides {}", target)
}

/// All problems found in one unsatisfiable solve.
#[derive(Debug, Default)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        ProblemSet::default()
    }

    pub fn add(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn describe(&self, pool: &Pool) -> String {
        self.render(|problem| problem.describe(pool))
    }

    /// Deterministic full report for all problems.
    pub fn pretty(&self, repo_set: &RepositorySet, request: &Request, pool: &Pool) -> String {
        self.render(|problem| problem.pretty(repo_set, request, pool))
    }

    fn render(&self, mut describe: impl FnMut(&Problem) -> String) -> String {
        if self.problems.is_empty() {
            return "No problems found".to_string();
        }
        self.problems
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Problem {}:\n{}", i + 1, describe(p)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// Display cannot render rule details without a pool; report the count
// and let callers use `pretty` for the full text.
impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s) found", self.problems.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use std::sync::Arc;

    fn pool_with(packages: &[(&str, &str)]) -> Pool {
        let mut pool = Pool::new();
        for (name, version) in packages {
            pool.add_package(Arc::new(Package::parse(*name, *version).unwrap()), 0);
        }
        pool
    }

    #[test]
    fn test_root_require_description() {
        let pool = pool_with(&[]);
        let mut problem = Problem::new();
        let rule = Rule::new(vec![], RuleKind::RootRequire)
            .with_target("vendor/missing")
            .with_constraint("^1.0");
        problem.add_rule(&rule);

        let text = problem.describe(&pool);
        assert!(text.contains("Root requires vendor/missing ^1.0"));
    }

    #[test]
    fn test_requires_satisfiable_suffix() {
        let pool = pool_with(&[("vendor/b", "1.0")]);
        let mut problem = Problem::new();
        let rule = Rule::requires(5, vec![1])
            .with_source(5)
            .with_target("vendor/b")
            .with_constraint("^1.0");
        problem.add_rule(&rule);

        let text = problem.describe(&pool);
        assert!(text.contains("satisfiable by vendor/b[1.0]"));
    }

    #[test]
    fn test_problem_set_display() {
        let mut problems = ProblemSet::new();
        assert!(problems.is_empty());
        problems.add(Problem::new());
        assert_eq!(problems.to_string(), "1 problem(s) found");
    }
}
