use std::collections::HashSet;
use std::sync::atomic::Ordering as AtomicOrdering;

use indexmap::IndexMap;

use super::decisions::Decisions;
use super::policy::Policy;
use super::pool::{PackageId, Pool};
use super::pool_optimizer::PoolOptimizer;
use super::problem::{Problem, ProblemSet};
use super::request::Request;
use super::rule::{Literal, Rule, RuleKind};
use super::rule_generator::RuleGenerator;
use super::rule_set::RuleSet;
use super::transaction::Transaction;
use super::watch_graph::{PropagateResult, Propagator, WatchGraph};
use super::SolverOptions;
use crate::error::ResolveError;

/// Counters the search maintains; exposed for tests and logging.
#[derive(Debug, Default, Clone)]
pub struct SolverStats {
    pub decisions: u64,
    pub conflicts: u64,
    pub learned_rules: u64,
    /// Set when conflict analysis ever asserted a positive literal, i.e.
    /// learning forced a package IN that an earlier branch had ruled out.
    pub learned_positive_literal: bool,
}

/// CDCL solver over package rules.
///
/// Decisions assign candidates true (install) or false (keep out); unit
/// propagation runs over a two-watched-literal index; conflicts are
/// analyzed to the first unique implication point, learned as new rules,
/// and resolved by backjumping to the second-highest decision level in
/// the learned clause.
pub struct Solver<'a> {
    pool: &'a Pool,
    policy: Policy,
    options: &'a SolverOptions,
    stats: SolverStats,
}

impl<'a> Solver<'a> {
    pub fn new(pool: &'a Pool, policy: Policy, options: &'a SolverOptions) -> Self {
        Solver {
            pool,
            policy,
            options,
            stats: SolverStats::default(),
        }
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Resolve the request against the pool. Returns the operations to
    /// perform, or the reason no valid assignment exists.
    pub fn solve(&mut self, request: &Request) -> Result<Transaction, ResolveError> {
        if self.options.pool_optimizer {
            let optimized = PoolOptimizer::new(&self.policy).optimize(request, self.pool);
            log::debug!(
                "pool optimizer: {} -> {} packages",
                self.pool.len(),
                optimized.len()
            );
            self.solve_with_pool(&optimized, request)
        } else {
            self.solve_with_pool(self.pool, request)
        }
    }

    fn solve_with_pool(
        &mut self,
        pool: &Pool,
        request: &Request,
    ) -> Result<Transaction, ResolveError> {
        let rules = RuleGenerator::new(pool, self.options).generate(request);
        log::debug!("solving over {} rules", rules.len());

        let mut state = SolverState::new(rules);
        self.run_sat(&mut state, pool, request)?;
        Ok(Transaction::from_decisions(pool, &state.decisions, request))
    }

    fn run_sat(
        &mut self,
        state: &mut SolverState,
        pool: &Pool,
        request: &Request,
    ) -> Result<(), ResolveError> {
        self.process_assertions(state, pool)?;

        loop {
            if let Some(abort) = &self.options.abort {
                if abort.load(AtomicOrdering::Relaxed) {
                    return Err(ResolveError::Aborted);
                }
            }

            if let Err(conflict_rule) = Self::propagate(state) {
                self.stats.conflicts += 1;

                if state.decisions.level() <= 1 {
                    return Err(self.analyze_unsolvable(state, pool, conflict_rule));
                }

                let (learned_literal, backjump_level, learned_rule) =
                    self.analyze(state, conflict_rule);

                state.decisions.revert_to_level(backjump_level);
                state.propagate_index = state.decisions.len();

                if learned_rule.is_empty() {
                    return Err(self.analyze_unsolvable(state, pool, conflict_rule));
                }

                let before = state.rules.len();
                let learned_id = state.rules.add(learned_rule);
                if state.rules.len() > before {
                    if let Some(rule) = state.rules.get(learned_id) {
                        state.watch_graph.add_rule(rule);
                    }
                    state.learned_activity.insert(learned_id, 1);
                    self.stats.learned_rules += 1;
                } else if let Some(activity) = state.learned_activity.get_mut(&learned_id) {
                    *activity += 1;
                }

                if learned_literal > 0 {
                    self.stats.learned_positive_literal = true;
                }
                state.decisions.decide(learned_literal, Some(learned_id));

                self.reduce_learned_rules(state);
                continue;
            }

            match Self::select_next(state) {
                Some((candidates, required_name)) => {
                    let sorted = self.policy.select_preferred_packages(
                        pool,
                        &candidates,
                        Some(&required_name),
                    );
                    if sorted.is_empty() {
                        continue;
                    }

                    state.decisions.increment_level();
                    self.stats.decisions += 1;
                    state.decisions.decide(sorted[0], None);
                }
                None => return self.verify_request(state, pool, request),
            }
        }
    }

    /// Assert all unit rules at level 1. Conflicts here are final.
    fn process_assertions(
        &mut self,
        state: &mut SolverState,
        pool: &Pool,
    ) -> Result<(), ResolveError> {
        state.decisions.increment_level();

        for index in 0..state.rules.len() {
            let Some(rule) = state.rules.get(index as u32) else {
                continue;
            };
            if rule.is_disabled() || !rule.is_empty() {
                continue;
            }
            if rule.kind() == RuleKind::RootRequire {
                return Err(ResolveError::RequirementNotFound {
                    name: rule.target_name().unwrap_or("unknown").to_string(),
                    constraint: rule.pretty_constraint().unwrap_or("*").to_string(),
                });
            }
        }

        for index in 0..state.rules.len() {
            let Some(rule) = state.rules.get(index as u32) else {
                continue;
            };
            if rule.is_disabled() || !rule.is_assertion() {
                continue;
            }

            let literal = rule.literals()[0];
            let kind = rule.kind();
            let target = rule.target_name().map(String::from);
            let rule_id = rule.id();

            if state.decisions.conflict(literal) {
                if kind == RuleKind::Fixed || kind == RuleKind::InstalledPackage {
                    return Err(ResolveError::FixedConflict {
                        name: target.unwrap_or_else(|| "unknown".to_string()),
                    });
                }
                let mut problems = ProblemSet::new();
                let mut problem = Problem::new();
                if let Some(rule) = state.rules.get(rule_id) {
                    problem.add_rule_with_pool(rule, pool);
                }
                if let Some(reason) = state.decisions.decision_rule(literal) {
                    if let Some(rule) = state.rules.get(reason) {
                        problem.add_rule_with_pool(rule, pool);
                    }
                }
                problems.add(problem);
                return Err(ResolveError::VersionConflict(problems));
            }

            if !state.decisions.satisfied(literal) {
                state.decisions.decide(literal, Some(rule_id));
            }
        }

        Ok(())
    }

    /// Unit propagation over the watch graph. Returns the conflicting
    /// rule id on failure.
    fn propagate(state: &mut SolverState) -> Result<(), u32> {
        while state.propagate_index < state.decisions.len() {
            let (literal, _) = state.decisions.queue()[state.propagate_index];
            state.propagate_index += 1;

            let results = {
                let SolverState {
                    decisions,
                    watch_graph,
                    rules,
                    ..
                } = state;
                let decisions = &*decisions;
                let mut propagator = Propagator::new(watch_graph, &*rules);
                propagator.propagate(literal, |lit| {
                    let package = lit.unsigned_abs() as PackageId;
                    if decisions.decided(package) {
                        Some(decisions.satisfied(lit))
                    } else {
                        None
                    }
                })
            };

            for result in results {
                match result {
                    PropagateResult::Ok => {}
                    PropagateResult::Unit(unit, rule_id) => {
                        if state.decisions.conflict(unit) {
                            return Err(rule_id);
                        }
                        if !state.decisions.satisfied(unit) {
                            state.decisions.decide(unit, Some(rule_id));
                        }
                    }
                    PropagateResult::Conflict(rule_id) => return Err(rule_id),
                }
            }
        }
        Ok(())
    }

    /// First-UIP conflict analysis.
    ///
    /// Resolves the conflicting clause against the reasons of its
    /// current-level literals, walking the trail backwards, until exactly
    /// one current-level literal remains. That literal (negated) becomes
    /// the asserting literal of the learned clause; it may be positive,
    /// forcing a package IN on backjump.
    fn analyze(&mut self, state: &mut SolverState, conflict_rule_id: u32) -> (Literal, u32, Rule) {
        let current_level = state.decisions.level();
        let mut seen: HashSet<PackageId> = HashSet::new();
        let mut lower_literals: Vec<Literal> = Vec::new();
        let mut backjump_level = 0u32;
        let mut counter = 0usize;

        let mut clause: Vec<Literal> = state
            .rules
            .get(conflict_rule_id)
            .map(|r| r.literals().to_vec())
            .unwrap_or_default();
        Self::bump_activity(state, conflict_rule_id);

        let mut queue_idx = state.decisions.len();
        let uip: Literal;

        loop {
            for &lit in &clause {
                // a satisfied literal cannot contribute to the conflict
                // (it appears in at-most-one reasons next to the member
                // that was actually installed)
                if state.decisions.satisfied(lit) {
                    continue;
                }
                let package = lit.unsigned_abs() as PackageId;
                if !seen.insert(package) {
                    continue;
                }
                let Some(level) = state.decisions.decision_level(lit) else {
                    continue;
                };
                if level == 0 {
                    continue;
                }
                if level == current_level {
                    counter += 1;
                } else {
                    lower_literals.push(lit);
                    backjump_level = backjump_level.max(level);
                }
            }

            if counter == 0 {
                // Defensive: a conflict with no current-level literal can
                // only come from inconsistent bookkeeping; negate the
                // latest decision so search still terminates.
                let fallback = state
                    .decisions
                    .queue()
                    .iter()
                    .rev()
                    .find(|(lit, _)| state.decisions.decision_level(*lit) == Some(current_level))
                    .map(|(lit, _)| -lit);
                uip = fallback.unwrap_or(0);
                break;
            }

            // most recent trail entry that is part of the conflict
            loop {
                debug_assert!(queue_idx > 0);
                if queue_idx == 0 {
                    break;
                }
                queue_idx -= 1;
                let (qlit, _) = state.decisions.queue()[queue_idx];
                let qid = qlit.unsigned_abs() as PackageId;
                if seen.contains(&qid)
                    && state.decisions.decision_level(qlit) == Some(current_level)
                {
                    break;
                }
            }

            let (qlit, qreason) = state.decisions.queue()[queue_idx];
            counter -= 1;

            if counter == 0 {
                uip = -qlit;
                break;
            }

            let Some(reason_id) = qreason else {
                // the decision itself; nothing left to resolve against
                uip = -qlit;
                break;
            };
            Self::bump_activity(state, reason_id);
            clause = state
                .rules
                .get(reason_id)
                .map(|r| {
                    r.literals()
                        .iter()
                        .copied()
                        .filter(|&l| l != qlit)
                        .collect()
                })
                .unwrap_or_default();
        }

        if backjump_level >= current_level {
            backjump_level = current_level.saturating_sub(1);
        }
        if backjump_level == 0 && current_level > 1 {
            backjump_level = 1;
        }

        let mut literals = Vec::with_capacity(lower_literals.len() + 1);
        literals.push(uip);
        literals.extend(lower_literals);
        literals.retain(|&l| l != 0);

        (uip, backjump_level, Rule::learned(literals))
    }

    fn bump_activity(state: &mut SolverState, rule_id: u32) {
        if let Some(activity) = state.learned_activity.get_mut(&rule_id) {
            *activity += 1;
        }
    }

    /// Evict cold learned clauses once the store exceeds its cap: every
    /// learned rule with activity below the median goes, except those
    /// currently acting as a reason on the trail. Deterministic by
    /// construction (integer activities, insertion-ordered map).
    fn reduce_learned_rules(&self, state: &mut SolverState) {
        let cap = self.options.max_learned_rules;
        if cap == 0 || state.learned_activity.len() <= cap {
            return;
        }

        let mut activities: Vec<u64> = state.learned_activity.values().copied().collect();
        activities.sort_unstable();
        let median = activities[activities.len() / 2];

        let in_use: HashSet<u32> = state
            .decisions
            .queue()
            .iter()
            .filter_map(|(_, reason)| *reason)
            .collect();

        let victims: Vec<u32> = state
            .learned_activity
            .iter()
            .filter(|(id, &activity)| activity < median && !in_use.contains(id))
            .map(|(&id, _)| id)
            .collect();

        for id in victims {
            state.rules.disable(id);
            state.learned_activity.shift_remove(&id);
        }
    }

    /// Pick the next unresolved requirement.
    ///
    /// The scan resumes after the rule that produced the previous
    /// decision and wraps around, so work started on one dependency
    /// subtree continues there instead of restarting from the root
    /// requirements after every backjump.
    fn select_next(state: &mut SolverState) -> Option<(Vec<PackageId>, String)> {
        let count = state.rules.len();
        if count == 0 {
            return None;
        }
        for step in 0..count {
            let index = (state.rule_scan_cursor + step) % count;
            let Some(rule) = state.rules.get(index as u32) else {
                continue;
            };
            if rule.is_disabled() {
                continue;
            }

            match rule.kind() {
                RuleKind::RootRequire | RuleKind::Fixed | RuleKind::InstalledPackage => {
                    let literals = rule.literals();
                    let mut queue = Vec::new();
                    let mut satisfied = false;
                    for &lit in literals {
                        if state.decisions.satisfied(lit) {
                            satisfied = true;
                            break;
                        }
                        if lit > 0 && state.decisions.undecided(lit) {
                            queue.push(lit);
                        }
                    }
                    if !satisfied && !queue.is_empty() {
                        let name = rule.target_name().unwrap_or("unknown").to_string();
                        state.rule_scan_cursor = (index + 1) % count;
                        return Some((queue, name));
                    }
                }
                RuleKind::PackageRequires => {
                    let literals = rule.literals();
                    let Some(&source_lit) = literals.first() else {
                        continue;
                    };
                    if source_lit >= 0 {
                        continue;
                    }
                    if !state.decisions.decided_install(-source_lit) {
                        continue;
                    }

                    let mut queue = Vec::new();
                    for &lit in &literals[1..] {
                        if lit <= 0 {
                            continue;
                        }
                        if state.decisions.satisfied(lit) {
                            queue.clear();
                            break;
                        }
                        if state.decisions.undecided(lit) {
                            queue.push(lit);
                        }
                    }
                    if !queue.is_empty() {
                        let name = rule.target_name().unwrap_or("unknown").to_string();
                        state.rule_scan_cursor = (index + 1) % count;
                        return Some((queue, name));
                    }
                }
                _ => {}
            }
        }

        None
    }

    /// A full assignment exists; cross-check the request-level
    /// invariants that are cheaper to verify than to encode.
    fn verify_request(
        &self,
        state: &SolverState,
        pool: &Pool,
        request: &Request,
    ) -> Result<(), ResolveError> {
        for package in request.fixed_packages() {
            let pinned = pool
                .packages_by_name(package.name())
                .into_iter()
                .any(|id| state.decisions.decided_install(id));
            if !pinned {
                return Err(ResolveError::FixedConflict {
                    name: package.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Conflict with no decisions left to undo: collect the reason chain
    /// into a problem report.
    fn analyze_unsolvable(
        &self,
        state: &SolverState,
        pool: &Pool,
        conflict_rule_id: u32,
    ) -> ResolveError {
        let mut problem = Problem::new();
        let mut seen_rules: HashSet<u32> = HashSet::new();
        let mut seen_literals: HashSet<PackageId> = HashSet::new();
        let mut queue = vec![conflict_rule_id];
        let mut fixed_conflict: Option<String> = None;

        while let Some(rule_id) = queue.pop() {
            if !seen_rules.insert(rule_id) {
                continue;
            }
            let Some(rule) = state.rules.get(rule_id) else {
                continue;
            };
            problem.add_rule_with_pool(rule, pool);

            if matches!(rule.kind(), RuleKind::Fixed | RuleKind::InstalledPackage) {
                if let Some(target) = rule.target_name() {
                    fixed_conflict.get_or_insert_with(|| target.to_string());
                }
            }

            for &lit in rule.literals() {
                let package = lit.unsigned_abs() as PackageId;
                if !seen_literals.insert(package) {
                    continue;
                }
                if let Some(reason) = state.decisions.decision_rule(lit) {
                    queue.push(reason);
                }
            }
        }

        if let Some(name) = fixed_conflict {
            return ResolveError::FixedConflict { name };
        }

        let mut problems = ProblemSet::new();
        problems.add(problem);
        ResolveError::VersionConflict(problems)
    }
}

/// Mutable search state for one solve.
struct SolverState {
    rules: RuleSet,
    decisions: Decisions,
    watch_graph: WatchGraph,
    propagate_index: usize,
    /// where the decision scan resumes
    rule_scan_cursor: usize,
    /// learned rule id -> conflict involvement count
    learned_activity: IndexMap<u32, u64>,
}

impl SolverState {
    fn new(rules: RuleSet) -> Self {
        let watch_graph = WatchGraph::from_rules(&rules);
        SolverState {
            rules,
            decisions: Decisions::new(),
            watch_graph,
            propagate_index: 0,
            rule_scan_cursor: 0,
            learned_activity: IndexMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LinkKind, Package};
    use overture_semver::{Constraint, VersionParser};
    use std::sync::atomic::AtomicBool;
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

    fn options_no_optimizer() -> SolverOptions {
        SolverOptions {
            pool_optimizer: false,
            ..SolverOptions::default()
        }
    }

    #[test]
    fn test_simple_solve() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/a", constraint("^1.0"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let transaction = solver.solve(&request).unwrap();
        assert_eq!(transaction.installs().count(), 2);
    }

    #[test]
    fn test_newest_version_selected() {
        let mut pool = Pool::new();
        pool.add_package(pkg("vendor/a", "1.0.0"), 0);
        pool.add_package(pkg("vendor/a", "2.0.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let transaction = solver.solve(&request).unwrap();
        let installed: Vec<_> = transaction.installs().collect();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].pretty_version(), "2.0.0");
    }

    #[test]
    fn test_prefer_lowest_selected() {
        let mut pool = Pool::new();
        pool.add_package(pkg("vendor/a", "1.0.0"), 0);
        pool.add_package(pkg("vendor/a", "2.0.0"), 0);

        let options = SolverOptions {
            prefer_lowest: true,
            pool_optimizer: false,
            ..SolverOptions::default()
        };
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new().prefer_lowest(true), &options);
        let transaction = solver.solve(&request).unwrap();
        let installed: Vec<_> = transaction.installs().collect();
        assert_eq!(installed[0].pretty_version(), "1.0.0");
    }

    #[test]
    fn test_requirement_not_found() {
        let pool = Pool::new();
        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/missing", constraint("^1.0"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let err = solver.solve(&request).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::RequirementNotFound { ref name, .. } if name == "vendor/missing"
        ));
    }

    #[test]
    fn test_backtracks_to_compatible_version() {
        // a prefers b 2.0 for its own newest version, but c pins b ^1.0;
        // the solver must settle on a version pair without conflict
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "2.0.0", "vendor/b", "^2.0"), 0);
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg("vendor/b", "2.0.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg_req("vendor/c", "1.0.0", "vendor/b", "^1.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.require("vendor/c", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let transaction = solver.solve(&request).unwrap();

        let installed: Vec<_> = transaction.installs().collect();
        let a = installed.iter().find(|p| p.name() == "vendor/a").unwrap();
        let b = installed.iter().find(|p| p.name() == "vendor/b").unwrap();
        assert_eq!(a.pretty_version(), "1.0.0");
        assert_eq!(b.pretty_version(), "1.0.0");
    }

    #[test]
    fn test_unsolvable_conflict() {
        let mut pool = Pool::new();
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^1.0"), 0);
        pool.add_package(pkg_req("vendor/c", "1.0.0", "vendor/b", "^2.0"), 0);
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));
        request.require("vendor/c", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let err = solver.solve(&request).unwrap_err();
        assert!(matches!(err, ResolveError::VersionConflict(_)));
    }

    #[test]
    fn test_abort_probe() {
        let mut pool = Pool::new();
        pool.add_package(pkg("vendor/a", "1.0.0"), 0);

        let abort = Arc::new(AtomicBool::new(true));
        let options = SolverOptions {
            pool_optimizer: false,
            abort: Some(abort),
            ..SolverOptions::default()
        };
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let err = solver.solve(&request).unwrap_err();
        assert!(matches!(err, ResolveError::Aborted));
    }

    #[test]
    fn test_fixed_conflict() {
        let mut pool = Pool::new();
        pool.add_package(pkg("vendor/b", "1.0.0"), 0);
        pool.add_package(pkg("vendor/b", "2.0.0"), 0);
        pool.add_package(pkg_req("vendor/a", "1.0.0", "vendor/b", "^2.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.fix(pkg("vendor/b", "1.0.0"));
        request.require("vendor/a", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        let err = solver.solve(&request).unwrap_err();
        assert!(matches!(err, ResolveError::FixedConflict { .. }));
    }

    #[test]
    fn test_stats_track_decisions() {
        let mut pool = Pool::new();
        pool.add_package(pkg("vendor/a", "1.0.0"), 0);
        pool.add_package(pkg("vendor/a", "2.0.0"), 0);

        let options = options_no_optimizer();
        let mut request = Request::new();
        request.require("vendor/a", constraint("*"));

        let mut solver = Solver::new(&pool, Policy::new(), &options);
        solver.solve(&request).unwrap();
        assert!(solver.stats().decisions >= 1);
        assert_eq!(solver.stats().conflicts, 0);
        assert!(!solver.stats().learned_positive_literal);
    }
}
