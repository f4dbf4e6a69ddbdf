use super::rule::{Literal, Rule};
use super::rule_set::RuleSet;

/// Two-watched-literal index for unit propagation.
///
/// Each rule watches two of its literals; a rule only needs attention
/// when a watched literal is falsified. Same-name cardinality rules watch
/// every literal instead, since installing any member constrains all the
/// others at once.
#[derive(Debug, Default)]
pub struct WatchGraph {
    /// literal index -> watching rules
    watches: Vec<Vec<WatchNode>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchNode {
    rule_id: u32,
    other_watch: Literal,
}

impl WatchGraph {
    pub fn new() -> Self {
        WatchGraph::default()
    }

    fn literal_to_index(literal: Literal) -> usize {
        let abs = literal.unsigned_abs() as usize;
        if literal > 0 {
            abs * 2
        } else {
            abs * 2 + 1
        }
    }

    fn get_watches_mut(&mut self, literal: Literal) -> &mut Vec<WatchNode> {
        let idx = Self::literal_to_index(literal);
        if idx >= self.watches.len() {
            self.watches.resize(idx + 1, Vec::new());
        }
        &mut self.watches[idx]
    }

    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::new();
        for rule in rules.iter() {
            if rule.is_disabled() || rule.is_assertion() {
                continue;
            }
            graph.add_rule(rule);
        }
        graph
    }

    pub fn add_rule(&mut self, rule: &Rule) {
        let literals = rule.literals();
        if literals.len() < 2 {
            return;
        }

        let rule_id = rule.id();

        if rule.is_multi_conflict() {
            let first = literals[0];
            for &lit in literals {
                self.get_watches_mut(lit).push(WatchNode {
                    rule_id,
                    other_watch: first,
                });
            }
            return;
        }

        let watch1 = literals[0];
        let watch2 = literals[1];
        self.get_watches_mut(watch1).push(WatchNode {
            rule_id,
            other_watch: watch2,
        });
        self.get_watches_mut(watch2).push(WatchNode {
            rule_id,
            other_watch: watch1,
        });
    }

    pub fn get_watches(&self, literal: Literal) -> &[WatchNode] {
        let idx = Self::literal_to_index(literal);
        if idx < self.watches.len() {
            &self.watches[idx]
        } else {
            &[]
        }
    }

    fn remove_watch(&mut self, literal: Literal, rule_id: u32) {
        let idx = Self::literal_to_index(literal);
        if idx < self.watches.len() {
            self.watches[idx].retain(|w| w.rule_id != rule_id);
        }
    }

    pub fn move_watch(&mut self, rule_id: u32, from: Literal, to: Literal, other: Literal) {
        self.remove_watch(from, rule_id);
        self.get_watches_mut(to).push(WatchNode {
            rule_id,
            other_watch: other,
        });
    }
}

/// Outcome of examining one watched rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagateResult {
    Ok,
    /// This literal is forced true by the rule.
    Unit(Literal, u32),
    /// Every literal of the rule is false.
    Conflict(u32),
}

/// Runs unit propagation over the watch graph.
pub struct Propagator<'a> {
    graph: &'a mut WatchGraph,
    rules: &'a RuleSet,
}

impl<'a> Propagator<'a> {
    pub fn new(graph: &'a mut WatchGraph, rules: &'a RuleSet) -> Self {
        Propagator { graph, rules }
    }

    /// Propagate one newly decided literal. `is_satisfied` reports the
    /// current assignment of a literal (`None` = undecided).
    pub fn propagate<F>(&mut self, literal: Literal, mut is_satisfied: F) -> Vec<PropagateResult>
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        let mut results = Vec::new();

        // Deciding `literal` falsifies its negation; that is what rules
        // watch.
        let false_literal = -literal;
        let watches: Vec<_> = self.graph.get_watches(false_literal).to_vec();

        for watch in watches {
            let Some(rule) = self.rules.get(watch.rule_id) else {
                continue;
            };
            if rule.is_disabled() {
                continue;
            }

            if rule.is_multi_conflict() {
                let result =
                    self.propagate_multi_conflict(rule, false_literal, &mut is_satisfied, &mut results);
                if result != PropagateResult::Ok {
                    results.push(result);
                }
                continue;
            }

            let other = watch.other_watch;
            match is_satisfied(other) {
                Some(true) => continue,
                Some(false) => {
                    let result = self.find_new_watch(rule, false_literal, other, &mut is_satisfied);
                    if result != PropagateResult::Ok {
                        results.push(result);
                    }
                }
                None => {
                    let result = self.check_unit(rule, false_literal, other, &mut is_satisfied);
                    if result != PropagateResult::Ok {
                        results.push(result);
                    }
                }
            }
        }

        results
    }

    /// One member of an at-most-one group was installed; every other
    /// member must now be absent.
    fn propagate_multi_conflict<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        is_satisfied: &mut F,
        results: &mut Vec<PropagateResult>,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &lit in rule.literals() {
            if lit == false_literal {
                continue;
            }
            match is_satisfied(lit) {
                Some(true) => continue,
                Some(false) => return PropagateResult::Conflict(rule.id()),
                None => results.push(PropagateResult::Unit(lit, rule.id())),
            }
        }
        PropagateResult::Ok
    }

    /// Both watched literals are false; look for a replacement watch.
    fn find_new_watch<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        other_false: Literal,
        is_satisfied: &mut F,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &lit in rule.literals() {
            if lit == false_literal || lit == other_false {
                continue;
            }
            match is_satisfied(lit) {
                Some(false) => continue,
                _ => {
                    self.graph.move_watch(rule.id(), false_literal, lit, other_false);
                    return PropagateResult::Ok;
                }
            }
        }
        PropagateResult::Conflict(rule.id())
    }

    /// One watched literal false, the other undecided: unit unless some
    /// unwatched literal can take over the watch.
    fn check_unit<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        undecided: Literal,
        is_satisfied: &mut F,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &lit in rule.literals() {
            if lit == false_literal || lit == undecided {
                continue;
            }
            match is_satisfied(lit) {
                Some(false) => continue,
                _ => {
                    self.graph.move_watch(rule.id(), false_literal, lit, undecided);
                    return PropagateResult::Ok;
                }
            }
        }
        PropagateResult::Unit(undecided, rule.id())
    }
}
