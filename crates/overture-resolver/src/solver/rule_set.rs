use std::collections::HashMap;

use indexmap::IndexMap;

use super::rule::{Rule, RuleKind};

/// Collection of SAT rules with id assignment, per-kind indexing and
/// deduplication by literal set.
///
/// Two logically identical clauses keep the earliest reason, so the
/// explainer always reports the rule that introduced a constraint first.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    rules_by_kind: IndexMap<RuleKind, Vec<u32>>,
    rule_hashes: HashMap<u64, u32>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    /// Add a rule, returning its id. Duplicate literal sets return the
    /// existing rule's id.
    pub fn add(&mut self, mut rule: Rule) -> u32 {
        let hash = rule.literal_hash();
        if let Some(&existing_id) = self.rule_hashes.get(&hash) {
            if let Some(existing) = self.get(existing_id) {
                if existing.equals_literals(&rule) {
                    return existing_id;
                }
            }
        }

        let id = self.rules.len() as u32;
        rule.set_id(id);

        self.rules_by_kind.entry(rule.kind()).or_default().push(id);
        self.rule_hashes.insert(hash, id);
        self.rules.push(rule);

        id
    }

    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Rule> {
        self.rules.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn rules_of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules_by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.get(id))
    }

    /// Single-literal rules, processed before search starts.
    pub fn assertions(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_assertion())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn count_of_kind(&self, kind: RuleKind) -> usize {
        self.rules_by_kind.get(&kind).map(|v| v.len()).unwrap_or(0)
    }

    pub fn disable(&mut self, id: u32) {
        if let Some(rule) = self.get_mut(id) {
            rule.disable();
        }
    }

    pub fn stats(&self) -> RuleSetStats {
        let mut stats = RuleSetStats {
            total: self.rules.len(),
            ..RuleSetStats::default()
        };

        for rule in &self.rules {
            match rule.kind() {
                RuleKind::RootRequire => stats.root_require += 1,
                RuleKind::Fixed => stats.fixed += 1,
                RuleKind::InstalledPackage => stats.installed += 1,
                RuleKind::PackageRequires => stats.requires += 1,
                RuleKind::PackageConflict => stats.conflict += 1,
                RuleKind::SameName => stats.same_name += 1,
                RuleKind::PackageAlias => stats.alias += 1,
                RuleKind::PackageInverseAlias => stats.inverse_alias += 1,
                RuleKind::Learned => stats.learned += 1,
            }
            if rule.is_assertion() {
                stats.assertions += 1;
            }
        }

        stats
    }
}

/// Counts per rule kind, used for logging after generation.
#[derive(Debug, Default)]
pub struct RuleSetStats {
    pub total: usize,
    pub assertions: usize,
    pub root_require: usize,
    pub fixed: usize,
    pub installed: usize,
    pub requires: usize,
    pub conflict: usize,
    pub same_name: usize,
    pub alias: usize,
    pub inverse_alias: usize,
    pub learned: usize,
}
