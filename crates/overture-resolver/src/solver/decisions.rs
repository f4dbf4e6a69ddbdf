use super::pool::PackageId;
use super::rule::Literal;

/// Tracks assignments made during search.
///
/// A flat map indexed by package id stores both polarity and decision
/// level in one `i32`: `0` undecided, `+(level+1)` installed,
/// `-(level+1)` not installed. A parallel map stores the forcing rule.
#[derive(Debug, Default)]
pub struct Decisions {
    decision_map: Vec<i32>,
    reason_map: Vec<Option<u32>>,
    decision_queue: Vec<(Literal, Option<u32>)>,
    level: u32,
}

impl Decisions {
    pub fn new() -> Self {
        Decisions::default()
    }

    pub fn with_capacity(max_package_id: usize) -> Self {
        Decisions {
            decision_map: vec![0; max_package_id + 1],
            reason_map: vec![None; max_package_id + 1],
            decision_queue: Vec::with_capacity(max_package_id),
            level: 0,
        }
    }

    #[inline]
    fn ensure_capacity(&mut self, package_id: PackageId) {
        let id = package_id as usize;
        if id >= self.decision_map.len() {
            self.decision_map.resize(id + 1, 0);
            self.reason_map.resize(id + 1, None);
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn increment_level(&mut self) {
        self.level += 1;
    }

    /// Record an assignment at the current level. Returns false when it
    /// contradicts an existing assignment.
    pub fn decide(&mut self, literal: Literal, reason: Option<u32>) -> bool {
        let package_id = literal.unsigned_abs() as PackageId;
        self.ensure_capacity(package_id);

        let id = package_id as usize;
        let existing = self.decision_map[id];
        if existing != 0 {
            return (existing > 0) == (literal > 0);
        }

        // level+1 so a level-0 assignment is distinguishable from
        // "undecided"
        let value = (self.level + 1) as i32;
        self.decision_map[id] = if literal > 0 { value } else { -value };
        self.reason_map[id] = reason;
        self.decision_queue.push((literal, reason));
        true
    }

    #[inline]
    pub fn satisfied(&self, literal: Literal) -> bool {
        let id = literal.unsigned_abs() as usize;
        if id >= self.decision_map.len() {
            return false;
        }
        let decision = self.decision_map[id];
        decision != 0 && (decision > 0) == (literal > 0)
    }

    #[inline]
    pub fn conflict(&self, literal: Literal) -> bool {
        let id = literal.unsigned_abs() as usize;
        if id >= self.decision_map.len() {
            return false;
        }
        let decision = self.decision_map[id];
        decision != 0 && (decision > 0) != (literal > 0)
    }

    #[inline]
    pub fn decided(&self, package_id: PackageId) -> bool {
        let id = package_id as usize;
        id < self.decision_map.len() && self.decision_map[id] != 0
    }

    #[inline]
    pub fn undecided(&self, package_id: PackageId) -> bool {
        !self.decided(package_id)
    }

    #[inline]
    pub fn decided_install(&self, package_id: PackageId) -> bool {
        let id = package_id as usize;
        id < self.decision_map.len() && self.decision_map[id] > 0
    }

    /// Decision level for a literal's package, if decided.
    #[inline]
    pub fn decision_level(&self, literal: Literal) -> Option<u32> {
        let id = literal.unsigned_abs() as usize;
        if id >= self.decision_map.len() {
            return None;
        }
        match self.decision_map[id] {
            0 => None,
            d => Some(d.unsigned_abs() - 1),
        }
    }

    /// The rule that forced a literal, None for free decisions.
    pub fn decision_rule(&self, literal: Literal) -> Option<u32> {
        let id = literal.unsigned_abs() as usize;
        if id >= self.reason_map.len() {
            return None;
        }
        self.reason_map[id]
    }

    /// Undo all assignments above `target_level`.
    pub fn revert_to_level(&mut self, target_level: u32) {
        let target = (target_level + 1) as i32;

        while let Some(&(literal, _)) = self.decision_queue.last() {
            let id = literal.unsigned_abs() as usize;
            let decision = self.decision_map[id];
            if decision == 0 || (decision.unsigned_abs() as i32) <= target {
                break;
            }
            self.decision_map[id] = 0;
            self.reason_map[id] = None;
            self.decision_queue.pop();
        }

        self.level = target_level;
    }

    /// Ids decided positively, in increasing id order.
    pub fn installed_packages(&self) -> impl Iterator<Item = PackageId> + '_ {
        self.decision_map
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(id, _)| id as PackageId)
    }

    pub fn queue(&self) -> &[(Literal, Option<u32>)] {
        &self.decision_queue
    }

    pub fn len(&self) -> usize {
        self.decision_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decision_queue.is_empty()
    }
}
