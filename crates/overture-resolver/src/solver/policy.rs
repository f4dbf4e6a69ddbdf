use std::cmp::Ordering;
use std::collections::HashSet;

use overture_semver::Version;

use super::pool::{PackageId, Pool};

/// Ranks candidate packages for branching decisions.
///
/// Deterministic and side-effect free: given the same pool, literals and
/// flags, the same order comes out. Ranking rules apply lexicographically:
///
/// 1. root-package aliases first when their base is also a candidate
/// 2. locked (prior installed) candidates first under `prefer_locked`
/// 3. lower-indexed repository first
/// 4. stable before unstable for the same name under `prefer_stable`
/// 5. newest version first, or oldest under `prefer_lowest`
/// 6. branch versions after numeric ones either way
/// 7. replacers sharing the required name's vendor before other replacers
/// 8. remaining ties keep insertion order
#[derive(Debug, Clone, Default)]
pub struct Policy {
    prefer_stable: bool,
    prefer_lowest: bool,
    prefer_locked: bool,
    locked: HashSet<(String, Version)>,
}

impl Policy {
    pub fn new() -> Self {
        Policy::default()
    }

    pub fn prefer_stable(mut self, prefer_stable: bool) -> Self {
        self.prefer_stable = prefer_stable;
        self
    }

    pub fn prefer_lowest(mut self, prefer_lowest: bool) -> Self {
        self.prefer_lowest = prefer_lowest;
        self
    }

    /// Register the prior installed set and prefer it during selection.
    pub fn prefer_locked(mut self, locked: impl IntoIterator<Item = (String, Version)>) -> Self {
        self.locked = locked
            .into_iter()
            .map(|(name, version)| (name.to_lowercase(), version))
            .collect();
        self.prefer_locked = !self.locked.is_empty();
        self
    }

    /// Order candidate package ids by preference for deciding a
    /// requirement on `required_name`.
    pub fn select_preferred_packages(
        &self,
        pool: &Pool,
        candidates: &[PackageId],
        required_name: Option<&str>,
    ) -> Vec<PackageId> {
        let candidate_set: HashSet<PackageId> = candidates.iter().copied().collect();
        let mut sorted = candidates.to_vec();
        // sort_by is stable, so insertion order settles anything the
        // comparator leaves equal
        sorted.sort_by(|&a, &b| self.compare(pool, &candidate_set, a, b, required_name));
        sorted
    }

    fn compare(
        &self,
        pool: &Pool,
        candidates: &HashSet<PackageId>,
        a: PackageId,
        b: PackageId,
        required_name: Option<&str>,
    ) -> Ordering {
        // rule 1
        let a_key = self.is_preferred_root_alias(pool, candidates, a);
        let b_key = self.is_preferred_root_alias(pool, candidates, b);
        if a_key != b_key {
            return if a_key { Ordering::Less } else { Ordering::Greater };
        }

        // rule 2
        if self.prefer_locked {
            let a_locked = self.is_locked(pool, a);
            let b_locked = self.is_locked(pool, b);
            if a_locked != b_locked {
                return if a_locked { Ordering::Less } else { Ordering::Greater };
            }
        }

        // rule 3
        let repo_order = pool.repo_index(a).cmp(&pool.repo_index(b));
        if repo_order != Ordering::Equal {
            return repo_order;
        }

        let (Some(entry_a), Some(entry_b)) = (pool.entry(a), pool.entry(b)) else {
            return Ordering::Equal;
        };

        if entry_a.name() == entry_b.name() {
            // rule 4
            if self.prefer_stable {
                let a_stable = entry_a.version().is_stable();
                let b_stable = entry_b.version().is_stable();
                if a_stable != b_stable {
                    return if a_stable { Ordering::Less } else { Ordering::Greater };
                }
            }
            // rules 5 and 6
            return self.compare_versions(entry_a.version(), entry_b.version());
        }

        // rule 7: candidates under a replaced name prefer the original
        // name, then replacers from the required vendor
        if let Some(required) = required_name {
            let a_direct = entry_a.name() == required;
            let b_direct = entry_b.name() == required;
            if a_direct != b_direct {
                return if a_direct { Ordering::Less } else { Ordering::Greater };
            }

            if let Some(vendor) = required.split_once('/').map(|(v, _)| v) {
                let a_vendor = entry_a.name().starts_with(vendor)
                    && entry_a.name().as_bytes().get(vendor.len()) == Some(&b'/');
                let b_vendor = entry_b.name().starts_with(vendor)
                    && entry_b.name().as_bytes().get(vendor.len()) == Some(&b'/');
                if a_vendor != b_vendor {
                    return if a_vendor { Ordering::Less } else { Ordering::Greater };
                }
            }
        }

        Ordering::Equal
    }

    fn is_preferred_root_alias(
        &self,
        pool: &Pool,
        candidates: &HashSet<PackageId>,
        id: PackageId,
    ) -> bool {
        pool.is_root_package_alias(id)
            && pool
                .get_alias_base(id)
                .map(|base| candidates.contains(&base))
                .unwrap_or(false)
    }

    fn is_locked(&self, pool: &Pool, id: PackageId) -> bool {
        pool.entry(id)
            .map(|entry| {
                self.locked
                    .contains(&(entry.name().to_string(), entry.version().clone()))
            })
            .unwrap_or(false)
    }

    fn compare_versions(&self, a: &Version, b: &Version) -> Ordering {
        match (a.is_branch(), b.is_branch()) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => {
                if self.prefer_lowest {
                    a.cmp(b)
                } else {
                    b.cmp(a)
                }
            }
        }
    }
}
