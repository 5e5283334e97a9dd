use crate::types::{CutoffRecord, GroupKey};
use std::collections::{BTreeSet, HashMap};

/// Known filter values for one state, derived from the same records the
/// index is built from. Used to tell a caller-input error apart from an
/// empty result.
#[derive(Debug, Default, Clone)]
pub struct StateDomain {
    pub quotas: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub rounds: BTreeSet<u32>,
}

/// Query-optimized view over the normalized records: each
/// `(state, quota, category, round)` group sorted ascending by closing rank.
/// Derived state: rebuilt wholesale and swapped atomically, never patched.
#[derive(Debug, Default)]
pub struct EligibilityIndex {
    groups: HashMap<GroupKey, Vec<CutoffRecord>>,
    states: HashMap<String, StateDomain>,
}

impl EligibilityIndex {
    pub fn build(records: Vec<CutoffRecord>) -> Self {
        let mut groups: HashMap<GroupKey, Vec<CutoffRecord>> = HashMap::new();
        let mut states: HashMap<String, StateDomain> = HashMap::new();

        for record in records {
            let domain = states.entry(record.state.clone()).or_default();
            domain.quotas.insert(record.quota.key());
            domain.categories.insert(record.category.clone());
            domain.rounds.insert(record.round);
            groups.entry(record.group_key()).or_default().push(record);
        }

        for group in groups.values_mut() {
            group.sort_by(|a, b| {
                a.closing_rank
                    .cmp(&b.closing_rank)
                    .then_with(|| a.program_name.cmp(&b.program_name))
                    .then_with(|| a.location.cmp(&b.location))
            });
        }

        Self { groups, states }
    }

    pub fn group(&self, key: &GroupKey) -> Option<&[CutoffRecord]> {
        self.groups.get(key).map(|g| g.as_slice())
    }

    pub fn state(&self, state: &str) -> Option<&StateDomain> {
        self.states.get(state)
    }

    /// Most recent counseling round known for a state; the default when a
    /// query omits the round.
    pub fn latest_round(&self, state: &str) -> Option<u32> {
        self.states
            .get(state)
            .and_then(|domain| domain.rounds.iter().next_back().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
