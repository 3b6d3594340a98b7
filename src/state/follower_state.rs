use std::collections::BTreeMap;

use crate::LogIndexOptionExt;
use crate::RaftTypeConfig;

/// A leader's view of one follower's replication progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowerState {
    /// The last index known to be replicated to the follower.
    pub match_index: Option<u64>,

    /// The next index to send.
    pub next_index: u64,
}

impl FollowerState {
    pub fn new(next_index: u64) -> Self {
        Self {
            match_index: None,
            next_index,
        }
    }
}

/// Leader-only bookkeeping of every replication target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerStates<C: RaftTypeConfig> {
    states: BTreeMap<C::MemberId, FollowerState>,
}

impl<C: RaftTypeConfig> Default for FollowerStates<C> {
    fn default() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }
}

impl<C: RaftTypeConfig> FollowerStates<C> {
    /// Start tracking `targets`, all expected to receive `next_index` next.
    pub fn new(targets: impl IntoIterator<Item = C::MemberId>, next_index: u64) -> Self {
        Self {
            states: targets.into_iter().map(|t| (t, FollowerState::new(next_index))).collect(),
        }
    }

    pub fn get(&self, member: &C::MemberId) -> FollowerState {
        self.states.get(member).copied().unwrap_or_default()
    }

    pub fn contains(&self, member: &C::MemberId) -> bool {
        self.states.contains_key(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&C::MemberId, &FollowerState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Record a successful append up to `match_index`. The match index never goes backward.
    ///
    /// Returns whether the follower made progress.
    pub fn update_matched(&mut self, member: C::MemberId, match_index: Option<u64>) -> bool {
        let st = self.states.entry(member).or_default();
        if match_index <= st.match_index {
            return false;
        }
        st.match_index = match_index;
        st.next_index = match_index.next_index();
        true
    }

    /// Record a rejected append: the follower can match at most `hint`.
    pub fn update_mismatch(&mut self, member: C::MemberId, hint: Option<u64>) {
        let st = self.states.entry(member).or_default();
        let next = hint.next_index().max(st.match_index.next_index());
        st.next_index = st.next_index.min(next);
    }

    /// Start tracking `member` if it is not tracked yet.
    pub fn add(&mut self, member: C::MemberId, next_index: u64) {
        self.states.entry(member).or_insert_with(|| FollowerState::new(next_index));
    }

    /// Keep only the members for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&C::MemberId) -> bool) {
        self.states.retain(|k, _| f(k));
    }
}
