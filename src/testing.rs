//! Helpers shared by unit tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::log::InMemoryRaftLog;
use crate::messages::Directed;
use crate::messages::RaftMessage;
use crate::network::Outbound;
use crate::roles::Role;
use crate::state::FollowerStates;
use crate::state::RaftState;
use crate::RaftLogEntry;

crate::declare_raft_types!(
    /// Trivial type config for unit tests: commands and member ids are both `u64`.
    pub(crate) UTConfig: D = u64, MemberId = u64
);

pub(crate) type UTState = RaftState<UTConfig, InMemoryRaftLog<UTConfig>>;

/// An entry of `term` carrying command `v`.
pub(crate) fn ent(term: u64, v: u64) -> RaftLogEntry<UTConfig> {
    RaftLogEntry::normal(term, v)
}

/// Entries whose terms are `terms`, the command of each is its index.
pub(crate) fn ents(terms: &[u64]) -> Vec<RaftLogEntry<UTConfig>> {
    terms.iter().enumerate().map(|(i, t)| ent(*t, i as u64)).collect()
}

/// Build a [`UTState`] for member `myself`; voting and replication members are `members`.
pub(crate) struct StateBuilder {
    state: UTState,
}

impl StateBuilder {
    pub(crate) fn new(myself: u64, members: BTreeSet<u64>) -> Self {
        let state = RaftState::new(myself, 0, None, InMemoryRaftLog::new()).with_members(members.clone(), members);
        Self { state }
    }

    pub(crate) fn term(mut self, term: u64) -> Self {
        self.state.term = term;
        self
    }

    pub(crate) fn voted_for(mut self, v: u64) -> Self {
        self.state.voted_for = Some(v);
        self
    }

    pub(crate) fn role(mut self, role: Role) -> Self {
        self.state.role = role;
        self
    }

    pub(crate) fn leader(mut self, leader: u64) -> Self {
        self.state.leader = Some(leader);
        self
    }

    pub(crate) fn log(mut self, entries: Vec<RaftLogEntry<UTConfig>>, commit_index: Option<u64>) -> Self {
        self.state.log = InMemoryRaftLog::from_parts(entries, commit_index);
        self.state.leader_commit = commit_index;
        self
    }

    pub(crate) fn votes_for_me(mut self, votes: BTreeSet<u64>) -> Self {
        self.state.votes_for_me = votes;
        self
    }

    pub(crate) fn replication_members(mut self, members: BTreeSet<u64>) -> Self {
        self.state.replication_members = members;
        self
    }

    /// Make this member the leader of the configured term, elected when its log ended at
    /// `last_before`.
    pub(crate) fn leading(mut self, last_before: Option<u64>) -> Self {
        let myself = self.state.myself;
        self.state.role = Role::Leader;
        self.state.leader = Some(myself);
        self.state.voted_for = Some(myself);
        self.state.last_log_index_before_we_became_leader = last_before;
        let targets = self.state.replication_members.iter().copied().filter(|m| *m != myself).collect::<Vec<_>>();
        self.state.follower_states = FollowerStates::new(targets, self.state.log.entries().len() as u64);
        self
    }

    pub(crate) fn follower_states(mut self, fs: FollowerStates<UTConfig>) -> Self {
        self.state.follower_states = fs;
        self
    }

    pub(crate) fn build(self) -> UTState {
        self.state
    }
}

/// An outbound transport that records what is sent.
#[derive(Clone, Default)]
pub(crate) struct RecordingOutbound {
    sent: Arc<Mutex<Vec<Directed<UTConfig>>>>,
}

impl RecordingOutbound {
    /// Remove and return everything sent so far.
    pub(crate) fn take(&self) -> Vec<Directed<UTConfig>> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Outbound<UTConfig> for RecordingOutbound {
    fn send(&self, to: u64, message: RaftMessage<UTConfig>) {
        self.sent.lock().unwrap().push(Directed::new(to, message));
    }
}
