use std::collections::BTreeSet;

use crate::error::StorageError;
use crate::log::InMemoryRaftLog;
use crate::log::RaftLog;
use crate::log::ReadableRaftLog;
use crate::outcome::LogCommand;
use crate::outcome::Outcome;
use crate::roles::Role;
use crate::state::FollowerStates;
use crate::RaftTypeConfig;

/// The replicated state of one core member.
///
/// It is owned by the raft driver and changed only by applying an [`Outcome`]. Role handlers see
/// it through a shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RaftState<C: RaftTypeConfig, L> {
    pub(crate) myself: C::MemberId,
    pub(crate) term: u64,
    pub(crate) voted_for: Option<C::MemberId>,
    pub(crate) role: Role,
    pub(crate) leader: Option<C::MemberId>,
    pub(crate) leader_commit: Option<u64>,
    pub(crate) last_log_index_before_we_became_leader: Option<u64>,
    pub(crate) votes_for_me: BTreeSet<C::MemberId>,
    pub(crate) follower_states: FollowerStates<C>,
    pub(crate) voting_members: BTreeSet<C::MemberId>,
    pub(crate) replication_members: BTreeSet<C::MemberId>,
    pub(crate) log: L,
}

impl<C, L> RaftState<C, L>
where
    C: RaftTypeConfig,
    L: ReadableRaftLog<C>,
{
    /// A follower in `term` that knows no leader yet.
    pub fn new(myself: C::MemberId, term: u64, voted_for: Option<C::MemberId>, log: L) -> Self {
        Self {
            myself,
            term,
            voted_for,
            role: Role::Follower,
            leader: None,
            leader_commit: log.commit_index(),
            last_log_index_before_we_became_leader: None,
            votes_for_me: BTreeSet::new(),
            follower_states: FollowerStates::default(),
            voting_members: BTreeSet::new(),
            replication_members: BTreeSet::new(),
            log,
        }
    }

    pub fn with_members(mut self, voting: BTreeSet<C::MemberId>, replication: BTreeSet<C::MemberId>) -> Self {
        self.voting_members = voting;
        self.replication_members = replication;
        self
    }

    pub fn myself(&self) -> C::MemberId {
        self.myself
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn voted_for(&self) -> Option<C::MemberId> {
        self.voted_for
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn leader(&self) -> Option<C::MemberId> {
        self.leader
    }

    pub fn leader_commit(&self) -> Option<u64> {
        self.leader_commit
    }

    pub fn last_log_index_before_we_became_leader(&self) -> Option<u64> {
        self.last_log_index_before_we_became_leader
    }

    pub fn votes_for_me(&self) -> &BTreeSet<C::MemberId> {
        &self.votes_for_me
    }

    pub fn follower_states(&self) -> &FollowerStates<C> {
        &self.follower_states
    }

    pub fn voting_members(&self) -> &BTreeSet<C::MemberId> {
        &self.voting_members
    }

    pub fn replication_members(&self) -> &BTreeSet<C::MemberId> {
        &self.replication_members
    }

    /// Every replication member except this one.
    pub fn replication_targets(&self) -> impl Iterator<Item = C::MemberId> + '_ {
        self.replication_members.iter().copied().filter(move |m| *m != self.myself)
    }

    pub fn entry_log(&self) -> &L {
        &self.log
    }

    /// Take over every non-log field of `outcome`.
    pub(crate) fn update(&mut self, outcome: &Outcome<C>) {
        self.role = outcome.next_role;
        self.term = outcome.term;
        self.voted_for = outcome.voted_for;
        self.leader = outcome.leader;
        self.leader_commit = outcome.leader_commit;
        self.last_log_index_before_we_became_leader = outcome.last_log_index_before_we_became_leader;
        self.votes_for_me = outcome.votes_for_me.clone();
        self.follower_states = outcome.follower_states.clone();
    }

    /// Copy this state into one backed by an in-memory log, leaving `self` untouched.
    pub fn clone_state(&self) -> Result<RaftState<C, InMemoryRaftLog<C>>, StorageError> {
        let entries = match self.log.append_index() {
            None => Vec::new(),
            Some(last) => self.log.read_range(0, last)?,
        };

        Ok(RaftState {
            myself: self.myself,
            term: self.term,
            voted_for: self.voted_for,
            role: self.role,
            leader: self.leader,
            leader_commit: self.leader_commit,
            last_log_index_before_we_became_leader: self.last_log_index_before_we_became_leader,
            votes_for_me: self.votes_for_me.clone(),
            follower_states: self.follower_states.clone(),
            voting_members: self.voting_members.clone(),
            replication_members: self.replication_members.clone(),
            log: InMemoryRaftLog::from_parts(entries, self.log.commit_index()),
        })
    }
}

impl<C, L> RaftState<C, L>
where
    C: RaftTypeConfig,
    L: RaftLog<C>,
{
    pub(crate) fn apply_log_command(&mut self, cmd: &LogCommand<C>) -> Result<(), StorageError> {
        match cmd {
            LogCommand::Append { index, entry } => self.log.append(*index, entry.clone()),
            LogCommand::Truncate { from_index } => self.log.truncate(*from_index),
            LogCommand::Commit { index } => self.log.commit(*index),
        }
    }
}
