//! The result of handling one message: a complete description of a state transition.

use std::collections::BTreeSet;

use crate::log::ReadableRaftLog;
use crate::messages::Directed;
use crate::messages::RaftMessage;
use crate::roles::Role;
use crate::state::FollowerStates;
use crate::state::RaftState;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// A log mutation, applied in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum LogCommand<C: RaftTypeConfig> {
    Append { index: u64, entry: RaftLogEntry<C> },
    Truncate { from_index: u64 },
    Commit { index: u64 },
}

/// An instruction to the log shipping manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ShipCommand<C: RaftTypeConfig> {
    /// `target` holds every entry up to `index`.
    Match { index: Option<u64>, target: C::MemberId },

    /// `target` rejected an append; it can match at most `last_remote_append_index`.
    Mismatch {
        last_remote_append_index: Option<u64>,
        target: C::MemberId,
    },

    /// A new entry was appended by the leader right after `prev_index`.
    NewEntry {
        prev_index: Option<u64>,
        prev_term: u64,
        entry: RaftLogEntry<C>,
    },

    /// The leader's commit index advanced.
    CommitUpdate,
}

/// Everything a role handler decided, applied exactly once by the driver.
///
/// An outcome starts as a copy of the current state and handlers change only what the message
/// changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<C: RaftTypeConfig> {
    pub next_role: Role,
    pub term: u64,
    pub leader: Option<C::MemberId>,
    pub leader_commit: Option<u64>,
    pub voted_for: Option<C::MemberId>,
    pub votes_for_me: BTreeSet<C::MemberId>,
    pub last_log_index_before_we_became_leader: Option<u64>,
    pub follower_states: FollowerStates<C>,
    pub renew_election_timeout: bool,
    pub log_commands: Vec<LogCommand<C>>,
    pub outgoing_messages: Vec<Directed<C>>,
    pub ship_commands: Vec<ShipCommand<C>>,
}

impl<C: RaftTypeConfig> Outcome<C> {
    pub fn new<L: ReadableRaftLog<C>>(role: Role, state: &RaftState<C, L>) -> Self {
        Self {
            next_role: role,
            term: state.term(),
            leader: state.leader(),
            leader_commit: state.leader_commit(),
            voted_for: state.voted_for(),
            votes_for_me: state.votes_for_me().clone(),
            last_log_index_before_we_became_leader: state.last_log_index_before_we_became_leader(),
            follower_states: state.follower_states().clone(),
            renew_election_timeout: false,
            log_commands: vec![],
            outgoing_messages: vec![],
            ship_commands: vec![],
        }
    }

    /// Move to a newer term: the vote and the leader belong to the old one.
    pub(crate) fn adopt_term(&mut self, term: u64) {
        debug_assert!(term > self.term);
        self.term = term;
        self.voted_for = None;
        self.leader = None;
    }

    /// Become follower, dropping candidate and leader bookkeeping.
    pub(crate) fn step_down(&mut self) {
        self.next_role = Role::Follower;
        self.votes_for_me.clear();
        self.follower_states = FollowerStates::default();
        self.last_log_index_before_we_became_leader = None;
    }

    pub(crate) fn send(&mut self, to: C::MemberId, message: RaftMessage<C>) {
        self.outgoing_messages.push(Directed::new(to, message));
    }

    pub(crate) fn log(&mut self, cmd: LogCommand<C>) {
        self.log_commands.push(cmd);
    }

    pub(crate) fn ship(&mut self, cmd: ShipCommand<C>) {
        self.ship_commands.push(cmd);
    }
}
