use std::collections::BTreeSet;

use crate::error::Fatal;
use crate::roles::Role;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// A set of metrics describing the current state of a core member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaftMetrics<C: RaftTypeConfig> {
    /// `Err` once the driver stopped on a fatal error.
    pub running_state: Result<(), Fatal<C>>,

    pub id: C::MemberId,

    // ---
    // --- data ---
    // ---
    pub current_term: u64,

    /// The index of the last entry in the log.
    pub append_index: Option<u64>,

    pub commit_index: Option<u64>,

    /// The last index handed to the commit stream.
    pub last_applied: Option<u64>,

    // ---
    // --- cluster ---
    // ---
    pub role: Role,

    pub current_leader: Option<C::MemberId>,

    pub voting_members: BTreeSet<C::MemberId>,

    pub replication_members: BTreeSet<C::MemberId>,
}

impl<C: RaftTypeConfig> RaftMetrics<C> {
    pub fn new_initial(id: C::MemberId) -> Self {
        Self {
            running_state: Ok(()),
            id,
            current_term: 0,
            append_index: None,
            commit_index: None,
            last_applied: None,
            role: Role::Follower,
            current_leader: None,
            voting_members: BTreeSet::new(),
            replication_members: BTreeSet::new(),
        }
    }
}

impl<C: RaftTypeConfig> MessageSummary for RaftMetrics<C> {
    fn summary(&self) -> String {
        format!(
            "Metrics{{id:{}, {}, term:{}, append:{:?}, commit:{:?}, applied:{:?}, leader:{:?}, voting:{:?}, replication:{:?}}}",
            self.id,
            self.role,
            self.current_term,
            self.append_index,
            self.commit_index,
            self.last_applied,
            self.current_leader,
            self.voting_members,
            self.replication_members,
        )
    }
}
