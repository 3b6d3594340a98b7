use std::collections::BTreeSet;
use std::fmt;

use crate::error::MembershipError;
use crate::RaftTypeConfig;

/// Published on the membership events channel of a raft instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent<C: RaftTypeConfig> {
    /// The voting or replication member set changed.
    MembersChanged {
        voting: BTreeSet<C::MemberId>,
        replication: BTreeSet<C::MemberId>,
    },

    /// The membership entry that made `member` a voter is committed.
    MemberAdmitted { member: C::MemberId },

    /// `member` was not admitted; the admission may be retried.
    AdmissionFailed {
        member: C::MemberId,
        error: MembershipError<C>,
    },
}

impl<C: RaftTypeConfig> fmt::Display for MembershipEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MembershipEvent::MembersChanged { voting, replication } => {
                write!(f, "MembersChanged: voting: {:?}, replication: {:?}", voting, replication)
            }
            MembershipEvent::MemberAdmitted { member } => write!(f, "MemberAdmitted: {}", member),
            MembershipEvent::AdmissionFailed { member, error } => write!(f, "AdmissionFailed: {}: {}", member, error),
        }
    }
}
