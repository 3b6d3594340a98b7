//! Error types exposed by this crate.

use std::fmt::Debug;

use anyerror::AnyError;

use crate::config::ConfigError;
use crate::RaftTypeConfig;

/// What a storage operation was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSubject {
    /// The replicated log.
    Log,
    /// A single log entry.
    LogEntry(u64),
    /// The persisted current term.
    Term,
    /// The persisted vote.
    Vote,
}

/// What a storage operation was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVerb {
    Read,
    Write,
    Open,
}

/// Failures of the durable log and the term/vote stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The index is before the start of the log or beyond its append index.
    #[error("log index {index} is out of range, append index: {append_index:?}")]
    OutOfRange { index: u64, append_index: Option<u64> },

    /// The log cursor ended before the wanted index.
    #[error("log cursor exhausted before reaching index {index}")]
    CursorExhausted { index: u64 },

    /// A forward scan jumped past the wanted index: the cursor and the log disagree.
    #[error("asked for index {index} but got up to {reached} without finding it")]
    ScanOvershoot { index: u64, reached: u64 },

    /// An append did not land right after the current append index.
    #[error("non-consecutive append: expect index {expect}, got {got}")]
    NonConsecutive { expect: u64, got: u64 },

    /// Truncating below the commit index would drop committed entries.
    #[error("truncating from {from} would drop committed entries up to {committed}")]
    TruncateCommitted { from: u64, committed: u64 },

    #[error("when {verb:?} {subject:?}: {source}")]
    IO {
        subject: ErrorSubject,
        verb: ErrorVerb,
        source: AnyError,
    },
}

impl StorageError {
    pub fn from_io_error(subject: ErrorSubject, verb: ErrorVerb, io_error: std::io::Error) -> Self {
        StorageError::IO {
            subject,
            verb,
            source: AnyError::new(&io_error),
        }
    }

    pub fn from_json_error(subject: ErrorSubject, verb: ErrorVerb, e: serde_json::Error) -> Self {
        StorageError::IO {
            subject,
            verb,
            source: AnyError::new(&e),
        }
    }
}

/// A protocol invariant was broken by a peer or by this node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation<C: RaftTypeConfig> {
    #[error("two leaders in the same term {term}: {other} also claims leadership")]
    TwoLeadersInSameTerm { term: u64, other: C::MemberId },
}

/// Fatal is unrecoverable and shuts down the raft instance at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fatal<C: RaftTypeConfig> {
    #[error(transparent)]
    StorageError(#[from] StorageError),

    #[error(transparent)]
    Violation(#[from] Violation<C>),

    /// The member was built with a config that does not validate.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("panicked")]
    Panicked,

    /// The raft instance stopped normally.
    #[error("raft stopped")]
    Stopped,
}

/// This member is not the leader; retry against `leader_id`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("has to forward request to: {leader_id:?}")]
pub struct ForwardToLeader<C: RaftTypeConfig> {
    pub leader_id: C::MemberId,
}

/// Why a submitted command was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientWriteError<C: RaftTypeConfig> {
    #[error(transparent)]
    ForwardToLeader(#[from] ForwardToLeader<C>),

    /// An election is in progress and there is no leader to forward to.
    #[error("no leader is known, an election may be in progress")]
    NoLeader,

    #[error(transparent)]
    Fatal(#[from] Fatal<C>),
}

/// Why a member admission failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError<C: RaftTypeConfig> {
    #[error("membership changes must be made on the leader; current leader: {leader:?}")]
    NotLeader { leader: Option<C::MemberId> },

    #[error("{member} is already a voting member")]
    AlreadyMember { member: C::MemberId },

    #[error("admission of {member} is already in progress")]
    AdmissionInProgress { member: C::MemberId },

    #[error("{member} did not catch up in time: matched {match_index:?}, leader append index {append_index:?}")]
    CatchupTimeout {
        member: C::MemberId,
        match_index: Option<u64>,
        append_index: Option<u64>,
    },

    #[error("leadership lost while admitting {member}")]
    LeadershipLost { member: C::MemberId },

    #[error(transparent)]
    Fatal(#[from] Fatal<C>),
}
