//! The message protocol exchanged between core members.
//!
//! Every message records its sender so that a response can be addressed without consulting the
//! transport.

use std::fmt;

use crate::EntryPayload;
use crate::MessageSummary;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// Ask for a vote in `term`.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct VoteRequest<C: RaftTypeConfig> {
    pub term: u64,
    pub candidate_id: C::MemberId,
    pub last_log_index: Option<u64>,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct VoteResponse<C: RaftTypeConfig> {
    pub from: C::MemberId,
    pub term: u64,
    pub vote_granted: bool,
}

/// Replicate `entries` after `prev_log_index`. An empty `entries` is a consistency probe.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct AppendEntriesRequest<C: RaftTypeConfig> {
    pub leader_term: u64,
    pub leader_id: C::MemberId,
    pub prev_log_index: Option<u64>,
    pub prev_log_term: u64,
    pub entries: Vec<RaftLogEntry<C>>,
    pub leader_commit: Option<u64>,
}

/// Response to [`AppendEntriesRequest`].
///
/// On success `match_index` is the last index known to match the leader. On failure it is the
/// highest index the follower could still match, which the leader rewinds to.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct AppendEntriesResponse<C: RaftTypeConfig> {
    pub from: C::MemberId,
    pub term: u64,
    pub success: bool,
    pub match_index: Option<u64>,
}

/// One-way leader announcement carrying commit progress and no entries.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct Heartbeat<C: RaftTypeConfig> {
    pub from: C::MemberId,
    pub leader_term: u64,
    pub commit_index: Option<u64>,
    pub commit_index_term: u64,
}

/// A client submitted payload, addressed to the believed leader.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct NewEntryRequest<C: RaftTypeConfig> {
    pub from: C::MemberId,
    pub content: EntryPayload<C>,
}

/// Every input a role handler reacts to.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub enum RaftMessage<C: RaftTypeConfig> {
    VoteRequest(VoteRequest<C>),
    VoteResponse(VoteResponse<C>),
    AppendEntriesRequest(AppendEntriesRequest<C>),
    AppendEntriesResponse(AppendEntriesResponse<C>),
    Heartbeat(Heartbeat<C>),
    NewEntryRequest(NewEntryRequest<C>),

    /// Local only: the election timer fired.
    ElectionTimeout,

    /// Local only: the heartbeat timer fired.
    HeartbeatTimeout,
}

impl<C: RaftTypeConfig> RaftMessage<C> {
    /// The term carried by the message, if any.
    pub fn term(&self) -> Option<u64> {
        match self {
            RaftMessage::VoteRequest(m) => Some(m.term),
            RaftMessage::VoteResponse(m) => Some(m.term),
            RaftMessage::AppendEntriesRequest(m) => Some(m.leader_term),
            RaftMessage::AppendEntriesResponse(m) => Some(m.term),
            RaftMessage::Heartbeat(m) => Some(m.leader_term),
            RaftMessage::NewEntryRequest(_) | RaftMessage::ElectionTimeout | RaftMessage::HeartbeatTimeout => None,
        }
    }
}

impl<C: RaftTypeConfig> MessageSummary for RaftMessage<C> {
    fn summary(&self) -> String {
        match self {
            RaftMessage::VoteRequest(m) => format!(
                "VoteRequest{{T{} from {}, last: {:?}-T{}}}",
                m.term, m.candidate_id, m.last_log_index, m.last_log_term
            ),
            RaftMessage::VoteResponse(m) => {
                format!("VoteResponse{{T{} from {}, granted: {}}}", m.term, m.from, m.vote_granted)
            }
            RaftMessage::AppendEntriesRequest(m) => format!(
                "AppendEntriesRequest{{T{} from {}, prev: {:?}-T{}, entries: {}, commit: {:?}}}",
                m.leader_term,
                m.leader_id,
                m.prev_log_index,
                m.prev_log_term,
                m.entries.as_slice().summary(),
                m.leader_commit
            ),
            RaftMessage::AppendEntriesResponse(m) => format!(
                "AppendEntriesResponse{{T{} from {}, success: {}, match: {:?}}}",
                m.term, m.from, m.success, m.match_index
            ),
            RaftMessage::Heartbeat(m) => format!(
                "Heartbeat{{T{} from {}, commit: {:?}-T{}}}",
                m.leader_term, m.from, m.commit_index, m.commit_index_term
            ),
            RaftMessage::NewEntryRequest(m) => format!("NewEntryRequest{{from {}, {}}}", m.from, m.content.summary()),
            RaftMessage::ElectionTimeout => "ElectionTimeout".to_string(),
            RaftMessage::HeartbeatTimeout => "HeartbeatTimeout".to_string(),
        }
    }
}

/// A message addressed to a member.
#[derive(Debug, Clone, PartialEq)]
pub struct Directed<C: RaftTypeConfig> {
    pub to: C::MemberId,
    pub message: RaftMessage<C>,
}

impl<C: RaftTypeConfig> Directed<C> {
    pub fn new(to: C::MemberId, message: RaftMessage<C>) -> Self {
        Self { to, message }
    }
}

impl<C: RaftTypeConfig> fmt::Display for Directed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "to {}: {}", self.to, self.message.summary())
    }
}
