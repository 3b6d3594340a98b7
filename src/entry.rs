use std::collections::BTreeSet;
use std::fmt;

use crate::MessageSummary;
use crate::RaftTypeConfig;

/// What a log entry carries.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub enum EntryPayload<C: RaftTypeConfig> {
    /// An application command, delivered to the commit stream once committed.
    Normal(C::D),

    /// The voting member set that takes effect as soon as the entry is appended.
    Membership(BTreeSet<C::MemberId>),
}

impl<C: RaftTypeConfig> MessageSummary for EntryPayload<C> {
    fn summary(&self) -> String {
        match self {
            EntryPayload::Normal(_) => "normal".to_string(),
            EntryPayload::Membership(members) => format!("membership: {:?}", members),
        }
    }
}

/// A `(term, payload)` pair. The index of an entry is its position in the log, it is not stored.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct RaftLogEntry<C: RaftTypeConfig> {
    pub term: u64,
    pub payload: EntryPayload<C>,
}

impl<C: RaftTypeConfig> RaftLogEntry<C> {
    pub fn new(term: u64, payload: EntryPayload<C>) -> Self {
        Self { term, payload }
    }

    pub fn normal(term: u64, command: C::D) -> Self {
        Self::new(term, EntryPayload::Normal(command))
    }

    pub fn membership(term: u64, members: BTreeSet<C::MemberId>) -> Self {
        Self::new(term, EntryPayload::Membership(members))
    }
}

impl<C: RaftTypeConfig> fmt::Display for RaftLogEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}:{}", self.term, self.payload.summary())
    }
}

impl<C: RaftTypeConfig> MessageSummary for RaftLogEntry<C> {
    fn summary(&self) -> String {
        self.to_string()
    }
}

/// A committed application command handed to the layer above, in strictly increasing index order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEntry<C: RaftTypeConfig> {
    pub index: u64,
    pub command: C::D,
}
