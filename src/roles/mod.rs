//! Role handlers: pure functions from a message and the current state to an [`Outcome`].
//!
//! A handler never performs I/O and never mutates state. Reading the log may fail, which is
//! reported as a [`Fatal`] error.

mod candidate;
mod common;
mod follower;
mod leader;


use crate::error::Fatal;
use crate::log::ReadableRaftLog;
use crate::messages::RaftMessage;
use crate::outcome::Outcome;
use crate::state::RaftState;
use crate::RaftTypeConfig;

/// The role a core member plays in its current term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(derive_more::Display)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Role {
    #[default]
    Follower,
    Candidate,
    Leader,
}

impl Role {
    /// Decide what `message` does to `state` when this member plays `self`.
    #[tracing::instrument(level = "debug", skip_all, fields(role = %self))]
    pub fn handle<C, L>(self, message: RaftMessage<C>, state: &RaftState<C, L>) -> Result<Outcome<C>, Fatal<C>>
    where
        C: RaftTypeConfig,
        L: ReadableRaftLog<C>,
    {
        match self {
            Role::Follower => follower::handle(message, state),
            Role::Candidate => candidate::handle(message, state),
            Role::Leader => leader::handle(message, state),
        }
    }

    pub fn is_leader(&self) -> bool {
        *self == Role::Leader
    }
}
