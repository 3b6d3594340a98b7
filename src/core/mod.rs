//! The driver of a core member: the single point where events are serialized and outcomes are
//! applied.

mod raft_core;
mod raft_event;


pub use raft_core::RaftCore;
pub use raft_event::RaftEvent;
