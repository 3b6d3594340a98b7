mod follower_state;
mod raft_state;

#[cfg(test)] mod raft_state_test;

pub use follower_state::FollowerState;
pub use follower_state::FollowerStates;
pub use raft_state::RaftState;
