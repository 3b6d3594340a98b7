#![doc = include_str!("../README.md")]
#![allow(clippy::bool_assert_comparison, clippy::type_complexity)]

mod config;
mod core;
mod entry;
mod log_index_ext;
mod member_id;
mod quorum;
mod summary;
mod type_config;

pub mod error;
pub mod log;
pub mod membership;
pub mod messages;
pub mod metrics;
pub mod network;
pub mod outcome;
pub mod raft;
pub mod roles;
pub mod shipping;
pub mod state;
pub mod store;
pub mod timer;

#[cfg(test)] mod testing;

pub use anyerror;
pub use anyerror::AnyError;

pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::core::RaftCore;
pub use crate::core::RaftEvent;
pub use crate::entry::CommittedEntry;
pub use crate::entry::EntryPayload;
pub use crate::entry::RaftLogEntry;
pub use crate::log_index_ext::LogIndexOptionExt;
pub use crate::member_id::MemberId;
pub use crate::member_id::MemberIdEssential;
pub use crate::membership::MembershipEvent;
pub use crate::metrics::RaftMetrics;
pub use crate::network::DiscardOutbound;
pub use crate::network::Inbound;
pub use crate::network::Outbound;
pub use crate::outcome::Outcome;
pub use crate::raft::RaftInstance;
pub use crate::raft::RaftInstanceBuilder;
pub use crate::roles::Role;
pub use crate::state::RaftState;
pub use crate::summary::MessageSummary;
pub use crate::type_config::AppData;
pub use crate::type_config::RaftTypeConfig;
