//! Raft metrics for observability.
//!
//! A running raft instance publishes [`RaftMetrics`] on a `watch` channel every time they change.
//! It only keeps the latest value: a slow observer may miss intermediate states. [`Wait`] blocks
//! until the metrics satisfy a condition, which is how tests and callers like
//! [`RaftInstance::leader`](crate::RaftInstance::leader) observe the cluster.

mod raft_metrics;
mod wait;


pub use raft_metrics::RaftMetrics;
pub use wait::Wait;
pub use wait::WaitError;
