//! The transport seen by a raft instance.
//!
//! Delivery is not guaranteed in either direction: the protocol tolerates lost, duplicated and
//! reordered messages through retries and timeouts.

use crate::messages::RaftMessage;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// Sends messages to other members. A send is fire-and-forget and must not block.
pub trait Outbound<C: RaftTypeConfig>: Send + Sync + 'static {
    fn send(&self, to: C::MemberId, message: RaftMessage<C>);
}

/// Receives a message addressed to this member.
pub type InboundHandler<C> = Box<dyn Fn(RaftMessage<C>) + Send + Sync + 'static>;

/// Delivers messages addressed to this member to the subscribed handler.
pub trait Inbound<C: RaftTypeConfig>: Send + Sync + 'static {
    fn subscribe(&self, handler: InboundHandler<C>);
}

/// An [`Outbound`] that drops every message; a member using it can only lead itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardOutbound;

impl<C: RaftTypeConfig> Outbound<C> for DiscardOutbound {
    fn send(&self, to: C::MemberId, message: RaftMessage<C>) {
        tracing::debug!("no transport, discard message to {}: {}", to, message.summary());
    }
}
