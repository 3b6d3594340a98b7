use std::fmt;

use tokio::sync::oneshot;

use crate::error::ClientWriteError;
use crate::error::MembershipError;
use crate::messages::RaftMessage;
use crate::timer::TimeoutName;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// An event handled by [`RaftCore`](crate::RaftCore), one at a time.
pub enum RaftEvent<C: RaftTypeConfig> {
    /// A message from another member.
    Message(RaftMessage<C>),

    /// The election or heartbeat timeout fired in arming `generation`.
    Timeout { name: TimeoutName, generation: u64 },

    /// The shipping retry timeout of `target` fired.
    ShippingRetry { target: C::MemberId },

    /// Submit a command; replied with the index it is appended at.
    ClientWrite {
        command: C::D,
        tx: oneshot::Sender<Result<u64, ClientWriteError<C>>>,
    },

    /// Start admitting `member`; replied once the admission started.
    AddMember {
        member: C::MemberId,
        tx: oneshot::Sender<Result<(), MembershipError<C>>>,
    },
}

impl<C: RaftTypeConfig> fmt::Debug for RaftEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

impl<C: RaftTypeConfig> MessageSummary for RaftEvent<C> {
    fn summary(&self) -> String {
        match self {
            RaftEvent::Message(m) => format!("Message: {}", m.summary()),
            RaftEvent::Timeout { name, generation } => format!("Timeout: {}@{}", name, generation),
            RaftEvent::ShippingRetry { target } => format!("ShippingRetry: {}", target),
            RaftEvent::ClientWrite { .. } => "ClientWrite".to_string(),
            RaftEvent::AddMember { member, .. } => format!("AddMember: {}", member),
        }
    }
}
