//! The public handle of a running core member.

mod builder;
mod core_state;
mod raft_inner;


pub use builder::RaftInstanceBuilder;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tokio::sync::watch;

use crate::core::RaftEvent;
use crate::error::ClientWriteError;
use crate::error::MembershipError;
use crate::membership::MembershipEvent;
use crate::messages::RaftMessage;
use crate::metrics::RaftMetrics;
use crate::metrics::Wait;
use crate::metrics::WaitError;
use crate::raft::raft_inner::RaftInner;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// A handle to a core member whose [`RaftCore`](crate::RaftCore) runs on a tokio task.
///
/// Every call is serialized with the messages and timeouts the core handles. The handle is cheap
/// to clone and may be shared across tasks.
///
/// ```ignore
/// let raft = RaftInstanceBuilder::<KvConfig>::new(1, btreeset! {1, 2, 3})
///     .outbound(transport.clone())
///     .inbound(transport)
///     .commit_sink(tx_commit)
///     .build()?;
///
/// let leader = raft.leader().await?;
/// let index = raft.submit("foo".to_string()).await?;
/// ```
pub struct RaftInstance<C>
where C: RaftTypeConfig
{
    inner: Arc<RaftInner<C>>,
}

impl<C> Clone for RaftInstance<C>
where C: RaftTypeConfig
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> RaftInstance<C>
where C: RaftTypeConfig
{
    /// Start building a member `myself` of a group first formed by `initial_voters`.
    pub fn builder(myself: C::MemberId, initial_voters: BTreeSet<C::MemberId>) -> RaftInstanceBuilder<C> {
        RaftInstanceBuilder::new(myself, initial_voters)
    }

    pub fn id(&self) -> C::MemberId {
        self.inner.id
    }

    /// Hand a message received from another member to the core.
    ///
    /// It does not wait for the message to be handled. A message sent after the core stopped is
    /// dropped, the same way the transport may drop it.
    pub fn handle_message(&self, message: RaftMessage<C>) {
        let sum = message.summary();
        if self.inner.tx_api.send(RaftEvent::Message(message)).is_err() {
            tracing::warn!("{} core stopped, drop message: {}", self.inner.id, sum);
        }
    }

    /// Append `command` to the replicated log; returns the index it is appended at.
    ///
    /// Only the leader accepts commands. Any other member answers with
    /// [`ClientWriteError::ForwardToLeader`], or [`ClientWriteError::NoLeader`] while no leader is
    /// known. The command is not committed yet when this returns: committed commands are
    /// delivered in index order to the commit sink.
    #[tracing::instrument(level = "debug", skip_all, fields(id = display(self.inner.id)))]
    pub async fn submit(&self, command: C::D) -> Result<u64, ClientWriteError<C>> {
        let (tx, rx) = oneshot::channel();
        self.inner.call_core(RaftEvent::ClientWrite { command, tx }, rx).await
    }

    /// Admit `member` to the group and return once it votes.
    ///
    /// The member first receives the log without a vote. It becomes a voter once it is within
    /// `catchup_lag_threshold` entries of the leader, and the admission is complete when the
    /// membership entry granting its vote is committed. It fails with
    /// [`MembershipError::CatchupTimeout`] if the member does not catch up within
    /// `catchup_timeout`.
    #[tracing::instrument(level = "debug", skip(self), fields(id = display(self.inner.id)))]
    pub async fn add_member(&self, member: C::MemberId) -> Result<(), MembershipError<C>> {
        // Subscribe before the admission starts, so that no event about it is missed.
        let mut rx_events = self.inner.tx_membership.subscribe();
        let mut rx_metrics = self.inner.rx_metrics.clone();

        let (tx, rx) = oneshot::channel();
        self.inner.call_core(RaftEvent::AddMember { member, tx }, rx).await?;

        loop {
            tokio::select! {
                ev = rx_events.recv() => {
                    match ev {
                        Ok(MembershipEvent::MemberAdmitted { member: m }) if m == member => {
                            return Ok(());
                        }
                        Ok(MembershipEvent::AdmissionFailed { member: m, error }) if m == member => {
                            return Err(error);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(n, "membership events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            let fatal = self.inner.get_core_stopped_error("waiting for admission", None).await;
                            return Err(fatal.into());
                        }
                    }
                }
                changed = rx_metrics.changed() => {
                    if changed.is_err() {
                        let fatal = self.inner.get_core_stopped_error("waiting for admission", None).await;
                        return Err(fatal.into());
                    }
                }
            }
        }
    }

    /// The leader this member currently knows of, without waiting.
    pub fn current_leader(&self) -> Option<C::MemberId> {
        self.inner.rx_metrics.borrow().current_leader
    }

    /// The leader this member knows of, waiting up to `leader_wait_timeout` for one to emerge.
    pub async fn leader(&self) -> Result<C::MemberId, WaitError> {
        let timeout = self.inner.config.leader_wait_timeout();
        let m = self.wait(Some(timeout)).some_leader("leader").await?;
        m.current_leader.ok_or(WaitError::Timeout(timeout, "leader".to_string()))
    }

    /// Subscribe to membership events published from now on.
    pub fn membership_events(&self) -> broadcast::Receiver<MembershipEvent<C>> {
        self.inner.tx_membership.subscribe()
    }

    /// Get a handle to the metrics channel.
    pub fn metrics(&self) -> watch::Receiver<RaftMetrics<C>> {
        self.inner.rx_metrics.clone()
    }

    /// Get a handle to wait for the metrics to satisfy some condition.
    ///
    /// If `timeout` is `None`, it waits for 500 ms.
    ///
    /// ```ignore
    /// // wait for log index 3 to be committed:
    /// r.wait(Some(timeout)).commit_index_at_least(Some(3), "commit").await?;
    /// ```
    pub fn wait(&self, timeout: Option<Duration>) -> Wait<C> {
        self.inner.wait(timeout)
    }

    /// Shutdown this member.
    ///
    /// It sends a shutdown signal and waits until `RaftCore` returns.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.inner.tx_shutdown.lock().await.take() {
            // A failure to send means the RaftCore is already shutdown. Continue to check the task
            // return value.
            let send_res = tx.send(());
            tracing::info!("sending shutdown signal to RaftCore, sending res: {:?}", send_res);
        }
        self.inner.join_core_task().await;
    }
}
