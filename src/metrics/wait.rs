use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::metrics::RaftMetrics;
use crate::roles::Role;
use crate::MessageSummary;
use crate::RaftTypeConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("timeout after {0:?} when {1}")]
    Timeout(Duration, String),

    #[error("raft is shutting down")]
    ShuttingDown,
}

/// Wait is a wrapper of the [`RaftMetrics`] channel that waits for the metrics to satisfy some
/// condition.
pub struct Wait<C: RaftTypeConfig> {
    pub timeout: Duration,
    pub rx: watch::Receiver<RaftMetrics<C>>,
}

impl<C: RaftTypeConfig> Wait<C> {
    /// Wait for metrics to satisfy some condition or timeout.
    #[tracing::instrument(level = "trace", skip(self, func), fields(msg=%msg.to_string()))]
    pub async fn metrics<T>(&self, func: T, msg: impl ToString) -> Result<RaftMetrics<C>, WaitError>
    where T: Fn(&RaftMetrics<C>) -> bool + Send {
        let timeout_at = Instant::now() + self.timeout;

        let mut rx = self.rx.clone();
        loop {
            let latest = rx.borrow().clone();

            tracing::debug!("id={} wait {} latest: {}", latest.id, msg.to_string(), latest.summary());

            if func(&latest) {
                tracing::debug!("id={} done wait {} latest: {}", latest.id, msg.to_string(), latest.summary());
                return Ok(latest);
            }

            let now = Instant::now();
            if now >= timeout_at {
                return Err(WaitError::Timeout(
                    self.timeout,
                    format!("{} latest: {}", msg.to_string(), latest.summary()),
                ));
            }

            let delay = tokio::time::sleep_until(timeout_at);

            tokio::select! {
                _ = delay => {
                    tracing::debug!("id={} timeout wait {} latest: {}", latest.id, msg.to_string(), latest.summary());
                    return Err(WaitError::Timeout(self.timeout, format!("{} latest: {}", msg.to_string(), latest.summary())));
                }
                changed = rx.changed() => {
                    if let Err(err) = changed {
                        tracing::debug!("id={} error: {:?}; wait {} latest: {}", latest.id, err, msg.to_string(), latest.summary());
                        return Err(WaitError::ShuttingDown);
                    }
                }
            };
        }
    }

    /// Wait for `current_leader` to become `Some(leader_id)`.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn current_leader(&self, leader_id: C::MemberId, msg: impl ToString) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.current_leader == Some(leader_id),
            &format!("{} .current_leader -> {}", msg.to_string(), leader_id),
        )
        .await
    }

    /// Wait for any leader to become known.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn some_leader(&self, msg: impl ToString) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.current_leader.is_some(),
            &format!("{} .current_leader -> Some", msg.to_string()),
        )
        .await
    }

    /// Wait for `role` to become `want_role`.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn role(&self, want_role: Role, msg: impl ToString) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.role == want_role,
            &format!("{} .role -> {}", msg.to_string(), want_role),
        )
        .await
    }

    /// Wait until at least `want_index` (inclusive) is committed.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn commit_index_at_least(
        &self,
        want_index: Option<u64>,
        msg: impl ToString,
    ) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.commit_index >= want_index,
            &format!("{} .commit_index >= {:?}", msg.to_string(), want_index),
        )
        .await
    }

    /// Wait until at least `want_index` (inclusive) is appended and handed to the commit stream.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn log_at_least(&self, want_index: Option<u64>, msg: impl ToString) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.append_index >= want_index,
            &format!("{} .append_index >= {:?}", msg.to_string(), want_index),
        )
        .await?;

        self.metrics(
            |x| x.last_applied >= want_index,
            &format!("{} .last_applied >= {:?}", msg.to_string(), want_index),
        )
        .await
    }

    /// Wait for the voting member set to become `want_members`.
    #[tracing::instrument(level = "trace", skip(self), fields(msg=msg.to_string().as_str()))]
    pub async fn voting_members(
        &self,
        want_members: BTreeSet<C::MemberId>,
        msg: impl ToString,
    ) -> Result<RaftMetrics<C>, WaitError> {
        self.metrics(
            |x| x.voting_members == want_members,
            &format!("{} .voting_members -> {:?}", msg.to_string(), want_members),
        )
        .await
    }
}
