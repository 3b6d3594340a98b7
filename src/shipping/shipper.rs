use std::fmt;

use crate::error::StorageError;
use crate::log::ReadableRaftLog;
use crate::log_index_ext::last_index_after;
use crate::messages::AppendEntriesRequest;
use crate::messages::RaftMessage;
use crate::network::Outbound;
use crate::timer::RenewableTimeout;
use crate::LogIndexOptionExt;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(derive_more::Display)]
pub enum ShipMode {
    /// Searching for the last index the follower shares with the leader.
    Mismatch,

    /// The follower matches; entries are streamed.
    Pipeline,
}

/// What a shipper needs from the leader to send a request.
pub(crate) struct ShipContext<'a, C: RaftTypeConfig, L> {
    pub(crate) myself: C::MemberId,
    pub(crate) term: u64,
    pub(crate) log: &'a L,
    pub(crate) outbound: &'a dyn Outbound<C>,
    pub(crate) max_payload_entries: u64,
}

/// Replication state of one follower.
pub struct LogShipper<C: RaftTypeConfig> {
    target: C::MemberId,
    mode: ShipMode,

    /// The last index the follower confirmed.
    match_index: Option<u64>,

    /// In pipeline mode the last index sent; in mismatch mode the index to probe at.
    last_sent_index: Option<u64>,

    retry: Box<dyn RenewableTimeout>,
}

impl<C: RaftTypeConfig> fmt::Display for LogShipper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogShipper({}, {}, matched: {:?}, sent: {:?})",
            self.target, self.mode, self.match_index, self.last_sent_index
        )
    }
}

impl<C: RaftTypeConfig> LogShipper<C> {
    pub(crate) fn new(target: C::MemberId, retry: Box<dyn RenewableTimeout>) -> Self {
        Self {
            target,
            mode: ShipMode::Mismatch,
            match_index: None,
            last_sent_index: None,
            retry,
        }
    }

    pub fn target(&self) -> C::MemberId {
        self.target
    }

    pub fn mode(&self) -> ShipMode {
        self.mode
    }

    pub fn match_index(&self) -> Option<u64> {
        self.match_index
    }

    pub fn last_sent_index(&self) -> Option<u64> {
        self.last_sent_index
    }

    /// Probe the follower at the leader's append index.
    pub(crate) fn start<L: ReadableRaftLog<C>>(&mut self, ctx: &ShipContext<'_, C, L>) -> Result<(), StorageError> {
        let append_index = ctx.log.append_index();
        self.mode = ShipMode::Mismatch;
        self.last_sent_index = append_index;
        self.send_from(append_index, ctx)?;
        self.retry.renew();
        Ok(())
    }

    pub(crate) fn on_match<L: ReadableRaftLog<C>>(
        &mut self,
        index: Option<u64>,
        ctx: &ShipContext<'_, C, L>,
    ) -> Result<(), StorageError> {
        if index > self.match_index {
            self.match_index = index;
        }
        self.mode = ShipMode::Pipeline;
        if self.last_sent_index < self.match_index {
            self.last_sent_index = self.match_index;
        }

        if self.match_index >= ctx.log.append_index() {
            tracing::debug!("{} is up to date", self);
            self.retry.cancel();
            return Ok(());
        }

        // Send the next batch only when everything sent so far is confirmed.
        if self.last_sent_index == self.match_index {
            self.last_sent_index = self.send_from(self.match_index, ctx)?;
        }
        self.retry.renew();
        Ok(())
    }

    /// The follower can match at most `hint`: rewind, and resend when the retry timer fires.
    pub(crate) fn on_mismatch<L: ReadableRaftLog<C>>(&mut self, hint: Option<u64>, ctx: &ShipContext<'_, C, L>) {
        self.mode = ShipMode::Mismatch;
        self.last_sent_index = hint.min(ctx.log.append_index()).max(self.match_index);

        tracing::debug!("{} rewinds", self);
        self.retry.renew();
    }

    pub(crate) fn on_new_entry<L: ReadableRaftLog<C>>(
        &mut self,
        prev_index: Option<u64>,
        prev_term: u64,
        entry: &RaftLogEntry<C>,
        ctx: &ShipContext<'_, C, L>,
    ) {
        if self.mode != ShipMode::Pipeline || self.last_sent_index != prev_index {
            // Catches up through matches and retries instead.
            return;
        }

        ctx.outbound.send(
            self.target,
            RaftMessage::AppendEntriesRequest(AppendEntriesRequest {
                leader_term: ctx.term,
                leader_id: ctx.myself,
                prev_log_index: prev_index,
                prev_log_term: prev_term,
                entries: vec![entry.clone()],
                leader_commit: ctx.log.commit_index(),
            }),
        );
        self.last_sent_index = Some(prev_index.next_index());
        self.retry.renew();
    }

    pub(crate) fn on_retry<L: ReadableRaftLog<C>>(&mut self, ctx: &ShipContext<'_, C, L>) -> Result<(), StorageError> {
        tracing::debug!("{} retries", self);

        match self.mode {
            ShipMode::Mismatch => {
                self.send_from(self.last_sent_index, ctx)?;
            }
            ShipMode::Pipeline => {
                self.last_sent_index = self.send_from(self.match_index, ctx)?;
            }
        }
        self.retry.renew();
        Ok(())
    }

    /// Send the entries following `prev_index`, at most one batch; returns the last index sent.
    fn send_from<L: ReadableRaftLog<C>>(
        &self,
        prev_index: Option<u64>,
        ctx: &ShipContext<'_, C, L>,
    ) -> Result<Option<u64>, StorageError> {
        let prev_log_term = ctx.log.term_at(prev_index)?;
        let start = prev_index.next_index();

        let entries = match ctx.log.append_index() {
            Some(last) if last >= start => {
                let end = last.min(start + ctx.max_payload_entries - 1);
                ctx.log.read_range(start, end)?
            }
            _ => vec![],
        };
        let last_sent = last_index_after(prev_index, entries.len());

        tracing::debug!(?prev_index, n = entries.len(), "ship to {}", self.target);

        ctx.outbound.send(
            self.target,
            RaftMessage::AppendEntriesRequest(AppendEntriesRequest {
                leader_term: ctx.term,
                leader_id: ctx.myself,
                prev_log_index: prev_index,
                prev_log_term,
                entries,
                leader_commit: ctx.log.commit_index(),
            }),
        );
        Ok(last_sent)
    }
}
