use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::StorageError;
use crate::log::ReadableRaftLog;
use crate::messages::Heartbeat;
use crate::messages::RaftMessage;
use crate::network::Outbound;
use crate::shipping::shipper::ShipContext;
use crate::shipping::LogShipper;
use crate::timer::TimeoutName;
use crate::timer::TimeoutService;
use crate::RaftLogEntry;
use crate::RaftTypeConfig;

/// Called from the timer context when the retry timeout of a follower's shipper fires.
pub type RetryNotify<C> = Arc<dyn Fn(<C as RaftTypeConfig>::MemberId) + Send + Sync + 'static>;

/// Owns the shippers of a leader, one per replication target.
///
/// It runs only while this member leads; every command is ignored otherwise.
pub struct LogShippingManager<C: RaftTypeConfig> {
    myself: C::MemberId,
    outbound: Arc<dyn Outbound<C>>,
    timeout_service: Arc<dyn TimeoutService>,
    retry_notify: RetryNotify<C>,
    retry_time: Duration,
    max_payload_entries: u64,

    /// The term of the leadership shipping runs for.
    running_term: Option<u64>,

    shippers: BTreeMap<C::MemberId, LogShipper<C>>,
}

impl<C: RaftTypeConfig> LogShippingManager<C> {
    pub fn new(
        myself: C::MemberId,
        outbound: Arc<dyn Outbound<C>>,
        timeout_service: Arc<dyn TimeoutService>,
        retry_notify: RetryNotify<C>,
        config: &Config,
    ) -> Self {
        Self {
            myself,
            outbound,
            timeout_service,
            retry_notify,
            retry_time: config.retry_time(),
            max_payload_entries: config.max_payload_entries,
            running_term: None,
            shippers: BTreeMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_term.is_some()
    }

    pub fn shipper(&self, target: &C::MemberId) -> Option<&LogShipper<C>> {
        self.shippers.get(target)
    }

    pub fn targets(&self) -> BTreeSet<C::MemberId> {
        self.shippers.keys().copied().collect()
    }

    /// Start shipping for leadership of `term` to every member of `targets`.
    #[tracing::instrument(level = "debug", skip_all, fields(term = term))]
    pub fn start<L: ReadableRaftLog<C>>(
        &mut self,
        term: u64,
        targets: impl IntoIterator<Item = C::MemberId>,
        log: &L,
    ) -> Result<(), StorageError> {
        self.shippers.clear();
        self.running_term = Some(term);

        for target in targets {
            self.add_target(target, term, log)?;
        }
        tracing::info!("{} starts shipping to {:?}", self.myself, self.targets());
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.running_term.take().is_some() {
            tracing::info!("{} stops shipping", self.myself);
        }
        self.shippers.clear();
    }

    /// Ship to exactly `targets`: start new shippers and stop the removed ones.
    pub fn sync_targets<L: ReadableRaftLog<C>>(
        &mut self,
        targets: &BTreeSet<C::MemberId>,
        log: &L,
    ) -> Result<(), StorageError> {
        let Some(term) = self.running_term else {
            return Ok(());
        };

        self.shippers.retain(|t, _| targets.contains(t));

        let myself = self.myself;
        for target in targets.iter().filter(|t| **t != myself) {
            if !self.shippers.contains_key(target) {
                tracing::info!("{} starts shipping to {}", self.myself, target);
                self.add_target(*target, term, log)?;
            }
        }
        Ok(())
    }

    pub fn on_match<L: ReadableRaftLog<C>>(
        &mut self,
        target: C::MemberId,
        index: Option<u64>,
        log: &L,
    ) -> Result<(), StorageError> {
        let Some(term) = self.running_term else {
            return Ok(());
        };
        let ctx = ShipContext {
            myself: self.myself,
            term,
            log,
            outbound: self.outbound.as_ref(),
            max_payload_entries: self.max_payload_entries,
        };

        match self.shippers.get_mut(&target) {
            Some(s) => s.on_match(index, &ctx),
            None => Ok(()),
        }
    }

    pub fn on_mismatch<L: ReadableRaftLog<C>>(&mut self, target: C::MemberId, hint: Option<u64>, log: &L) {
        let Some(term) = self.running_term else {
            return;
        };
        let ctx = ShipContext {
            myself: self.myself,
            term,
            log,
            outbound: self.outbound.as_ref(),
            max_payload_entries: self.max_payload_entries,
        };

        if let Some(s) = self.shippers.get_mut(&target) {
            s.on_mismatch(hint, &ctx);
        }
    }

    /// Push a freshly appended entry to every follower that is streaming and has everything
    /// before it.
    pub fn on_new_entry<L: ReadableRaftLog<C>>(
        &mut self,
        prev_index: Option<u64>,
        prev_term: u64,
        entry: &RaftLogEntry<C>,
        log: &L,
    ) {
        let Some(term) = self.running_term else {
            return;
        };
        let ctx = ShipContext {
            myself: self.myself,
            term,
            log,
            outbound: self.outbound.as_ref(),
            max_payload_entries: self.max_payload_entries,
        };

        for s in self.shippers.values_mut() {
            s.on_new_entry(prev_index, prev_term, entry, &ctx);
        }
    }

    /// Tell every follower the new commit index with a heartbeat.
    pub fn on_commit_update<L: ReadableRaftLog<C>>(&mut self, log: &L) -> Result<(), StorageError> {
        let Some(term) = self.running_term else {
            return Ok(());
        };

        let commit_index = log.commit_index();
        let commit_index_term = log.term_at(commit_index)?;

        for target in self.shippers.keys() {
            self.outbound.send(
                *target,
                RaftMessage::Heartbeat(Heartbeat {
                    from: self.myself,
                    leader_term: term,
                    commit_index,
                    commit_index_term,
                }),
            );
        }
        Ok(())
    }

    /// The retry timeout of `target`'s shipper fired.
    pub fn on_retry<L: ReadableRaftLog<C>>(&mut self, target: C::MemberId, log: &L) -> Result<(), StorageError> {
        let Some(term) = self.running_term else {
            return Ok(());
        };
        let ctx = ShipContext {
            myself: self.myself,
            term,
            log,
            outbound: self.outbound.as_ref(),
            max_payload_entries: self.max_payload_entries,
        };

        match self.shippers.get_mut(&target) {
            Some(s) => s.on_retry(&ctx),
            None => Ok(()),
        }
    }

    fn add_target<L: ReadableRaftLog<C>>(&mut self, target: C::MemberId, term: u64, log: &L) -> Result<(), StorageError> {
        let notify = self.retry_notify.clone();
        let retry = self.timeout_service.create(
            TimeoutName::ShippingRetry,
            self.retry_time,
            Duration::ZERO,
            Arc::new(move |_: TimeoutName| notify(target)),
        );

        let mut shipper = LogShipper::new(target, retry);
        let ctx = ShipContext {
            myself: self.myself,
            term,
            log,
            outbound: self.outbound.as_ref(),
            max_payload_entries: self.max_payload_entries,
        };
        shipper.start(&ctx)?;

        self.shippers.insert(target, shipper);
        Ok(())
    }
}
