use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::core::RaftEvent;
use crate::error::ClientWriteError;
use crate::error::Fatal;
use crate::error::ForwardToLeader;
use crate::error::MembershipError;
use crate::error::StorageError;
use crate::log::RaftLog;
use crate::log::ReadableRaftLog;
use crate::membership::MembershipEvent;
use crate::membership::MembershipManager;
use crate::messages::NewEntryRequest;
use crate::messages::RaftMessage;
use crate::metrics::RaftMetrics;
use crate::network::Outbound;
use crate::outcome::LogCommand;
use crate::outcome::Outcome;
use crate::outcome::ShipCommand;
use crate::shipping::LogShippingManager;
use crate::shipping::RetryNotify;
use crate::state::RaftState;
use crate::store::TermStore;
use crate::store::VoteStore;
use crate::timer::RenewableTimeout;
use crate::timer::StampedTimeout;
use crate::timer::TimeoutName;
use crate::timer::TimeoutService;
use crate::CommittedEntry;
use crate::EntryPayload;
use crate::LogIndexOptionExt;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// The driver of one core member.
///
/// Every message, timeout and client call goes through [`RaftCore::handle_event`], one at a time.
/// The current role's handler computes an [`Outcome`], which is then applied exactly once, in
/// this order: term and vote are persisted, log commands are applied, the state takes over the
/// outcome, shipping starts or stops on a leadership change, ship commands are executed,
/// messages are sent, the election timer is renewed and newly committed commands are delivered.
///
/// Messages the outcome addresses to this member itself are handled right after, before the
/// next event.
pub struct RaftCore<C, L>
where
    C: RaftTypeConfig,
    L: RaftLog<C>,
{
    id: C::MemberId,

    config: Arc<Config>,

    state: RaftState<C, L>,

    term_store: Box<dyn TermStore>,
    vote_store: Box<dyn VoteStore<C::MemberId>>,

    membership: MembershipManager<C>,
    shipping: LogShippingManager<C>,

    outbound: Arc<dyn Outbound<C>>,

    timeout_service: Arc<dyn TimeoutService>,

    /// Firings stamped with an older generation were overtaken by a renewal and are dropped.
    election_timer: StampedTimeout,

    /// Armed only while this member leads.
    heartbeat_timer: Option<StampedTimeout>,

    /// Timeouts fired by the timeout service are fed back through this channel.
    tx_events: mpsc::UnboundedSender<RaftEvent<C>>,

    commit_sink: Option<mpsc::UnboundedSender<CommittedEntry<C>>>,

    /// The last index handed to the commit sink.
    last_applied: Option<u64>,

    /// Messages addressed to this member, handled before the next event.
    self_queue: VecDeque<RaftMessage<C>>,

    tx_metrics: watch::Sender<RaftMetrics<C>>,
}

impl<C, L> RaftCore<C, L>
where
    C: RaftTypeConfig,
    L: RaftLog<C> + Send + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<Config>,
        state: RaftState<C, L>,
        term_store: Box<dyn TermStore>,
        vote_store: Box<dyn VoteStore<C::MemberId>>,
        membership: MembershipManager<C>,
        outbound: Arc<dyn Outbound<C>>,
        timeout_service: Arc<dyn TimeoutService>,
        commit_sink: Option<mpsc::UnboundedSender<CommittedEntry<C>>>,
        last_applied: Option<u64>,
        tx_events: mpsc::UnboundedSender<RaftEvent<C>>,
    ) -> Result<Self, Fatal<C>> {
        let id = state.myself();

        let election_timer = StampedTimeout::create(
            timeout_service.as_ref(),
            TimeoutName::Election,
            config.election_timeout(),
            config.election_timeout_jitter(),
            Self::timeout_notify(&tx_events),
        );

        let retry_tx = tx_events.clone();
        let retry_notify: RetryNotify<C> = Arc::new(move |target: C::MemberId| {
            let _ = retry_tx.send(RaftEvent::ShippingRetry { target });
        });
        let shipping = LogShippingManager::new(id, outbound.clone(), timeout_service.clone(), retry_notify, &config);

        let (tx_metrics, _) = watch::channel(RaftMetrics::new_initial(id));

        let mut this = Self {
            id,
            config,
            state,
            term_store,
            vote_store,
            membership,
            shipping,
            outbound,
            timeout_service,
            election_timer,
            heartbeat_timer: None,
            tx_events,
            commit_sink,
            last_applied,
            self_queue: VecDeque::new(),
            tx_metrics,
        };

        // Committed entries after `last_applied` are delivered again after a restart.
        this.deliver_committed()?;
        this.report_metrics();

        Ok(this)
    }

    pub fn id(&self) -> C::MemberId {
        self.id
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn state(&self) -> &RaftState<C, L> {
        &self.state
    }

    pub fn membership(&self) -> &MembershipManager<C> {
        &self.membership
    }

    pub fn shipping(&self) -> &LogShippingManager<C> {
        &self.shipping
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn metrics(&self) -> watch::Receiver<RaftMetrics<C>> {
        self.tx_metrics.subscribe()
    }

    /// Subscribe to membership events published from now on.
    pub fn membership_events(&self) -> broadcast::Receiver<MembershipEvent<C>> {
        self.membership.subscribe()
    }

    /// A sender that feeds events to this core.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<RaftEvent<C>> {
        self.tx_events.clone()
    }

    /// Handle one event to completion, including the messages it makes this member send to
    /// itself.
    #[tracing::instrument(level = "debug", skip_all, fields(id = display(self.id), cluster = %self.config.cluster_name))]
    pub fn handle_event(&mut self, event: RaftEvent<C>) -> Result<(), Fatal<C>> {
        tracing::debug!("handle event: {}", event.summary());

        match event {
            RaftEvent::Message(message) => {
                self.handle_message(message)?;
            }
            RaftEvent::Timeout {
                name: TimeoutName::Election,
                generation,
            } => {
                if !self.election_timer.is_current(generation) {
                    tracing::debug!(generation, "election timeout overtaken by a renewal, ignored");
                    return Ok(());
                }
                self.handle_message(RaftMessage::ElectionTimeout)?;
                if !self.state.role().is_leader() {
                    self.election_timer.renew();
                }
            }
            RaftEvent::Timeout {
                name: TimeoutName::Heartbeat,
                generation,
            } => {
                if !self.heartbeat_timer.as_ref().is_some_and(|t| t.is_current(generation)) {
                    tracing::debug!(generation, "stale heartbeat timeout, ignored");
                    return Ok(());
                }
                if self.state.role().is_leader() {
                    self.handle_message(RaftMessage::HeartbeatTimeout)?;
                    self.check_catchup_timeouts()?;
                }
                if let Some(t) = &self.heartbeat_timer {
                    t.renew();
                }
            }
            RaftEvent::Timeout {
                name: TimeoutName::ShippingRetry,
                ..
            } => {
                tracing::warn!("shipping retry without target, ignored");
            }
            RaftEvent::ShippingRetry { target } => {
                self.shipping.on_retry(target, &self.state.log)?;
            }
            RaftEvent::ClientWrite { command, tx } => {
                let res = self.submit(command);
                let fatal = match &res {
                    Err(ClientWriteError::Fatal(f)) => Some(f.clone()),
                    _ => None,
                };
                let _ = tx.send(res);
                if let Some(f) = fatal {
                    return Err(f);
                }
            }
            RaftEvent::AddMember { member, tx } => {
                let res = self.add_member(member);
                let fatal = match &res {
                    Err(MembershipError::Fatal(f)) => Some(f.clone()),
                    _ => None,
                };
                let _ = tx.send(res);
                if let Some(f) = fatal {
                    return Err(f);
                }
            }
        }

        self.report_metrics();
        Ok(())
    }

    /// Append `command` if this member leads; returns the index it is appended at.
    ///
    /// A follower redirects the caller to the leader it knows of.
    pub fn submit(&mut self, command: C::D) -> Result<u64, ClientWriteError<C>> {
        if !self.state.role().is_leader() {
            return match self.state.leader() {
                Some(leader_id) => Err(ForwardToLeader { leader_id }.into()),
                None => Err(ClientWriteError::NoLeader),
            };
        }

        let index = self.state.entry_log().append_index().next_index();

        self.handle_message(RaftMessage::NewEntryRequest(NewEntryRequest {
            from: self.id,
            content: EntryPayload::Normal(command),
        }))?;

        self.report_metrics();
        Ok(index)
    }

    /// Start admitting `member`; it receives the log at once and becomes a voter once caught up.
    pub fn add_member(&mut self, member: C::MemberId) -> Result<(), MembershipError<C>> {
        if !self.state.role().is_leader() {
            return Err(MembershipError::NotLeader {
                leader: self.state.leader(),
            });
        }

        self.membership.start_admission(member, Instant::now())?;
        self.sync_members().map_err(Fatal::from)?;

        self.report_metrics();
        Ok(())
    }

    fn handle_message(&mut self, message: RaftMessage<C>) -> Result<(), Fatal<C>> {
        self.self_queue.push_back(message);

        while let Some(message) = self.self_queue.pop_front() {
            let role = self.state.role();
            tracing::debug!("{} {} handles: {}", role, self.id, message.summary());

            let outcome = role.handle(message, &self.state)?;
            self.apply(outcome)?;
        }
        Ok(())
    }

    fn apply(&mut self, mut outcome: Outcome<C>) -> Result<(), Fatal<C>> {
        let log_commands = std::mem::take(&mut outcome.log_commands);
        let ship_commands = std::mem::take(&mut outcome.ship_commands);
        let outgoing_messages = std::mem::take(&mut outcome.outgoing_messages);

        // Durable before anything is sent.
        if outcome.term != self.state.term() {
            self.term_store.update(outcome.term)?;
        }
        if outcome.term != self.state.term() || outcome.voted_for != self.state.voted_for() {
            self.vote_store.update(outcome.voted_for)?;
        }

        for cmd in log_commands.iter() {
            self.state.apply_log_command(cmd)?;

            match cmd {
                LogCommand::Append { index, entry } => self.membership.on_append(*index, entry),
                LogCommand::Truncate { from_index } => self.membership.on_truncate(*from_index),
                LogCommand::Commit { index } => self.membership.on_commit(*index),
            }
        }

        let was_leader = self.state.role().is_leader();
        self.state.update(&outcome);
        let is_leader = self.state.role().is_leader();

        if !was_leader && is_leader {
            self.on_leader_elected()?;
        } else if was_leader && !is_leader {
            self.on_leader_stepped_down();
        }

        self.sync_members()?;

        for cmd in ship_commands {
            self.ship(cmd)?;
        }

        for directed in outgoing_messages {
            if directed.to == self.id {
                self.self_queue.push_back(directed.message);
            } else {
                self.outbound.send(directed.to, directed.message);
            }
        }

        // A leader runs no election timer.
        if outcome.renew_election_timeout && !is_leader {
            self.election_timer.renew();
        }

        self.deliver_committed()?;
        Ok(())
    }

    fn on_leader_elected(&mut self) -> Result<(), StorageError> {
        tracing::info!(term = self.state.term(), "{} is leader", self.id);

        self.election_timer.cancel();
        self.heartbeat_timer = Some(StampedTimeout::create(
            self.timeout_service.as_ref(),
            TimeoutName::Heartbeat,
            self.config.heartbeat_interval(),
            std::time::Duration::ZERO,
            Self::timeout_notify(&self.tx_events),
        ));

        self.shipping.start(self.state.term(), self.state.replication_targets(), &self.state.log)
    }

    fn on_leader_stepped_down(&mut self) {
        tracing::info!(term = self.state.term(), "{} is no longer leader", self.id);

        self.shipping.stop();
        self.heartbeat_timer = None;
        self.membership.on_leadership_lost();
        self.election_timer.renew();
    }

    fn ship(&mut self, cmd: ShipCommand<C>) -> Result<(), StorageError> {
        match cmd {
            ShipCommand::Match { index, target } => {
                self.shipping.on_match(target, index, &self.state.log)?;

                let append_index = self.state.entry_log().append_index();
                if let Some(voting) = self.membership.on_follower_progress(target, index, append_index) {
                    self.self_queue.push_back(RaftMessage::NewEntryRequest(NewEntryRequest {
                        from: self.id,
                        content: EntryPayload::Membership(voting),
                    }));
                }
            }
            ShipCommand::Mismatch {
                last_remote_append_index,
                target,
            } => {
                self.shipping.on_mismatch(target, last_remote_append_index, &self.state.log);
            }
            ShipCommand::NewEntry {
                prev_index,
                prev_term,
                entry,
            } => {
                self.shipping.on_new_entry(prev_index, prev_term, &entry, &self.state.log);
            }
            ShipCommand::CommitUpdate => {
                self.shipping.on_commit_update(&self.state.log)?;
            }
        }
        Ok(())
    }

    /// Copy the member sets of the membership manager into the state, and keep leader
    /// bookkeeping in line with the replication set.
    fn sync_members(&mut self) -> Result<(), StorageError> {
        let voting = self.membership.voting_members();
        let replication = self.membership.replication_members();

        if *voting == self.state.voting_members && replication == self.state.replication_members {
            return Ok(());
        }

        tracing::info!(?voting, ?replication, "{} members changed", self.id);
        self.state.voting_members = voting.clone();
        self.state.replication_members = replication;

        if self.state.role().is_leader() {
            let next_index = self.state.entry_log().append_index().next_index();
            let targets = self.state.replication_targets().collect::<Vec<_>>();
            for target in targets {
                self.state.follower_states.add(target, next_index);
            }

            let members = &self.state.replication_members;
            self.state.follower_states.retain(|m| members.contains(m));

            self.shipping.sync_targets(&self.state.replication_members, &self.state.log)?;
        }
        Ok(())
    }

    fn check_catchup_timeouts(&mut self) -> Result<(), StorageError> {
        let append_index = self.state.entry_log().append_index();
        if self.membership.check_catchup_timeouts(Instant::now(), &self.state.follower_states, append_index) {
            self.sync_members()?;
        }
        Ok(())
    }

    /// Hand every committed normal command after `last_applied` to the commit sink, in index
    /// order.
    fn deliver_committed(&mut self) -> Result<(), StorageError> {
        let commit_index = self.state.entry_log().commit_index();

        while self.last_applied < commit_index {
            let index = self.last_applied.next_index();
            let entry = self.state.entry_log().read_log_entry(index)?;

            if let EntryPayload::Normal(command) = entry.payload {
                if let Some(sink) = &self.commit_sink {
                    if sink.send(CommittedEntry { index, command }).is_err() {
                        tracing::warn!(index, "commit stream is closed, committed entry dropped");
                    }
                }
            }
            self.last_applied = Some(index);
        }
        Ok(())
    }

    fn report_metrics(&self) {
        let m = RaftMetrics {
            running_state: Ok(()),
            id: self.id,
            current_term: self.state.term(),
            append_index: self.state.entry_log().append_index(),
            commit_index: self.state.entry_log().commit_index(),
            last_applied: self.last_applied,
            role: self.state.role(),
            current_leader: self.state.leader(),
            voting_members: self.state.voting_members().clone(),
            replication_members: self.state.replication_members().clone(),
        };

        {
            let curr = self.tx_metrics.borrow();
            if m == *curr {
                return;
            }
        }

        tracing::debug!("report_metrics: {}", m.summary());
        self.tx_metrics.send_replace(m);
    }

    fn timeout_notify(tx: &mpsc::UnboundedSender<RaftEvent<C>>) -> impl Fn(TimeoutName, u64) + Send + Sync + 'static {
        let tx = tx.clone();
        move |name: TimeoutName, generation: u64| {
            let _ = tx.send(RaftEvent::Timeout { name, generation });
        }
    }

    /// Run the driver until shutdown or a fatal error.
    #[tracing::instrument(level = "debug", skip_all, fields(id = display(self.id), cluster = %self.config.cluster_name))]
    pub(crate) async fn main(
        mut self,
        mut rx_events: mpsc::UnboundedReceiver<RaftEvent<C>>,
        mut rx_shutdown: oneshot::Receiver<()>,
    ) -> Result<(), Fatal<C>> {
        let res = self.do_main(&mut rx_events, &mut rx_shutdown).await;
        self.timeout_service.shutdown();

        match res {
            Ok(()) => {
                tracing::info!("raft core stopped");
                Ok(())
            }
            Err(err) => {
                tracing::error!(?err, "quit RaftCore::main on error");

                let mut curr = self.tx_metrics.borrow().clone();
                curr.running_state = Err(err.clone());
                self.tx_metrics.send_replace(curr);

                Err(err)
            }
        }
    }

    async fn do_main(
        &mut self,
        rx_events: &mut mpsc::UnboundedReceiver<RaftEvent<C>>,
        rx_shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<(), Fatal<C>> {
        tracing::info!(term = self.state.term(), "raft core starts");

        self.timeout_service.start();
        self.report_metrics();

        loop {
            tokio::select! {
                Some(event) = rx_events.recv() => {
                    self.handle_event(event)?;
                }
                _ = &mut *rx_shutdown => {
                    tracing::info!("recv shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}
