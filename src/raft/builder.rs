use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::core::RaftCore;
use crate::core::RaftEvent;
use crate::error::Fatal;
use crate::log::InMemoryRaftLog;
use crate::log::RaftLog;
use crate::membership::MembershipEvent;
use crate::membership::MembershipManager;
use crate::network::DiscardOutbound;
use crate::network::Inbound;
use crate::network::Outbound;
use crate::raft::core_state::CoreState;
use crate::raft::raft_inner::RaftInner;
use crate::raft::RaftInstance;
use crate::state::RaftState;
use crate::store::InMemoryTermStore;
use crate::store::InMemoryVoteStore;
use crate::store::TermStore;
use crate::store::VoteStore;
use crate::timer::ScheduledTimeoutService;
use crate::timer::TimeoutService;
use crate::CommittedEntry;
use crate::RaftTypeConfig;

const MEMBERSHIP_EVENTS_CAPACITY: usize = 1024;

/// Assembles a core member.
///
/// Everything but the member id and the initial voters has a default: an in-memory log and
/// stores, a [`ScheduledTimeoutService`], no transport, the default [`Config`] and no commit
/// sink.
pub struct RaftInstanceBuilder<C, L = InMemoryRaftLog<C>>
where C: RaftTypeConfig
{
    myself: C::MemberId,
    initial_voters: BTreeSet<C::MemberId>,
    config: Arc<Config>,
    raft_log: L,
    term_store: Box<dyn TermStore>,
    vote_store: Box<dyn VoteStore<C::MemberId>>,
    timeout_service: Option<Arc<dyn TimeoutService>>,
    inbound: Option<Arc<dyn Inbound<C>>>,
    outbound: Arc<dyn Outbound<C>>,
    commit_sink: Option<mpsc::UnboundedSender<CommittedEntry<C>>>,
    last_applied: Option<u64>,
}

impl<C> RaftInstanceBuilder<C, InMemoryRaftLog<C>>
where C: RaftTypeConfig
{
    pub fn new(myself: C::MemberId, initial_voters: BTreeSet<C::MemberId>) -> Self {
        Self {
            myself,
            initial_voters,
            config: Arc::new(Config::default()),
            raft_log: InMemoryRaftLog::new(),
            term_store: Box::<InMemoryTermStore>::default(),
            vote_store: Box::<InMemoryVoteStore<C::MemberId>>::default(),
            timeout_service: None,
            inbound: None,
            outbound: Arc::new(DiscardOutbound),
            commit_sink: None,
            last_applied: None,
        }
    }
}

impl<C, L> RaftInstanceBuilder<C, L>
where
    C: RaftTypeConfig,
    L: RaftLog<C> + Send + 'static,
{
    pub fn raft_log<L2>(self, raft_log: L2) -> RaftInstanceBuilder<C, L2>
    where L2: RaftLog<C> + Send + 'static {
        RaftInstanceBuilder {
            myself: self.myself,
            initial_voters: self.initial_voters,
            config: self.config,
            raft_log,
            term_store: self.term_store,
            vote_store: self.vote_store,
            timeout_service: self.timeout_service,
            inbound: self.inbound,
            outbound: self.outbound,
            commit_sink: self.commit_sink,
            last_applied: self.last_applied,
        }
    }

    /// Use `config`; it is validated when the member is built.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn term_store(mut self, term_store: impl TermStore) -> Self {
        self.term_store = Box::new(term_store);
        self
    }

    pub fn vote_store(mut self, vote_store: impl VoteStore<C::MemberId>) -> Self {
        self.vote_store = Box::new(vote_store);
        self
    }

    pub fn timeout_service(mut self, timeout_service: Arc<dyn TimeoutService>) -> Self {
        self.timeout_service = Some(timeout_service);
        self
    }

    pub fn inbound(mut self, inbound: Arc<dyn Inbound<C>>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    pub fn outbound(mut self, outbound: Arc<dyn Outbound<C>>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Deliver committed normal commands, in index order, to `tx`.
    pub fn commit_sink(mut self, tx: mpsc::UnboundedSender<CommittedEntry<C>>) -> Self {
        self.commit_sink = Some(tx);
        self
    }

    /// The last index the application already applied; committed entries after it are delivered
    /// again at startup.
    pub fn last_applied(mut self, last_applied: Option<u64>) -> Self {
        self.last_applied = last_applied;
        self
    }

    /// Assemble a [`RaftCore`] without spawning it, to drive it with
    /// [`RaftCore::handle_event`].
    ///
    /// Timeouts fired by the timeout service arrive on the returned receiver.
    pub fn build_core(self) -> Result<(RaftCore<C, L>, mpsc::UnboundedReceiver<RaftEvent<C>>), Fatal<C>> {
        let (tx_membership, _) = broadcast::channel(MEMBERSHIP_EVENTS_CAPACITY);
        self.assemble(tx_membership)
    }

    /// Spawn the core on the current tokio runtime and subscribe it to the inbound transport.
    pub fn build(self) -> Result<RaftInstance<C>, Fatal<C>> {
        let (tx_membership, _) = broadcast::channel(MEMBERSHIP_EVENTS_CAPACITY);
        let inbound = self.inbound.clone();

        let (core, rx_events) = self.assemble(tx_membership.clone())?;
        let config = core.config().clone();

        let id = core.id();
        let tx_api = core.event_sender();
        let rx_metrics = core.metrics();

        let (tx_shutdown, rx_shutdown) = oneshot::channel();
        let core_handle = tokio::spawn(core.main(rx_events, rx_shutdown));

        if let Some(inbound) = inbound {
            let tx = tx_api.clone();
            inbound.subscribe(Box::new(move |message| {
                // The core is gone only after shutdown.
                let _ = tx.send(RaftEvent::Message(message));
            }));
        }

        tracing::info!("{} started, cluster: {}", id, config.cluster_name);

        let inner = RaftInner {
            id,
            config,
            tx_api,
            rx_metrics,
            tx_membership,
            tx_shutdown: Mutex::new(Some(tx_shutdown)),
            core_state: Mutex::new(CoreState::Running(core_handle)),
        };

        Ok(RaftInstance { inner: Arc::new(inner) })
    }

    fn assemble(
        self,
        tx_membership: broadcast::Sender<MembershipEvent<C>>,
    ) -> Result<(RaftCore<C, L>, mpsc::UnboundedReceiver<RaftEvent<C>>), Fatal<C>> {
        let config = Arc::new(Config::clone(&self.config).validate()?);

        let mut membership = MembershipManager::new(
            self.myself,
            self.initial_voters,
            config.catchup_lag_threshold,
            config.catchup_timeout(),
            tx_membership,
        );
        membership.replay(&self.raft_log)?;

        let term = self.term_store.current_term();
        let voted_for = self.vote_store.voted_for();
        tracing::info!(term, ?voted_for, "{} restores term and vote", self.myself);

        let state = RaftState::new(self.myself, term, voted_for, self.raft_log)
            .with_members(membership.voting_members().clone(), membership.replication_members());

        let timeout_service = match self.timeout_service {
            Some(t) => t,
            None => Arc::new(ScheduledTimeoutService::new(config.timer_tick())),
        };

        let (tx_events, rx_events) = mpsc::unbounded_channel();

        let core = RaftCore::new(
            config,
            state,
            self.term_store,
            self.vote_store,
            membership,
            self.outbound,
            timeout_service,
            self.commit_sink,
            self.last_applied,
            tx_events,
        )?;

        Ok((core, rx_events))
    }
}
