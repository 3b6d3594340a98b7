//! Fixtures for testing a group of core members.
//!
//! [`Cluster`] drives every member's [`RaftCore`] by hand: messages wait in one shared in-flight
//! queue until delivered, dropped or duplicated, and timeouts fire only when told to. After every
//! step it checks election safety, log matching and commit stability.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;

use anyhow::bail;
use coreraft::error::ClientWriteError;
use coreraft::log::InMemoryRaftLog;
use coreraft::log::ReadableRaftLog;
use coreraft::messages::RaftMessage;
use coreraft::network::InboundHandler;
use coreraft::timer::ControlledTimeoutService;
use coreraft::timer::TimeoutName;
use coreraft::CommittedEntry;
use coreraft::Config;
use coreraft::Inbound;
use coreraft::MessageSummary;
use coreraft::Outbound;
use coreraft::RaftCore;
use coreraft::RaftEvent;
use coreraft::RaftInstanceBuilder;
use coreraft::RaftLogEntry;
use coreraft::Role;
use tokio::sync::mpsc;

coreraft::declare_raft_types!(
    /// Commands and member ids are both `u64`.
    pub TestConfig: D = u64, MemberId = u64
);

pub type Core = RaftCore<TestConfig, InMemoryRaftLog<TestConfig>>;

pub fn init_ut_tracing() {
    static START: Once = Once::new();

    START.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A message on its way from `from` to `to`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: u64,
    pub to: u64,
    pub message: RaftMessage<TestConfig>,
}

type Network = Arc<Mutex<VecDeque<Envelope>>>;

/// Puts whatever a member sends in the shared in-flight queue.
struct QueueOutbound {
    from: u64,
    network: Network,
}

impl Outbound<TestConfig> for QueueOutbound {
    fn send(&self, to: u64, message: RaftMessage<TestConfig>) {
        self.network.lock().unwrap().push_back(Envelope {
            from: self.from,
            to,
            message,
        });
    }
}

pub struct Member {
    pub core: Core,
    pub timeouts: ControlledTimeoutService,
    /// Every command delivered to the commit sink so far.
    pub committed: Vec<CommittedEntry<TestConfig>>,
    rx_events: mpsc::UnboundedReceiver<RaftEvent<TestConfig>>,
    rx_commit: mpsc::UnboundedReceiver<CommittedEntry<TestConfig>>,
}

impl Member {
    pub fn role(&self) -> Role {
        self.core.state().role()
    }

    pub fn term(&self) -> u64 {
        self.core.state().term()
    }

    pub fn entries(&self) -> &[RaftLogEntry<TestConfig>] {
        self.core.state().entry_log().entries()
    }

    pub fn commit_index(&self) -> Option<u64> {
        self.core.state().entry_log().commit_index()
    }

    pub fn committed_commands(&self) -> Vec<u64> {
        self.committed.iter().map(|c| c.command).collect()
    }
}

pub struct Cluster {
    pub config: Config,
    pub members: BTreeMap<u64, Member>,
    network: Network,

    /// When set, a message is delivered only within one group.
    partition: Option<Vec<BTreeSet<u64>>>,

    /// The leader seen in every term.
    leaders: BTreeMap<u64, u64>,

    /// Every entry ever seen committed, by index.
    committed_entries: BTreeMap<u64, RaftLogEntry<TestConfig>>,
}

impl Cluster {
    pub fn new(voters: BTreeSet<u64>) -> anyhow::Result<Self> {
        let config = Config {
            catchup_lag_threshold: 2,
            max_payload_entries: 2,
            ..Default::default()
        };
        Self::with_config(voters, config)
    }

    pub fn with_config(voters: BTreeSet<u64>, config: Config) -> anyhow::Result<Self> {
        init_ut_tracing();

        let mut c = Self {
            config,
            members: BTreeMap::new(),
            network: Arc::new(Mutex::new(VecDeque::new())),
            partition: None,
            leaders: BTreeMap::new(),
            committed_entries: BTreeMap::new(),
        };
        for id in voters.iter() {
            c.add_member(*id, voters.clone())?;
        }
        Ok(c)
    }

    /// Start member `id` with an empty log; it knows `initial_voters` as the voting set.
    pub fn add_member(&mut self, id: u64, initial_voters: BTreeSet<u64>) -> anyhow::Result<()> {
        let timeouts = ControlledTimeoutService::new();
        let (tx_commit, rx_commit) = mpsc::unbounded_channel();

        let (core, rx_events) = RaftInstanceBuilder::<TestConfig>::new(id, initial_voters)
            .config(self.config.clone())
            .timeout_service(Arc::new(timeouts.clone()))
            .outbound(Arc::new(QueueOutbound {
                from: id,
                network: self.network.clone(),
            }))
            .commit_sink(tx_commit)
            .build_core()?;

        self.members.insert(id, Member {
            core,
            timeouts,
            committed: vec![],
            rx_events,
            rx_commit,
        });
        Ok(())
    }

    pub fn member(&self, id: u64) -> &Member {
        &self.members[&id]
    }

    pub fn member_mut(&mut self, id: u64) -> &mut Member {
        self.members.get_mut(&id).unwrap()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.members.keys().copied().collect()
    }

    /// The member that leads in the highest term, if any.
    pub fn leader(&self) -> Option<u64> {
        self.members
            .iter()
            .filter(|(_, m)| m.role() == Role::Leader)
            .max_by_key(|(_, m)| m.term())
            .map(|(id, _)| *id)
    }

    pub fn in_flight(&self) -> Vec<Envelope> {
        self.network.lock().unwrap().iter().cloned().collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.network.lock().unwrap().len()
    }

    /// Split the members into groups that cannot reach each other.
    pub fn partition(&mut self, groups: &[&[u64]]) {
        tracing::info!("--- partition: {:?}", groups);
        self.partition = Some(groups.iter().map(|g| g.iter().copied().collect()).collect());
    }

    pub fn heal(&mut self) {
        tracing::info!("--- heal partition");
        self.partition = None;
    }

    fn reachable(&self, from: u64, to: u64) -> bool {
        match &self.partition {
            None => true,
            Some(groups) => groups.iter().any(|g| g.contains(&from) && g.contains(&to)),
        }
    }

    /// Fire the armed timeouts named `name` of member `id`.
    pub fn fire(&mut self, id: u64, name: TimeoutName) -> anyhow::Result<()> {
        let m = self.member_mut(id);
        m.timeouts.invoke(name);

        while let Ok(ev) = m.rx_events.try_recv() {
            m.core.handle_event(ev)?;
        }
        self.after_step(id)
    }

    /// Deliver the oldest in-flight message; returns false if there is none.
    pub fn deliver_one(&mut self) -> anyhow::Result<bool> {
        let env = self.network.lock().unwrap().pop_front();
        let Some(env) = env else {
            return Ok(false);
        };

        if !self.reachable(env.from, env.to) || !self.members.contains_key(&env.to) {
            tracing::debug!("drop {} -> {}: {}", env.from, env.to, env.message.summary());
            return Ok(true);
        }

        self.member_mut(env.to).core.handle_event(RaftEvent::Message(env.message))?;
        self.after_step(env.to)?;
        Ok(true)
    }

    /// Deliver until nothing is in flight.
    pub fn deliver_all(&mut self) -> anyhow::Result<()> {
        for _ in 0..100_000 {
            if !self.deliver_one()? {
                return Ok(());
            }
        }
        bail!("messages keep flowing")
    }

    /// Lose the oldest in-flight message.
    pub fn drop_one(&mut self) -> Option<Envelope> {
        self.network.lock().unwrap().pop_front()
    }

    /// Deliver the oldest in-flight message twice.
    pub fn duplicate_one(&mut self) {
        let mut q = self.network.lock().unwrap();
        if let Some(env) = q.front().cloned() {
            q.push_back(env);
        }
    }

    pub fn submit(&mut self, id: u64, command: u64) -> Result<u64, ClientWriteError<TestConfig>> {
        let res = self.member_mut(id).core.submit(command);
        if let Err(e) = self.after_step(id) {
            panic!("{}", e);
        }
        res
    }

    /// Let `id` campaign and deliver everything that follows.
    pub fn elect(&mut self, id: u64) -> anyhow::Result<()> {
        tracing::info!("--- elect {}", id);
        self.fire(id, TimeoutName::Election)?;
        self.deliver_all()?;
        if self.member(id).role() != Role::Leader {
            bail!("{} is not elected, role: {}", id, self.member(id).role());
        }
        Ok(())
    }

    /// Deliver everything, retrying shipping and sending heartbeats until every reachable member
    /// holds the leader's log and commit index.
    pub fn settle(&mut self) -> anyhow::Result<()> {
        for _ in 0..100 {
            self.deliver_all()?;
            if self.converged() {
                return Ok(());
            }
            for id in self.ids() {
                self.fire(id, TimeoutName::ShippingRetry)?;
                self.fire(id, TimeoutName::Heartbeat)?;
            }
        }
        bail!("cluster does not settle")
    }

    /// Every reachable member committed what the leader committed.
    ///
    /// Log matching makes their logs equal up to that index.
    fn converged(&self) -> bool {
        let Some(leader) = self.leader() else {
            return false;
        };
        let commit = self.member(leader).commit_index();
        self.members
            .iter()
            .filter(|(id, _)| self.reachable(leader, **id))
            .all(|(_, m)| m.commit_index() == commit)
    }

    fn after_step(&mut self, id: u64) -> anyhow::Result<()> {
        let m = self.member_mut(id);
        while let Ok(c) = m.rx_commit.try_recv() {
            m.committed.push(c);
        }
        self.check_invariants()
    }

    pub fn check_invariants(&mut self) -> anyhow::Result<()> {
        // Election safety: one leader per term, ever.
        for (id, m) in self.members.iter() {
            if m.role() != Role::Leader {
                continue;
            }
            let prev = *self.leaders.entry(m.term()).or_insert(*id);
            if prev != *id {
                bail!("two leaders in term {}: {} and {}", m.term(), prev, id);
            }
        }

        // Log matching: entries at an index with the same term have identical prefixes.
        let ids = self.ids();
        for (i, a) in ids.iter().enumerate() {
            for b in ids[i + 1..].iter() {
                let la = self.member(*a).entries();
                let lb = self.member(*b).entries();
                let n = la.len().min(lb.len());
                if let Some(last_same) = (0..n).rev().find(|k| la[*k].term == lb[*k].term) {
                    if la[..=last_same] != lb[..=last_same] {
                        bail!("logs of {} and {} diverge before index {}", a, b, last_same);
                    }
                }
            }
        }

        // Commit stability: a committed entry never changes.
        for (id, m) in self.members.iter() {
            let Some(commit) = m.commit_index() else {
                continue;
            };
            for index in 0..=commit {
                let entry = &m.entries()[index as usize];
                match self.committed_entries.get(&index) {
                    Some(e) if e != entry => bail!("committed entry {} changed on {}", index, id),
                    Some(_) => {}
                    None => {
                        self.committed_entries.insert(index, entry.clone());
                    }
                }
            }

            // The commit stream is in index order.
            if m.committed.windows(2).any(|w| w[0].index >= w[1].index) {
                bail!("{} delivered commits out of order", id);
            }
        }
        Ok(())
    }
}

/// Connects [`RaftInstance`](coreraft::RaftInstance)s in one process.
#[derive(Clone, Default)]
pub struct Router {
    handlers: Arc<Mutex<BTreeMap<u64, InboundHandler<TestConfig>>>>,
}

impl Router {
    /// The transport of member `id`.
    pub fn port(&self, id: u64) -> Arc<RouterPort> {
        Arc::new(RouterPort {
            id,
            router: self.clone(),
        })
    }
}

pub struct RouterPort {
    id: u64,
    router: Router,
}

impl Outbound<TestConfig> for RouterPort {
    fn send(&self, to: u64, message: RaftMessage<TestConfig>) {
        if let Some(h) = self.router.handlers.lock().unwrap().get(&to) {
            h(message);
        }
    }
}

impl Inbound<TestConfig> for RouterPort {
    fn subscribe(&self, handler: InboundHandler<TestConfig>) {
        self.router.handlers.lock().unwrap().insert(self.id, handler);
    }
}
